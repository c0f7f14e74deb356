//! Declarative variable queries.
//!
//! A [`QuerySpec`] is the structured form of a query-shaped configuration
//! node: which filter dimensions are present and their operands. Building a
//! spec touches no store state beyond the flag vocabulary; execution is the
//! backend's job.

use crate::config::QueryConfig;
use crate::error::ConfigError;
use crate::store::{StoreError, VarFlags, VarStore};

/// Upper bound on tag specifications. Specs at or beyond this length are
/// rejected, never truncated.
pub const MAX_TAG_SPEC_LEN: usize = 256;

/// Presence bitmask: which filter dimensions a query carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryFields(u8);

impl QueryFields {
    /// No dimension present.
    pub const NONE: Self = Self(0);
    /// Tag filter present.
    pub const TAGS: Self = Self(1);
    /// Substring filter present.
    pub const MATCH: Self = Self(1 << 1);
    /// Flag filter present.
    pub const FLAGS: Self = Self(1 << 2);
    /// Instance-id filter present.
    pub const INSTANCE: Self = Self(1 << 3);

    /// True if every bit in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Set every bit in `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for QueryFields {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Structured variable query: tag spec, substring pattern, flag mask and
/// instance id, plus the presence mask saying which of them apply.
///
/// Invariant: a spec produced by [`QuerySpec::from_config`] always has at
/// least one field set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    /// Comma-separated tag names, meaningful when [`QueryFields::TAGS`] is set.
    pub tag_spec: String,
    /// Substring pattern, meaningful when [`QueryFields::MATCH`] is set.
    pub pattern: Option<String>,
    /// Flag mask, meaningful when [`QueryFields::FLAGS`] is set.
    pub flags: VarFlags,
    /// Instance id, meaningful when [`QueryFields::INSTANCE`] is set.
    pub instance_id: Option<u32>,
    /// Which filter dimensions are present.
    pub fields: QueryFields,
}

impl QuerySpec {
    /// Build a spec from a query-shaped configuration node.
    ///
    /// The store is consulted only for the flag vocabulary.
    ///
    /// # Errors
    /// - `TagSpecTooLong` if the tag spec reaches [`MAX_TAG_SPEC_LEN`]
    /// - `UnsupportedFlag` for a token outside the store's vocabulary
    /// - `EmptyQuery` if no filter dimension ends up present
    pub fn from_config(config: &QueryConfig, store: &dyn VarStore) -> Result<Self, ConfigError> {
        let mut spec = Self::default();

        if let Some(tags) = &config.tags {
            if tags.len() >= MAX_TAG_SPEC_LEN {
                return Err(ConfigError::TagSpecTooLong {
                    len: tags.len(),
                    max: MAX_TAG_SPEC_LEN,
                });
            }
            spec.tag_spec = tags.clone();
            spec.fields.insert(QueryFields::TAGS);
        }

        if let Some(pattern) = &config.pattern {
            spec.pattern = Some(pattern.clone());
            spec.fields.insert(QueryFields::MATCH);
        }

        if let Some(flags) = &config.flags {
            spec.flags = store.parse_flags(flags).map_err(|err| match err {
                StoreError::UnknownFlag(token) => ConfigError::UnsupportedFlag { token },
                other => ConfigError::Store(other),
            })?;
            spec.fields.insert(QueryFields::FLAGS);
        }

        if let Some(id) = config.instance_id {
            spec.instance_id = Some(id);
            spec.fields.insert(QueryFields::INSTANCE);
        }

        if spec.fields.is_empty() {
            return Err(ConfigError::EmptyQuery);
        }

        Ok(spec)
    }

    /// True if the tag filter applies.
    #[must_use]
    pub const fn wants_tags(&self) -> bool {
        self.fields.contains(QueryFields::TAGS)
    }

    /// True if the substring filter applies.
    #[must_use]
    pub const fn wants_match(&self) -> bool {
        self.fields.contains(QueryFields::MATCH)
    }

    /// True if the flag filter applies.
    #[must_use]
    pub const fn wants_flags(&self) -> bool {
        self.fields.contains(QueryFields::FLAGS)
    }

    /// True if the instance-id filter applies.
    #[must_use]
    pub const fn wants_instance(&self) -> bool {
        self.fields.contains(QueryFields::INSTANCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn store() -> InMemoryStore {
        InMemoryStore::new()
    }

    #[test]
    fn tags_within_bound_set_tag_filter() {
        let store = store();
        let config = QueryConfig {
            tags: Some("power,thermal".to_string()),
            ..QueryConfig::default()
        };

        let spec = QuerySpec::from_config(&config, &store).unwrap();
        assert!(spec.wants_tags());
        assert!(!spec.wants_match());
        assert_eq!(spec.tag_spec, "power,thermal");
    }

    #[test]
    fn tag_spec_at_bound_is_rejected() {
        let store = store();
        let config = QueryConfig {
            tags: Some("t".repeat(MAX_TAG_SPEC_LEN)),
            ..QueryConfig::default()
        };

        let err = QuerySpec::from_config(&config, &store).unwrap_err();
        let ConfigError::TagSpecTooLong { len, max } = err else {
            panic!("expected TagSpecTooLong, got {err:?}");
        };
        assert_eq!(len, MAX_TAG_SPEC_LEN);
        assert_eq!(max, MAX_TAG_SPEC_LEN);
    }

    #[test]
    fn tag_spec_just_under_bound_is_accepted() {
        let store = store();
        let config = QueryConfig {
            tags: Some("t".repeat(MAX_TAG_SPEC_LEN - 1)),
            ..QueryConfig::default()
        };

        assert!(QuerySpec::from_config(&config, &store).is_ok());
    }

    #[test]
    fn match_pattern_is_copied() {
        let store = store();
        let config = QueryConfig {
            pattern: Some("/sys/".to_string()),
            ..QueryConfig::default()
        };

        let spec = QuerySpec::from_config(&config, &store).unwrap();
        assert!(spec.wants_match());
        assert_eq!(spec.pattern.as_deref(), Some("/sys/"));
    }

    #[test]
    fn unknown_flag_token_is_unsupported() {
        let store = store();
        let config = QueryConfig {
            flags: Some("volatile,bogus".to_string()),
            ..QueryConfig::default()
        };

        let err = QuerySpec::from_config(&config, &store).unwrap_err();
        let ConfigError::UnsupportedFlag { token } = err else {
            panic!("expected UnsupportedFlag, got {err:?}");
        };
        assert_eq!(token, "bogus");
    }

    #[test]
    fn known_flags_parse_into_mask() {
        let store = store();
        let config = QueryConfig {
            flags: Some("volatile,readonly".to_string()),
            ..QueryConfig::default()
        };

        let spec = QuerySpec::from_config(&config, &store).unwrap();
        assert!(spec.wants_flags());
        assert!(!spec.flags.is_empty());
    }

    #[test]
    fn instance_id_sets_instance_filter() {
        let store = store();
        let config = QueryConfig {
            instance_id: Some(4),
            ..QueryConfig::default()
        };

        let spec = QuerySpec::from_config(&config, &store).unwrap();
        assert!(spec.wants_instance());
        assert_eq!(spec.instance_id, Some(4));
    }

    #[test]
    fn query_with_no_dimension_is_rejected() {
        let store = store();
        let err = QuerySpec::from_config(&QueryConfig::default(), &store).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyQuery));
    }

    #[test]
    fn query_fields_bit_operations() {
        let mask = QueryFields::TAGS | QueryFields::FLAGS;
        assert!(mask.contains(QueryFields::TAGS));
        assert!(mask.contains(QueryFields::FLAGS));
        assert!(!mask.contains(QueryFields::MATCH));
        assert!(QueryFields::NONE.is_empty());
    }
}
