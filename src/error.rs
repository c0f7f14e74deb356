//! Error types for varmsg.
//!
//! All errors are strongly typed using thiserror, split by lifecycle phase:
//! [`ConfigError`] for definition-load time, [`EngineError`] for pulse time,
//! and [`crate::store::StoreError`] for backend faults. The top-level
//! [`VarMsgError`] wraps all three and supports pattern matching on
//! specific error conditions.

use thiserror::Error;

use crate::store::StoreError;

/// Errors raised while turning a configuration document into a live
/// message definition.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A tag specification reached the store contract's length bound.
    /// Over-long specs are rejected outright, never truncated.
    #[error("tag specification is {len} bytes, limit is {max}")]
    TagSpecTooLong {
        /// Length of the rejected specification.
        len: usize,
        /// The enforced bound.
        max: usize,
    },

    /// A flag token was not part of the store's flag vocabulary.
    #[error("unsupported flag '{token}'")]
    UnsupportedFlag {
        /// The offending token.
        token: String,
    },

    /// A query selected on nothing: every filter dimension was absent.
    #[error("variable query must filter on at least one of tags/match/flags/instanceID")]
    EmptyQuery,

    /// An explicit variable list named a variable the store does not hold.
    #[error("variable not found: {name}")]
    VarNotFound {
        /// The unresolved name.
        name: String,
    },

    /// An explicit variable list contained a non-string entry.
    #[error("variable list entries must be strings, found {found}")]
    UnsupportedEntry {
        /// JSON type name of the offending entry.
        found: &'static str,
    },

    /// The configuration document had no `vars` member.
    #[error("configuration has no 'vars' member")]
    MissingVars,

    /// A file or mqueue sink was configured without a destination name.
    #[error("{kind} output requires an 'output' destination")]
    MissingOutput {
        /// The sink kind missing its destination.
        kind: &'static str,
    },

    /// The configuration document was not parsable JSON.
    #[error("configuration parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Reading a configuration source or opening a sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store rejected an operation during definition load.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ConfigError {
    /// Returns true if this error means a named variable did not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::VarNotFound { .. })
    }
}

/// Errors raised while generating or delivering a message.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Fetching a variable's descriptor or value failed. This fails the
    /// whole render; no member is skipped.
    #[error("variable fetch failed: {0}")]
    Fetch(#[from] StoreError),

    /// A variable's stringified value was not valid UTF-8.
    #[error("variable value is not valid text: {0}")]
    ValueNotText(#[from] std::str::Utf8Error),

    /// JSON-encoding a member key or value failed.
    #[error("member encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// Writing the rendered message to a sink failed.
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The sink kind is configured but has no transport attached.
    #[error("{kind} sink has no transport attached")]
    SinkUnavailable {
        /// The affected sink kind.
        kind: &'static str,
    },

    /// A generation request named a definition index outside the registry.
    #[error("no definition at index {index}")]
    UnknownDefinition {
        /// The out-of-range index.
        index: usize,
    },
}

/// Top-level error type for varmsg.
#[derive(Debug, Error)]
pub enum VarMsgError {
    /// Definition-load failure.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pulse-time failure.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Store backend failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl VarMsgError {
    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is an engine error.
    #[must_use]
    pub const fn is_engine(&self) -> bool {
        matches!(self, Self::Engine(_))
    }

    /// Returns true if this is a store error.
    #[must_use]
    pub const fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

/// Result type alias for varmsg operations.
pub type VarMsgResult<T> = Result<T, VarMsgError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_spec_too_long_display() {
        let err = ConfigError::TagSpecTooLong { len: 300, max: 256 };
        let msg = format!("{err}");
        assert!(msg.contains("300"));
        assert!(msg.contains("256"));
    }

    #[test]
    fn test_var_not_found_display() {
        let err = ConfigError::VarNotFound {
            name: "/sys/temp".to_string(),
        };
        assert!(format!("{err}").contains("/sys/temp"));
        assert!(err.is_not_found());
        assert!(!ConfigError::EmptyQuery.is_not_found());
    }

    #[test]
    fn test_unsupported_entry_display() {
        let err = ConfigError::UnsupportedEntry { found: "number" };
        assert!(format!("{err}").contains("number"));
    }

    #[test]
    fn test_sink_unavailable_display() {
        let err = EngineError::SinkUnavailable { kind: "mqueue" };
        assert!(format!("{err}").contains("mqueue"));
    }

    #[test]
    fn test_varmsg_error_from_config() {
        let err: VarMsgError = ConfigError::EmptyQuery.into();
        assert!(err.is_config());
        assert!(!err.is_engine());
    }

    #[test]
    fn test_varmsg_error_from_engine() {
        let err: VarMsgError = EngineError::UnknownDefinition { index: 3 }.into();
        assert!(err.is_engine());
        assert!(format!("{err}").contains('3'));
    }

    #[test]
    fn test_varmsg_error_from_store() {
        let err: VarMsgError = StoreError::BackendError("lost".to_string()).into();
        assert!(err.is_store());
        assert!(format!("{err}").contains("lost"));
    }
}
