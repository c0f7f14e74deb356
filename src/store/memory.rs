//! In-memory store backend.
//!
//! Thread-safe reference implementation of [`VarStore`], intended for
//! embedded usage and tests. Query iteration follows registration order,
//! which keeps rendering deterministic.

use std::collections::HashMap;
use std::io::Write;
use std::sync::RwLock;

use crate::cache::VarCache;
use crate::query::QuerySpec;
use crate::store::traits::{StoreError, VarFlags, VarHandle, VarInfo, VarStore, VarValue};

fn lock_err(context: &'static str) -> StoreError {
    StoreError::BackendError(format!("poisoned lock: {context}"))
}

/// Flag vocabulary of the reference backend.
const FLAG_NAMES: &[(&str, u32)] = &[
    ("volatile", 1),
    ("readonly", 1 << 1),
    ("hidden", 1 << 2),
    ("persist", 1 << 3),
    ("audit", 1 << 4),
];

/// Registration request for one variable.
#[derive(Debug, Clone, Default)]
pub struct VarRegistration {
    /// Variable name, unique within the store.
    pub name: String,
    /// Instance identifier, 0 when absent.
    pub instance_id: u32,
    /// Flag mask.
    pub flags: VarFlags,
    /// Tag names attached to the variable.
    pub tags: Vec<String>,
    /// Initial value.
    pub value: VarValue,
}

impl VarRegistration {
    /// Registration with just a name and value.
    #[must_use]
    pub fn new(name: impl Into<String>, value: VarValue) -> Self {
        Self {
            name: name.into(),
            value,
            ..Self::default()
        }
    }

    /// Set the instance identifier.
    #[must_use]
    pub fn with_instance(mut self, instance_id: u32) -> Self {
        self.instance_id = instance_id;
        self
    }

    /// Set the flag mask.
    #[must_use]
    pub fn with_flags(mut self, flags: VarFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Attach tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug)]
struct VarRecord {
    info: VarInfo,
    flags: VarFlags,
    tags: Vec<String>,
    value: VarValue,
}

#[derive(Debug, Default)]
struct StoreState {
    by_handle: HashMap<VarHandle, VarRecord>,
    by_name: HashMap<String, VarHandle>,
    // Registration order, the backend's stable query order.
    order: Vec<VarHandle>,
}

/// Thread-safe in-memory variable store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable with full metadata.
    ///
    /// # Errors
    /// `DuplicateName` if the name is already registered.
    pub fn register(&self, reg: VarRegistration) -> Result<VarHandle, StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("register"))?;
        if state.by_name.contains_key(&reg.name) {
            return Err(StoreError::DuplicateName(reg.name));
        }

        let handle = VarHandle::new();
        state.by_name.insert(reg.name.clone(), handle);
        state.by_handle.insert(
            handle,
            VarRecord {
                info: VarInfo {
                    name: reg.name,
                    instance_id: reg.instance_id,
                },
                flags: reg.flags,
                tags: reg.tags,
                value: reg.value,
            },
        );
        state.order.push(handle);
        Ok(handle)
    }

    fn matches(spec: &QuerySpec, record: &VarRecord, want_tags: &[&str]) -> bool {
        if spec.wants_tags() && !want_tags.iter().all(|t| record.tags.iter().any(|rt| rt == t)) {
            return false;
        }

        if spec.wants_match() {
            let Some(pattern) = spec.pattern.as_deref() else {
                return false;
            };
            if !record.info.name.contains(pattern) {
                return false;
            }
        }

        if spec.wants_flags() && !record.flags.contains(spec.flags) {
            return false;
        }

        if spec.wants_instance() && spec.instance_id != Some(record.info.instance_id) {
            return false;
        }

        true
    }
}

impl VarStore for InMemoryStore {
    fn find_by_name(&self, name: &str) -> Result<Option<VarHandle>, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("find_by_name"))?;
        Ok(state.by_name.get(name).copied())
    }

    fn info(&self, handle: VarHandle) -> Result<VarInfo, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("info"))?;
        state
            .by_handle
            .get(&handle)
            .map(|record| record.info.clone())
            .ok_or(StoreError::VarNotFound(handle))
    }

    fn print_value(&self, handle: VarHandle, out: &mut dyn Write) -> Result<(), StoreError> {
        let state = self.state.read().map_err(|_| lock_err("print_value"))?;
        let record = state
            .by_handle
            .get(&handle)
            .ok_or(StoreError::VarNotFound(handle))?;
        write!(out, "{}", record.value).map_err(|err| StoreError::Io(err.to_string()))
    }

    fn value(&self, handle: VarHandle) -> Result<VarValue, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("value"))?;
        state
            .by_handle
            .get(&handle)
            .map(|record| record.value.clone())
            .ok_or(StoreError::VarNotFound(handle))
    }

    fn set_value(&self, handle: VarHandle, value: VarValue) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(|_| lock_err("set_value"))?;
        let record = state
            .by_handle
            .get_mut(&handle)
            .ok_or(StoreError::VarNotFound(handle))?;
        record.value = value;
        Ok(())
    }

    fn create_var(&self, name: &str, initial: VarValue) -> Result<VarHandle, StoreError> {
        self.register(VarRegistration::new(name, initial))
    }

    fn parse_flags(&self, list: &str) -> Result<VarFlags, StoreError> {
        let mut mask = VarFlags::NONE;
        for token in list.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let bit = FLAG_NAMES
                .iter()
                .find(|(name, _)| *name == token)
                .map(|(_, bit)| VarFlags::from_bits(*bit))
                .ok_or_else(|| StoreError::UnknownFlag(token.to_string()))?;
            mask.insert(bit);
        }
        Ok(mask)
    }

    fn query(&self, spec: &QuerySpec, out: &mut VarCache) -> Result<usize, StoreError> {
        let state = self.state.read().map_err(|_| lock_err("query"))?;

        let want_tags: Vec<&str> = if spec.wants_tags() {
            spec.tag_spec
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect()
        } else {
            Vec::new()
        };

        let mut added = 0;
        for handle in &state.order {
            let Some(record) = state.by_handle.get(handle) else {
                continue;
            };
            if Self::matches(spec, record, &want_tags) && out.add(*handle) {
                added += 1;
            }
        }

        Ok(added)
    }
}
