//! Abstract store contract for varmsg.
//!
//! These types define the surface the engine depends on: handle resolution,
//! descriptor lookup, value stringification, the flag vocabulary, query
//! execution, and control-value access. Backends must be safe for shared
//! use from the engine thread and any embedding application.

use std::fmt;
use std::io::Write;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::cache::VarCache;
use crate::query::QuerySpec;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No variable behind the handle.
    #[error("variable not found: {0}")]
    VarNotFound(VarHandle),

    /// A flag token outside the store's vocabulary.
    #[error("unknown flag '{0}'")]
    UnknownFlag(String),

    /// A variable name already in use.
    #[error("duplicate variable name: {0}")]
    DuplicateName(String),

    /// Read or write failure while stringifying a value.
    #[error("store I/O error: {0}")]
    Io(String),

    /// Backend fault.
    #[error("store backend error: {0}")]
    BackendError(String),

    /// The store connection could not be established or was lost.
    #[error("store connection error: {0}")]
    ConnectionError(String),
}

/// Opaque store-issued identifier for one variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarHandle(Uuid);

impl VarHandle {
    /// Issue a new random handle.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for VarHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VarHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Descriptor for one variable: its name and instance identifier.
///
/// Instance id 0 means "no instance"; nonzero ids are surfaced in rendered
/// member keys as `[<id>]<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarInfo {
    /// Variable name, unique within the store.
    pub name: String,
    /// Instance identifier, 0 when absent.
    #[serde(default)]
    pub instance_id: u32,
}

/// Bitmask of store-defined variable flags.
///
/// The names behind the bits are the backend's vocabulary; the engine only
/// moves masks around.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VarFlags(u32);

impl VarFlags {
    /// The empty mask.
    pub const NONE: Self = Self(0);

    /// Build a mask from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits of the mask.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit in `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set every bit in `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for VarFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Possible values a variable can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum VarValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
}

impl VarValue {
    #[allow(missing_docs)]
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn as_uint(&self) -> Option<u64> {
        match self {
            Self::Uint(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Uint(_) => "uint",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
        }
    }
}

impl Default for VarValue {
    fn default() -> Self {
        Self::Str(String::new())
    }
}

impl fmt::Display for VarValue {
    /// Textual form of the value, exactly as it appears in rendered
    /// messages before quoting: strings are written raw, without quotes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for VarValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for VarValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for VarValue {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<f64> for VarValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for VarValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for VarValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<serde_json::Value> for VarValue {
    /// Maps a JSON scalar onto the closest value type. Arrays and objects
    /// become string values holding their JSON text, so nested documents
    /// round-trip through the renderer's raw-JSON embedding path.
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::Uint(u)
                } else {
                    Self::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Null => Self::Str(String::new()),
            other => Self::Str(other.to_string()),
        }
    }
}

/// Store contract the engine depends on.
///
/// # Ordering
/// `query` must append matches in a stable order and never add a handle the
/// target cache already holds twice; the reference backend iterates in
/// registration order.
pub trait VarStore: Send + Sync {
    /// Resolve a variable by exact name.
    fn find_by_name(&self, name: &str) -> Result<Option<VarHandle>, StoreError>;

    /// Fetch the descriptor for a handle.
    fn info(&self, handle: VarHandle) -> Result<VarInfo, StoreError>;

    /// Write the variable's current value as text into `out`.
    fn print_value(&self, handle: VarHandle, out: &mut dyn Write) -> Result<(), StoreError>;

    /// Read the variable's current typed value.
    fn value(&self, handle: VarHandle) -> Result<VarValue, StoreError>;

    /// Replace the variable's value.
    fn set_value(&self, handle: VarHandle, value: VarValue) -> Result<(), StoreError>;

    /// Create a variable with the given name and initial value.
    fn create_var(&self, name: &str, initial: VarValue) -> Result<VarHandle, StoreError>;

    /// Parse a comma-separated flag-name list into a mask using the
    /// store's vocabulary.
    fn parse_flags(&self, list: &str) -> Result<VarFlags, StoreError>;

    /// Execute a query, appending every distinct match to `out`.
    /// Returns the number of handles actually added.
    fn query(&self, spec: &QuerySpec, out: &mut VarCache) -> Result<usize, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time test: ensure the trait is object-safe
    fn _assert_var_store_object_safe(_: &dyn VarStore) {}

    #[test]
    fn test_store_error_display() {
        let err = StoreError::VarNotFound(VarHandle::new());
        assert!(err.to_string().contains("variable not found"));

        let err = StoreError::UnknownFlag("bogus".to_string());
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_var_flags_operations() {
        let a = VarFlags::from_bits(0b01);
        let b = VarFlags::from_bits(0b10);
        let both = a | b;
        assert!(both.contains(a));
        assert!(both.contains(b));
        assert!(!a.contains(b));
        assert!(VarFlags::NONE.is_empty());

        let mut m = VarFlags::NONE;
        m.insert(a);
        assert_eq!(m, a);
    }

    #[test]
    fn test_var_value_display_is_raw_text() {
        assert_eq!(VarValue::Bool(true).to_string(), "true");
        assert_eq!(VarValue::Int(-3).to_string(), "-3");
        assert_eq!(VarValue::Uint(12).to_string(), "12");
        assert_eq!(VarValue::Str("hello".into()).to_string(), "hello");
    }

    #[test]
    fn test_var_value_from_json() {
        assert_eq!(VarValue::from(serde_json::json!(true)), VarValue::Bool(true));
        assert_eq!(VarValue::from(serde_json::json!(7)), VarValue::Int(7));
        assert_eq!(
            VarValue::from(serde_json::json!("x")),
            VarValue::Str("x".into())
        );
        // Nested documents become raw JSON text.
        let v = VarValue::from(serde_json::json!({"x": 1}));
        assert_eq!(v, VarValue::Str("{\"x\":1}".into()));
    }

    #[test]
    fn test_var_value_type_name() {
        assert_eq!(VarValue::Float(1.5).type_name(), "float");
        assert_eq!(VarValue::default().type_name(), "str");
    }

    #[test]
    fn test_var_handle_serde_transparent() {
        let h = VarHandle::new();
        let json = serde_json::to_string(&h).unwrap();
        let back: VarHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(h, back);
        // Transparent: serializes as the bare UUID string.
        assert!(json.starts_with('"'));
    }
}
