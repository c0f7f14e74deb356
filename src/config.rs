//! Configuration document model.
//!
//! One JSON document describes one message definition. The `trigger` and
//! `vars` members are either query-shaped (an object of filter fields) or
//! list-shaped (an array of variable names); [`VarSelector`] captures the
//! two shapes and the resolver decides per entry what is acceptable.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// One message definition's configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MsgConfig {
    /// Gate for generation and transmission. Absent means disabled.
    #[serde(default)]
    pub enabled: bool,

    /// Namespace for this definition's status/control values.
    #[serde(default)]
    pub prefix: Option<String>,

    /// Generation interval in whole seconds; 0 means trigger-only.
    #[serde(default)]
    pub interval: u32,

    /// Variables whose change should fire generation.
    #[serde(default)]
    pub trigger: Option<VarSelector>,

    /// Variables rendered into the message body.
    #[serde(default)]
    pub vars: Option<VarSelector>,

    /// Destination kind; unrecognized values become `disabled`.
    #[serde(default)]
    pub output_type: Option<String>,

    /// Destination identifier (queue name or file path).
    #[serde(default)]
    pub output: Option<String>,

    /// Header template location. Parsed and carried; not interpreted by
    /// the engine core.
    #[serde(default)]
    pub header: Option<PathBuf>,
}

impl MsgConfig {
    /// Parse a configuration document from a JSON file.
    ///
    /// # Errors
    /// `Io` if the file cannot be read, `Parse` if it is not valid JSON.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// The two shapes a `trigger`/`vars` member can take.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum VarSelector {
    /// Query-shaped: an object of filter fields.
    Query(QueryConfig),

    /// List-shaped: an array of entries expected to be variable names.
    /// Entries stay untyped here; the resolver rejects non-strings with an
    /// unsupported-entry error.
    List(Vec<serde_json::Value>),
}

/// Filter fields of a query-shaped selector.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryConfig {
    /// Comma-separated tag names.
    #[serde(default)]
    pub tags: Option<String>,

    /// Substring to match against variable names.
    #[serde(default, rename = "match")]
    pub pattern: Option<String>,

    /// Comma-separated flag names.
    #[serde(default)]
    pub flags: Option<String>,

    /// Instance identifier.
    #[serde(default, rename = "instanceID")]
    pub instance_id: Option<u32>,
}
