//! Message definitions and their registry.
//!
//! A [`MsgDef`] is the runtime record behind one configuration document:
//! identity, schedule state, counters, resolved variable sets and the open
//! sink. Definitions are built once at load time and live for the process
//! lifetime; only the scheduler mutates them afterwards.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{VarCache, CACHE_SIZE_GROW_BY, CACHE_SIZE_INITIAL};
use crate::config::{MsgConfig, VarSelector};
use crate::error::ConfigError;
use crate::query::QuerySpec;
use crate::sink::{QueueTransport, Sink, SinkKind};
use crate::store::{VarHandle, VarStore, VarValue};

/// Growth increment for caches sized from an explicit list.
const LIST_CACHE_GROW_BY: usize = 10;

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Resolve a selector into an existing cache, clearing it first.
///
/// List entries resolve by exact name in input order; the first unresolved
/// name aborts the remaining entries (whatever was already added stays).
/// Query selectors delegate matching and ordering to the store.
pub(crate) fn resolve_into(
    store: &dyn VarStore,
    selector: &VarSelector,
    cache: &mut VarCache,
) -> Result<(), ConfigError> {
    cache.clear();

    match selector {
        VarSelector::Query(config) => {
            let spec = QuerySpec::from_config(config, store)?;
            store.query(&spec, cache)?;
            Ok(())
        }
        VarSelector::List(items) => {
            for item in items {
                let Some(name) = item.as_str() else {
                    return Err(ConfigError::UnsupportedEntry {
                        found: json_type_name(item),
                    });
                };
                match store.find_by_name(name)? {
                    Some(handle) => {
                        cache.add(handle);
                    }
                    None => {
                        return Err(ConfigError::VarNotFound {
                            name: name.to_string(),
                        })
                    }
                }
            }
            Ok(())
        }
    }
}

fn new_cache_for(selector: &VarSelector) -> VarCache {
    match selector {
        VarSelector::Query(_) => VarCache::with_capacity(CACHE_SIZE_INITIAL, CACHE_SIZE_GROW_BY),
        VarSelector::List(items) => VarCache::with_capacity(items.len(), LIST_CACHE_GROW_BY),
    }
}

/// Resolve a selector into a cache, reusing `existing` when present
/// rather than reallocating.
///
/// # Errors
/// Query-build and store failures propagate; list entries resolve in input
/// order and the first unresolved name aborts the remaining entries.
pub fn resolve_selector(
    store: &dyn VarStore,
    selector: &VarSelector,
    existing: Option<VarCache>,
) -> Result<VarCache, ConfigError> {
    let mut cache = existing.unwrap_or_else(|| new_cache_for(selector));
    resolve_into(store, selector, &mut cache)?;
    Ok(cache)
}

/// Handles of one definition's exposed status/control values.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ControlVars {
    pub(crate) tx_count: VarHandle,
    pub(crate) err_count: VarHandle,
    pub(crate) enable: VarHandle,
    pub(crate) rescan: VarHandle,
}

fn control_name(prefix: &str, leaf: &str) -> String {
    format!("{}/{leaf}", prefix.trim_end_matches('/'))
}

impl ControlVars {
    fn register(store: &dyn VarStore, prefix: &str, enabled: bool) -> Result<Self, ConfigError> {
        Ok(Self {
            tx_count: store.create_var(&control_name(prefix, "txcount"), VarValue::Uint(0))?,
            err_count: store.create_var(&control_name(prefix, "errcount"), VarValue::Uint(0))?,
            enable: store.create_var(&control_name(prefix, "enable"), VarValue::Bool(enabled))?,
            rescan: store.create_var(&control_name(prefix, "rescan"), VarValue::Bool(false))?,
        })
    }
}

/// Runtime record for one configured message.
#[derive(Debug)]
pub struct MsgDef {
    name: String,
    pub(crate) enabled: bool,
    prefix: Option<String>,
    pub(crate) interval: u32,
    pub(crate) countdown: u32,
    pub(crate) tx_count: u64,
    pub(crate) err_count: u64,
    trigger_selector: Option<VarSelector>,
    vars_selector: VarSelector,
    pub(crate) trigger_set: Option<VarCache>,
    pub(crate) body_set: VarCache,
    pub(crate) sink: Sink,
    header: Option<PathBuf>,
    pub(crate) controls: Option<ControlVars>,
}

impl MsgDef {
    /// Build a definition from its parsed configuration document.
    ///
    /// Resolves both variable sets, opens the sink, and registers the
    /// status/control values when a prefix is configured. The countdown
    /// starts at the configured interval.
    ///
    /// # Errors
    /// `MissingVars` without a `vars` member; resolution, sink and store
    /// failures propagate.
    pub fn from_config(
        store: &dyn VarStore,
        queues: Option<&dyn QueueTransport>,
        name: impl Into<String>,
        config: MsgConfig,
    ) -> Result<Self, ConfigError> {
        let name = name.into();

        let vars_selector = config.vars.ok_or(ConfigError::MissingVars)?;
        let body_set = resolve_selector(store, &vars_selector, None)?;

        let trigger_set = match &config.trigger {
            Some(selector) => Some(resolve_selector(store, selector, None)?),
            None => None,
        };

        let sink = Sink::open(config.output_type.as_deref(), config.output.as_deref(), queues)?;

        let controls = match &config.prefix {
            Some(prefix) => Some(ControlVars::register(store, prefix, config.enabled)?),
            None => None,
        };

        Ok(Self {
            name,
            enabled: config.enabled,
            prefix: config.prefix,
            interval: config.interval,
            countdown: config.interval,
            tx_count: 0,
            err_count: 0,
            trigger_selector: config.trigger,
            vars_selector,
            trigger_set,
            body_set,
            sink,
            header: config.header,
            controls,
        })
    }

    /// Re-resolve both variable sets from the retained selectors, reusing
    /// the existing caches.
    pub(crate) fn rescan(&mut self, store: &dyn VarStore) -> Result<(), ConfigError> {
        resolve_into(store, &self.vars_selector, &mut self.body_set)?;
        if let (Some(selector), Some(set)) = (&self.trigger_selector, &mut self.trigger_set) {
            resolve_into(store, selector, set)?;
        }
        Ok(())
    }

    /// Definition name, derived from its configuration source.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the definition currently generates and transmits.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Status/control namespace, when configured.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Schedule period in seconds; 0 means trigger-only.
    #[must_use]
    pub const fn interval(&self) -> u32 {
        self.interval
    }

    /// Pulses remaining until the next scheduled generation.
    #[must_use]
    pub const fn countdown(&self) -> u32 {
        self.countdown
    }

    /// Completed generations.
    #[must_use]
    pub const fn tx_count(&self) -> u64 {
        self.tx_count
    }

    /// Failed generation attempts.
    #[must_use]
    pub const fn err_count(&self) -> u64 {
        self.err_count
    }

    /// Variables rendered into the message body.
    #[must_use]
    pub const fn body(&self) -> &VarCache {
        &self.body_set
    }

    /// Variables whose change is intended to fire generation.
    #[must_use]
    pub const fn trigger(&self) -> Option<&VarCache> {
        self.trigger_set.as_ref()
    }

    /// Kind of the configured sink.
    #[must_use]
    pub const fn sink_kind(&self) -> SinkKind {
        self.sink.kind()
    }

    /// Header template location, carried from the configuration.
    #[must_use]
    pub fn header(&self) -> Option<&Path> {
        self.header.as_deref()
    }
}

/// Owned, ordered collection of message definitions.
///
/// Insertion prepends: the most-recently-loaded definition is processed
/// first within a pulse.
#[derive(Debug, Default)]
pub struct DefRegistry {
    defs: Vec<MsgDef>,
}

impl DefRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend a definition.
    pub fn insert(&mut self, def: MsgDef) {
        self.defs.insert(0, def);
    }

    /// Number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// True if no definition is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Definition at `index`, in processing order.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&MsgDef> {
        self.defs.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut MsgDef> {
        self.defs.get_mut(index)
    }

    /// Iterate definitions in processing order.
    pub fn iter(&self) -> impl Iterator<Item = &MsgDef> {
        self.defs.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut MsgDef> {
        self.defs.iter_mut()
    }
}

/// Loads configuration sources into a registry.
pub struct DefLoader {
    store: Arc<dyn VarStore>,
    queues: Option<Arc<dyn QueueTransport>>,
}

impl DefLoader {
    /// Create a loader against the given store, with no queue transport.
    #[must_use]
    pub fn new(store: Arc<dyn VarStore>) -> Self {
        Self {
            store,
            queues: None,
        }
    }

    /// Attach a queue transport used to open mqueue sinks.
    #[must_use]
    pub fn with_queue_transport(mut self, queues: Arc<dyn QueueTransport>) -> Self {
        self.queues = Some(queues);
        self
    }

    /// Load one configuration file into the registry.
    ///
    /// # Errors
    /// Parse, resolution, sink and store failures; the registry is
    /// unchanged on error.
    pub fn load_file(&self, registry: &mut DefRegistry, path: &Path) -> Result<(), ConfigError> {
        debug!(path = %path.display(), "processing configuration file");

        let config = MsgConfig::from_file(path)?;
        let def = MsgDef::from_config(
            self.store.as_ref(),
            self.queues.as_deref(),
            definition_name(path),
            config,
        )?;

        info!(
            name = def.name(),
            interval = def.interval(),
            sink = def.sink_kind().as_str(),
            enabled = def.enabled(),
            "definition loaded"
        );
        registry.insert(def);
        Ok(())
    }

    /// Load every configuration file in a directory.
    ///
    /// Entries are visited in name order; unreadable or unparsable entries
    /// are logged and skipped, they never abort the remaining entries.
    /// Returns the number of definitions loaded.
    ///
    /// # Errors
    /// Only if the directory itself cannot be read.
    pub fn load_dir(&self, registry: &mut DefRegistry, dir: &Path) -> Result<usize, ConfigError> {
        debug!(dir = %dir.display(), "processing configuration directory");

        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            match self.load_file(registry, &path) {
                Ok(()) => loaded += 1,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping configuration");
                }
            }
        }
        Ok(loaded)
    }
}

fn definition_name(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| path.to_string_lossy(), |stem| stem.to_string_lossy())
        .into_owned()
}
