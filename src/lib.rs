//! # varmsg - Variable Message Generator
//!
//! varmsg assembles JSON snapshots of named sets of external state
//! variables and delivers them to an output sink. Multiple independent
//! message definitions can be active at once, each with its own schedule,
//! variable set and enable switch.
//!
//! The crate is embedded-first: the variable store sits behind the
//! [`store::VarStore`] trait, an in-memory reference backend is included,
//! and the engine is a plain synchronous object an application drives
//! directly or via [`engine::MsgEngine::run`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use varmsg::{DefLoader, DefRegistry, InMemoryStore, MsgEngine, VarStore};
//!
//! let store: Arc<dyn VarStore> = Arc::new(InMemoryStore::new());
//! let loader = DefLoader::new(Arc::clone(&store));
//!
//! let mut registry = DefRegistry::new();
//! loader.load_dir(&mut registry, "/etc/varmsg".as_ref())?;
//!
//! let mut engine = MsgEngine::new(store, registry);
//! engine.run(&shutdown_rx);
//! ```
//!
//! Each definition may expose status/control values under its configured
//! prefix: `<prefix>/txcount`, `<prefix>/errcount`, `<prefix>/enable` and
//! `<prefix>/rescan`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod config;
pub mod definition;
pub mod engine;
pub mod error;
pub mod query;
pub mod render;
pub mod sink;
pub mod store;

// Re-export primary types at crate root for convenience
pub use cache::{VarCache, CACHE_SIZE_GROW_BY, CACHE_SIZE_INITIAL};
pub use config::{MsgConfig, QueryConfig, VarSelector};
pub use definition::{resolve_selector, DefLoader, DefRegistry, MsgDef};
pub use engine::MsgEngine;
pub use error::{ConfigError, EngineError, VarMsgError, VarMsgResult};
pub use query::{QueryFields, QuerySpec, MAX_TAG_SPEC_LEN};
pub use render::{is_json, Renderer};
pub use sink::{QueueTransport, Sink, SinkKind};
pub use store::{
    InMemoryStore, StoreError, VarFlags, VarHandle, VarInfo, VarRegistration, VarStore, VarValue,
};
