//! Message generation engine.
//!
//! The engine owns the definition registry and drives it from a fixed-period
//! pulse. Everything runs on one logical thread: definitions are processed
//! one at a time, in registry order, and a firing definition is rendered and
//! dispatched before the next one is looked at. Pulses arrive on a ticker
//! channel; shutdown arrives on a second channel. There is no internal
//! parallelism and no locking between definitions.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{select, tick, Receiver};
use tracing::{debug, info, warn};

use crate::definition::{DefRegistry, MsgDef};
use crate::error::EngineError;
use crate::render::Renderer;
use crate::store::{VarStore, VarValue};

/// Default pulse period.
const DEFAULT_PULSE_PERIOD: Duration = Duration::from_secs(1);

/// The message generation engine.
///
/// Construction injects the store and a fully loaded registry; nothing is
/// process-global, so independent engines can coexist in one process.
pub struct MsgEngine {
    store: Arc<dyn VarStore>,
    registry: DefRegistry,
    renderer: Renderer,
    period: Duration,
}

impl MsgEngine {
    /// Create an engine over a loaded registry, pulsing once per second.
    #[must_use]
    pub fn new(store: Arc<dyn VarStore>, registry: DefRegistry) -> Self {
        Self {
            store,
            registry,
            renderer: Renderer::new(),
            period: DEFAULT_PULSE_PERIOD,
        }
    }

    /// Override the pulse period. Mainly useful in tests.
    #[must_use]
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// The definition registry.
    #[must_use]
    pub fn registry(&self) -> &DefRegistry {
        &self.registry
    }

    /// Process one timing pulse.
    ///
    /// For every enabled definition with a nonzero interval, in registry
    /// order: decrement the countdown, and on zero reset it and generate.
    /// A failing definition increments its own error counter and never
    /// stops the pulse from reaching the definitions after it.
    pub fn pulse(&mut self) {
        let Self {
            store,
            registry,
            renderer,
            ..
        } = self;

        for def in registry.iter_mut() {
            sync_controls(store.as_ref(), def);

            if !def.enabled || def.interval == 0 {
                continue;
            }

            if def.countdown > 0 {
                def.countdown -= 1;
            }

            if def.countdown == 0 {
                def.countdown = def.interval;
                let _ = generate_def(store.as_ref(), renderer, def);
            }
        }
    }

    /// Generate one definition immediately, outside its schedule.
    ///
    /// This is the firing path the interval countdown uses; a future
    /// change-notification source would call it as well. Counters update
    /// exactly as on the scheduled path.
    ///
    /// # Errors
    /// `UnknownDefinition` for an out-of-range index; render/dispatch
    /// failures propagate after being counted.
    pub fn generate(&mut self, index: usize) -> Result<(), EngineError> {
        let Self {
            store,
            registry,
            renderer,
            ..
        } = self;

        let def = registry
            .get_mut(index)
            .ok_or(EngineError::UnknownDefinition { index })?;
        generate_def(store.as_ref(), renderer, def)
    }

    /// Run the engine until the shutdown channel fires or closes.
    ///
    /// Blocks the calling thread. Each tick is processed to completion
    /// before the next is waited on; on shutdown, sinks are flushed and the
    /// store connection is released best-effort.
    pub fn run(&mut self, shutdown: &Receiver<()>) {
        let period = if self.period.is_zero() {
            DEFAULT_PULSE_PERIOD
        } else {
            self.period
        };
        let ticker = tick(period);

        info!(
            definitions = self.registry.len(),
            period_ms = period.as_millis() as u64,
            "message generator running"
        );

        loop {
            select! {
                recv(ticker) -> msg => {
                    if msg.is_err() {
                        break;
                    }
                    self.pulse();
                }
                recv(shutdown) -> _ => {
                    info!("shutdown requested");
                    break;
                }
            }
        }

        self.release();
    }

    /// Flush sinks and drop the store reference, best-effort.
    fn release(&mut self) {
        for def in self.registry.iter_mut() {
            def.sink.flush();
        }
        debug!("engine resources released");
    }
}

/// Generate one definition: render the body set, dispatch the bytes, and
/// update counters. Publishes the counters to the definition's control
/// values when a prefix is configured.
fn generate_def(
    store: &dyn VarStore,
    renderer: &mut Renderer,
    def: &mut MsgDef,
) -> Result<(), EngineError> {
    debug!(name = def.name(), "generating message");

    let result = match renderer.render(store, &def.body_set) {
        Ok(message) => def.sink.dispatch(&message),
        Err(err) => Err(err),
    };

    match &result {
        Ok(()) => def.tx_count += 1,
        Err(err) => {
            warn!(name = def.name(), error = %err, "message generation failed");
            def.err_count += 1;
        }
    }

    publish_counters(store, def);
    result
}

/// Mirror the enable switch into the definition and honor a pending rescan
/// request. Control-value faults are logged, never fatal.
fn sync_controls(store: &dyn VarStore, def: &mut MsgDef) {
    let Some(controls) = def.controls else {
        return;
    };

    match store.value(controls.enable) {
        Ok(VarValue::Bool(enabled)) => def.enabled = enabled,
        Ok(_) | Err(_) => {}
    }

    if let Ok(VarValue::Bool(true)) = store.value(controls.rescan) {
        info!(name = def.name(), "rescanning variable sets");
        if let Err(err) = def.rescan(store) {
            warn!(name = def.name(), error = %err, "rescan failed");
            def.err_count += 1;
        }
        if let Err(err) = store.set_value(controls.rescan, VarValue::Bool(false)) {
            debug!(name = def.name(), error = %err, "failed to clear rescan switch");
        }
    }
}

fn publish_counters(store: &dyn VarStore, def: &MsgDef) {
    let Some(controls) = def.controls else {
        return;
    };

    if let Err(err) = store.set_value(controls.tx_count, VarValue::Uint(def.tx_count)) {
        debug!(name = def.name(), error = %err, "failed to publish txcount");
    }
    if let Err(err) = store.set_value(controls.err_count, VarValue::Uint(def.err_count)) {
        debug!(name = def.name(), error = %err, "failed to publish errcount");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::MsgConfig;
    use crate::store::{InMemoryStore, VarRegistration};

    fn seeded_store() -> Arc<InMemoryStore> {
        let store = InMemoryStore::new();
        for (name, value) in [("x", "1"), ("y", "hello")] {
            store
                .register(VarRegistration::new(name, VarValue::from(value)))
                .unwrap();
        }
        Arc::new(store)
    }

    fn engine_with(store: &Arc<InMemoryStore>, docs: &[&str]) -> MsgEngine {
        let mut registry = DefRegistry::new();
        for (i, doc) in docs.iter().enumerate() {
            let config: MsgConfig = serde_json::from_str(doc).unwrap();
            let def = MsgDef::from_config(store.as_ref(), None, format!("m{i}"), config).unwrap();
            registry.insert(def);
        }
        let store: Arc<dyn VarStore> = Arc::clone(store) as Arc<dyn VarStore>;
        MsgEngine::new(store, registry)
    }

    #[test]
    fn countdown_fires_every_n_pulses() {
        let store = seeded_store();
        let mut engine = engine_with(&store, &[r#"{ "enabled": true, "interval": 3, "vars": ["x"] }"#]);

        // Three full periods: one fire per period, at pulses 3, 6 and 9.
        for pulse in 1..=9u64 {
            engine.pulse();
            let expected = pulse / 3;
            assert_eq!(
                engine.registry().get(0).unwrap().tx_count(),
                expected,
                "after pulse {pulse}"
            );
        }
    }

    #[test]
    fn zero_interval_definitions_never_fire_on_pulse() {
        let store = seeded_store();
        let mut engine = engine_with(&store, &[r#"{ "enabled": true, "interval": 0, "vars": ["x"] }"#]);

        for _ in 0..10 {
            engine.pulse();
        }
        let def = engine.registry().get(0).unwrap();
        assert_eq!(def.tx_count(), 0);
        assert_eq!(def.countdown(), 0);
    }

    #[test]
    fn disabled_definitions_freeze_countdown() {
        let store = seeded_store();
        let mut engine = engine_with(
            &store,
            &[r#"{ "enabled": false, "interval": 2, "vars": ["x"] }"#],
        );

        for _ in 0..6 {
            engine.pulse();
        }
        let def = engine.registry().get(0).unwrap();
        assert_eq!(def.tx_count(), 0);
        assert_eq!(def.countdown(), 2);
    }

    #[test]
    fn enable_switch_suppresses_and_resumes_firing() {
        let store = seeded_store();
        let mut engine = engine_with(
            &store,
            &[r#"{ "enabled": true, "prefix": "/m", "interval": 2, "vars": ["x"] }"#],
        );
        let enable = store.find_by_name("/m/enable").unwrap().unwrap();

        engine.pulse();
        engine.pulse();
        assert_eq!(engine.registry().get(0).unwrap().tx_count(), 1);
        let countdown_at_disable = engine.registry().get(0).unwrap().countdown();

        // Disable between pulses: no countdown movement, no firing.
        store.set_value(enable, VarValue::Bool(false)).unwrap();
        for _ in 0..5 {
            engine.pulse();
        }
        let def = engine.registry().get(0).unwrap();
        assert_eq!(def.tx_count(), 1);
        assert_eq!(def.countdown(), countdown_at_disable);

        // Re-enable: the schedule picks up where it stopped.
        store.set_value(enable, VarValue::Bool(true)).unwrap();
        engine.pulse();
        engine.pulse();
        assert_eq!(engine.registry().get(0).unwrap().tx_count(), 2);
    }

    #[test]
    fn failing_definition_does_not_block_later_ones() {
        let store = seeded_store();
        // Registry order is reverse load order: the mqueue definition
        // (no transport attached, fails loudly) is processed first.
        let mut engine = engine_with(
            &store,
            &[
                r#"{ "enabled": true, "interval": 1, "vars": ["x"] }"#,
                r#"{ "enabled": true, "interval": 1, "output_type": "mqueue", "output": "/q", "vars": ["x"] }"#,
            ],
        );

        engine.pulse();

        let failing = engine.registry().get(0).unwrap();
        assert_eq!(failing.err_count(), 1);
        assert_eq!(failing.tx_count(), 0);

        let healthy = engine.registry().get(1).unwrap();
        assert_eq!(healthy.tx_count(), 1);
        assert_eq!(healthy.err_count(), 0);
    }

    #[test]
    fn generate_fires_trigger_only_definitions() {
        let store = seeded_store();
        let mut engine = engine_with(&store, &[r#"{ "enabled": true, "interval": 0, "vars": ["x"] }"#]);

        engine.generate(0).unwrap();
        assert_eq!(engine.registry().get(0).unwrap().tx_count(), 1);

        let err = engine.generate(9).unwrap_err();
        assert!(matches!(err, EngineError::UnknownDefinition { index: 9 }));
    }

    #[test]
    fn counters_publish_to_control_values() {
        let store = seeded_store();
        let mut engine = engine_with(
            &store,
            &[r#"{ "enabled": true, "prefix": "/pub", "interval": 1, "vars": ["x"] }"#],
        );

        engine.pulse();
        engine.pulse();

        let tx = store.find_by_name("/pub/txcount").unwrap().unwrap();
        assert_eq!(store.value(tx).unwrap(), VarValue::Uint(2));
        let errs = store.find_by_name("/pub/errcount").unwrap().unwrap();
        assert_eq!(store.value(errs).unwrap(), VarValue::Uint(0));
    }

    #[test]
    fn rescan_switch_reresolves_and_clears() {
        let store = seeded_store();
        store
            .register(VarRegistration::new("sensor1", VarValue::from("1")))
            .unwrap();
        let mut engine = engine_with(
            &store,
            &[r#"{ "enabled": true, "prefix": "/r", "interval": 1, "vars": { "match": "sensor" } }"#],
        );
        assert_eq!(engine.registry().get(0).unwrap().body().len(), 1);

        // A new variable matching the query appears after load.
        store
            .register(VarRegistration::new("sensor2", VarValue::from("2")))
            .unwrap();
        let rescan = store.find_by_name("/r/rescan").unwrap().unwrap();
        store.set_value(rescan, VarValue::Bool(true)).unwrap();

        engine.pulse();

        assert_eq!(engine.registry().get(0).unwrap().body().len(), 2);
        assert_eq!(store.value(rescan).unwrap(), VarValue::Bool(false));
    }

    #[test]
    fn run_stops_on_shutdown() {
        let store = seeded_store();
        let engine = engine_with(&store, &[r#"{ "enabled": true, "interval": 1, "vars": ["x"] }"#]);
        let mut engine = engine.with_period(Duration::from_millis(5));

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let handle = std::thread::spawn(move || {
            engine.run(&shutdown_rx);
            engine
        });

        std::thread::sleep(Duration::from_millis(60));
        shutdown_tx.send(()).unwrap();
        let engine = handle.join().unwrap();

        // At least one pulse happened before shutdown.
        assert!(engine.registry().get(0).unwrap().tx_count() >= 1);
    }
}
