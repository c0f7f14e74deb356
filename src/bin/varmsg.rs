//! varmsg daemon.
//!
//! Loads message definitions from configuration files, runs the generation
//! engine against the embedded variable store, and shuts down cleanly when
//! an interrupt or terminate signal arrives. The async runtime is only a
//! signal-aware shell; the engine itself runs synchronously on a blocking
//! thread.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use crossbeam_channel::bounded;
use serde::Deserialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use varmsg::{
    DefLoader, DefRegistry, InMemoryStore, MsgEngine, VarFlags, VarRegistration, VarStore,
    VarValue,
};

type ShellError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser)]
#[command(name = "varmsg")]
#[command(about = "Periodic variable message generator", long_about = None)]
struct Cli {
    /// Verbose output.
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Configuration file for a single message.
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    config_file: Option<PathBuf>,

    /// Configuration directory with many configs.
    #[arg(short = 'd', long = "dir", value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Preload the embedded store from a JSON variable list.
    #[arg(long, value_name = "FILE")]
    seed: Option<PathBuf>,
}

/// One entry of a `--seed` file.
#[derive(Debug, Deserialize)]
struct SeedVar {
    name: String,
    value: serde_json::Value,
    #[serde(default, rename = "instanceID")]
    instance_id: u32,
    #[serde(default)]
    flags: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Resolves when an interrupt or terminate signal arrives.
async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn seed_store(store: &InMemoryStore, path: &Path) -> Result<usize, ShellError> {
    let text = std::fs::read_to_string(path)?;
    let seeds: Vec<SeedVar> = serde_json::from_str(&text)?;

    let count = seeds.len();
    for seed in seeds {
        let flags = match &seed.flags {
            Some(list) => store.parse_flags(list)?,
            None => VarFlags::NONE,
        };
        store.register(
            VarRegistration::new(seed.name, VarValue::from(seed.value))
                .with_instance(seed.instance_id)
                .with_flags(flags)
                .with_tags(seed.tags),
        )?;
    }
    Ok(count)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    // Open the variable store. The embedded backend cannot fail to open;
    // an external backend would make this fatal on connection error.
    let store = Arc::new(InMemoryStore::new());

    if let Some(seed) = &cli.seed {
        match seed_store(&store, seed) {
            Ok(count) => info!(count, path = %seed.display(), "store seeded"),
            Err(err) => {
                error!(path = %seed.display(), error = %err, "failed to seed store");
                return ExitCode::FAILURE;
            }
        }
    }

    let store: Arc<dyn VarStore> = store;
    let loader = DefLoader::new(Arc::clone(&store));
    let mut registry = DefRegistry::new();

    if let Some(dir) = &cli.config_dir {
        match loader.load_dir(&mut registry, dir) {
            Ok(loaded) => {
                info!(loaded, dir = %dir.display(), "configuration directory processed");
            }
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "failed to read configuration directory");
            }
        }
    }

    if let Some(file) = &cli.config_file {
        if let Err(err) = loader.load_file(&mut registry, file) {
            warn!(path = %file.display(), error = %err, "failed to load configuration file");
        }
    }

    if registry.is_empty() {
        error!("at least one configuration must be specified");
        return ExitCode::FAILURE;
    }

    let mut engine = MsgEngine::new(store, registry);
    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

    let mut worker = tokio::task::spawn_blocking(move || {
        engine.run(&shutdown_rx);
    });

    tokio::select! {
        () = wait_for_termination() => {
            info!("termination signal received");
            let _ = shutdown_tx.try_send(());
            if let Err(err) = (&mut worker).await {
                error!(error = %err, "engine task failed during shutdown");
                return ExitCode::FAILURE;
            }
        }
        result = &mut worker => {
            if let Err(err) = result {
                error!(error = %err, "engine task failed");
                return ExitCode::FAILURE;
            }
        }
    }

    info!("varmsg stopped");
    ExitCode::SUCCESS
}
