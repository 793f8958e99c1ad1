// =============================================================================
// Aviator Signals — Main Entry Point
// =============================================================================
//
// Simulates a "prediction" feed for a crash-style game: an analysis
// countdown, a randomly generated signal with an entry window, and a
// bounded history of past signals. Values are uniformly sampled decoys.
//
// Subcommands:
//   run (default)   start the engine with the console view
//   history         print (or clear) the stored signal history
//   register        store the registration record required by `run`
//   init-config     write the loaded configuration (or defaults) to the
//                   config path, without env or CLI overrides
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod console;
mod engine_runtime;
mod history_store;
mod random;
mod registration;
mod runtime_config;
mod signal_engine;
mod signal_generator;
mod storage;
mod types;
mod util;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::history_store::HistoryStore;
use crate::random::StdRandom;
use crate::registration::RegistrationGate;
use crate::runtime_config::RuntimeConfig;
use crate::storage::{FileSlotStore, SlotStore};

#[derive(Parser, Debug)]
#[command(name = "aviator-signals", about = "Simulated prediction signal feed", version)]
struct Cli {
    /// Runtime configuration file.
    #[arg(long, global = true, env = "SIGNAL_CONFIG", default_value = "runtime_config.json")]
    config: PathBuf,

    /// Directory holding the persisted slots (overrides the config file).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the signal engine with the console view.
    Run,
    /// Print the stored signal history, most recent first.
    History {
        /// Remove every stored entry instead of printing.
        #[arg(long, default_value_t = false)]
        clear: bool,
    },
    /// Store the registration record.
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        whatsapp: String,
    },
    /// Write the loaded configuration (or defaults) to the config path.
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let file_config = RuntimeConfig::load(&cli.config).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    let config = file_config.with_overrides(cli.data_dir);

    // ── 2. Persistence ───────────────────────────────────────────────────
    let slots: Arc<dyn SlotStore> = Arc::new(FileSlotStore::new(&config.data_dir));
    let history = HistoryStore::new(slots.clone(), config.history_key.clone());
    let gate = RegistrationGate::new(slots, config.user_key.clone());

    match cli.command.unwrap_or(Commands::Run) {
        Commands::History { clear } => {
            if clear {
                history.clear().context("failed to clear history")?;
                info!("history cleared");
            } else {
                println!("{}", console::render_history(&history.read_all()));
            }
            Ok(())
        }
        Commands::Register { name, whatsapp } => {
            if gate.is_registered() {
                info!("replacing existing registration");
            }
            let registration = gate.register(&name, &whatsapp)?;
            println!("Registered {}.", registration.name);
            Ok(())
        }
        Commands::InitConfig => {
            file_config.save(&cli.config)?;
            println!("Wrote {}", cli.config.display());
            Ok(())
        }
        Commands::Run => run(config, history, gate).await,
    }
}

async fn run(config: RuntimeConfig, history: HistoryStore, gate: RegistrationGate) -> Result<()> {
    let Some(user) = gate.current() else {
        bail!("no registration found; run `register --name <NAME> --whatsapp <NUMBER>` first");
    };

    info!(
        user = %user.name,
        data_dir = %config.data_dir.display(),
        tick_ms = config.engine.tick_interval_ms,
        seeded = config.seed.is_some(),
        "Starting signal engine"
    );

    // ── 3. Engine ────────────────────────────────────────────────────────
    let handle = engine_runtime::spawn_engine(
        config.engine.clone(),
        Box::new(StdRandom::from_seed_option(config.seed)),
        history.clone(),
        config.time_format.clone(),
    )
    .context("invalid engine configuration")?;

    // ── 4. View ──────────────────────────────────────────────────────────
    if let Err(e) = console::run(&handle, &history).await {
        error!(error = %e, "console stopped with an error");
    }

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    warn!("Shutting down signal engine");
    handle.shutdown().await;
    info!("Signal engine shut down complete.");
    Ok(())
}
