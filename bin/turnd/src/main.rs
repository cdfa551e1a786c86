//! Viki turn driver.
//!
//! Reads JSON-lines turns from stdin and writes one JSON result per turn to
//! stdout. Logs go to stderr. An optional configuration file path may be
//! given as the first argument.

mod config;
mod driver;
mod error;

use crate::config::TurndConfig;
use crate::error::TurndError;
use rootcause::prelude::Report;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use viki_dialogue::DialoguePolicy;
use viki_memory::{ShardedContextStore, spawn_sweeper};
use viki_orchestrator::{EchoActionExecutor, InMemoryLongTermMemory, TurnOrchestrator};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            tracing::error!(error = %report, "turn driver failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Report<TurndError>> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = TurndConfig::load(config_path.as_deref()).map_err(|e| TurndError::Config {
        message: e.to_string(),
    })?;
    tracing::info!(
        ttl_seconds = config.store.ttl_seconds,
        max_concurrent_turns = config.max_concurrent_turns,
        goals = config.policy.catalog.len(),
        "Loaded configuration"
    );

    let shutdown = CancellationToken::new();
    let store = Arc::new(ShardedContextStore::new(&config.store));
    let sweeper = spawn_sweeper(store.clone(), config.store.sweep_interval(), shutdown.clone());

    let orchestrator = TurnOrchestrator::new(
        store,
        DialoguePolicy::new(config.policy),
        Arc::new(EchoActionExecutor),
        Arc::new(InMemoryLongTermMemory::new()),
        config.orchestrator,
    );

    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            on_signal.cancel();
        }
    });

    let stats = driver::run(
        &orchestrator,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        config.max_concurrent_turns,
        shutdown.clone(),
    )
    .await?;
    tracing::info!(
        processed = stats.processed,
        failed = stats.failed,
        "Input drained"
    );

    shutdown.cancel();
    sweeper.await.map_err(|e| TurndError::Task {
        message: e.to_string(),
    })?;
    Ok(())
}
