//! # Changeflow — deferred change scheduler service.
//!
//! Accepts changes bound to a future implementation time, fires the target
//! endpoint when that time arrives unless the change has been canceled, and
//! sweeps pending changes against the status authority in the background.
//!
//! Usage:
//!   changeflow                       # Start with ~/.changeflow/config.toml
//!   changeflow --port 8080           # Custom gateway port
//!   changeflow --config ./dev.toml   # Custom config file

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use changeflow_core::ChangeflowConfig;
use changeflow_engine::{
    ChangeExecutor, HttpExecutor, HttpStatusOracle, SchedulerEngine, StatusOracle, TaskStore,
};
use changeflow_gateway::AppState;

#[derive(Parser)]
#[command(
    name = "changeflow",
    version,
    about = "⏰ Changeflow — deferred change scheduler"
)]
struct Cli {
    /// Path to config.toml (defaults to ~/.changeflow/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Override the gateway port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the data directory holding the task snapshot
    #[arg(long)]
    data_dir: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "changeflow=debug,changeflow_engine=debug,changeflow_gateway=debug,tower_http=debug"
    } else {
        "changeflow=info,changeflow_engine=info,changeflow_gateway=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => ChangeflowConfig::load_from(Path::new(&expand_path(path)))?,
        None => ChangeflowConfig::load()?,
    };
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }
    if let Some(data_dir) = cli.data_dir {
        config.scheduler.data_dir = data_dir;
    }

    let data_dir = PathBuf::from(expand_path(&config.scheduler.data_dir));
    let store = TaskStore::new(&data_dir);
    let oracle: Arc<dyn StatusOracle> = Arc::new(HttpStatusOracle::new(
        &config.scheduler.status_endpoint,
        Duration::from_secs(config.scheduler.status_check_timeout_secs),
    ));
    let executor: Arc<dyn ChangeExecutor> = Arc::new(HttpExecutor::new(
        &config.scheduler.target_endpoint,
        Duration::from_secs(config.scheduler.request_timeout_secs),
    ));

    let engine = Arc::new(SchedulerEngine::new(
        &config.scheduler,
        store,
        oracle,
        executor,
    ));
    engine.restore();
    engine.start();

    let state = AppState {
        config: config.gateway.clone(),
        engine: engine.clone(),
        start_time: std::time::Instant::now(),
    };
    changeflow_gateway::run(state).await?;

    engine.stop().await;
    Ok(())
}
