//! Runs the Stagehand server management service.
//!
//! Usage:
//!
//! ```text
//! stagehand [--config <path>] [--listen <address>] [--log-filter <filter>]
//! ```
//!
//! Without `--config` the service starts with no server types and listens on
//! the default control address. `--listen` overrides `gateway.listen` from the
//! file. The log filter defaults to `RUST_LOG`, then to `stagehand=info`.
//!
//! The service runs until it receives Ctrl-C (or SIGTERM on Unix), then shuts
//! down as configured in `[shutdown]`.

use camino::Utf8PathBuf;
use clap::Parser;
use mockable::DefaultClock;
use stagehand::config::{ConfigError, StagehandConfig, load_config};
use stagehand::lifecycle::adapters::TokioProcessLauncher;
use stagehand::protocol::{GatewayError, bind};
use stagehand::service::{ServiceError, Stagehand};
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Builder;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "stagehand=info";

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that stop the service from starting.
#[derive(Debug, Error)]
enum StartupError {
    #[error("invalid log filter: {0}")]
    LogFilter(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("runtime init failed: {0}")]
    RuntimeInit(#[source] io::Error),
}

#[derive(Debug, Parser)]
#[command(name = "stagehand")]
#[command(about = "Server management service for development tools", long_about = None)]
struct Cli {
    /// Path to stagehand.toml
    #[arg(long, short)]
    config: Option<Utf8PathBuf>,

    /// Control endpoint address, overriding gateway.listen
    #[arg(long)]
    listen: Option<String>,

    /// tracing filter directive, overriding RUST_LOG
    #[arg(long)]
    log_filter: Option<String>,
}

fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    init_tracing(cli.log_filter.as_deref())?;
    let config = resolve_config(&cli)?;

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .thread_name("stagehand")
        .build()
        .map_err(StartupError::RuntimeInit)?;
    runtime.block_on(run(config))?;
    Ok(())
}

fn init_tracing(directive: Option<&str>) -> Result<(), StartupError> {
    let filter = directive.map_or_else(
        || {
            Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        },
        |value| EnvFilter::try_new(value).map_err(|err| StartupError::LogFilter(err.to_string())),
    )?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<StagehandConfig, StartupError> {
    let mut config = cli
        .config
        .as_deref()
        .map_or_else(|| Ok(StagehandConfig::default()), load_config)?;
    if let Some(listen) = &cli.listen {
        config.gateway.listen.clone_from(listen);
        config.validate()?;
    }
    Ok(config)
}

async fn run(config: StagehandConfig) -> Result<(), StartupError> {
    let launcher = Arc::new(TokioProcessLauncher::new(config.shutdown.grace_period()));
    let service = Stagehand::from_config(&config, launcher, Arc::new(DefaultClock))?;
    let listener = bind(config.listen_address()?).await?;

    let serving = {
        let server = service.clone();
        tokio::spawn(async move { server.serve(listener).await })
    };

    wait_for_shutdown_signal().await;
    service.shutdown(config.shutdown.stop_servers).await;
    if let Err(err) = serving.await {
        warn!(error = %err, "control endpoint task ended abnormally");
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(error = %err, "SIGTERM handler unavailable; waiting for Ctrl-C only");
            wait_for_ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        () = wait_for_ctrl_c() => {}
        _ = terminate.recv() => info!("received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl-C"),
        Err(err) => warn!(error = %err, "Ctrl-C handler failed; shutting down"),
    }
}

#[cfg(test)]
#[path = "stagehand/tests.rs"]
mod tests;
