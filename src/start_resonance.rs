//! Startup helpers for the resonance server.
//!
//! Configuration comes from an optional JSON file (`RESONANCE_CONFIG`) with
//! `RESONANCE_*` environment overrides on top.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::Notify;

use crate::resonance::{
    EngineBackends, FixedResults, ResonanceConfig, ResonanceEngine, SessionSweeper,
};
use crate::server::{self, AppState};

/// Run the server (used by the `resonance-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();
    tracing::info!("Starting resonance engine v{}", env!("CARGO_PKG_VERSION"));

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(serve()) {
        tracing::error!("Server error: {e:#}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Install the global `tracing` subscriber (`RUST_LOG` aware, `info` by default).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .try_init();
}

/// Load configuration from `RESONANCE_CONFIG` (if set) and the environment.
///
/// # Errors
/// Returns an error if the file cannot be read or a value is invalid.
pub fn load_config() -> anyhow::Result<ResonanceConfig> {
    let config = match std::env::var("RESONANCE_CONFIG") {
        Ok(path) => ResonanceConfig::from_json_file(&path)
            .with_context(|| format!("failed to load config from {path}"))?,
        Err(_) => ResonanceConfig::default(),
    };
    let config = config
        .with_env_overrides()
        .context("invalid RESONANCE_* override")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Build an engine wired to the fixed demo backends.
///
/// # Errors
/// Returns an error if the embedder, store, or engine cannot be initialized.
pub async fn initialize(config: ResonanceConfig) -> anyhow::Result<Arc<ResonanceEngine>> {
    let backends = EngineBackends::with_search(
        Arc::new(FixedResults::lexical_demo()?),
        Arc::new(FixedResults::vector_demo()?),
        &config,
    )
    .await
    .context("failed to initialize backends")?;

    let engine = ResonanceEngine::new(config, backends).context("failed to build engine")?;
    Ok(Arc::new(engine))
}

async fn serve() -> anyhow::Result<()> {
    let config = load_config()?;
    let maintenance = config.maintenance.clone();
    let engine = initialize(config).await?;

    let sweeper = SessionSweeper::new(Arc::clone(engine.integrity()), maintenance);
    let stop_sweeper: Arc<Notify> = sweeper.shutdown_notifier();
    let sweeper_task = sweeper.spawn();

    let state = Arc::new(AppState::new(engine));
    let port = get_port();

    let result = server::run_server_with_shutdown(state, port, shutdown_signal()).await;

    stop_sweeper.notify_one();
    sweeper_task.await.context("session sweeper panicked")?;

    result.map_err(|err| anyhow::anyhow!("http server failed: {err}"))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Get configured server port.
#[must_use]
pub fn get_port() -> u16 {
    std::env::var("RESONANCE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(server::DEFAULT_PORT)
}
