//! Background sweeper pruning finished sessions.
//!
//! Committed and rolled-back sessions stay queryable for a retention window,
//! then are dropped from the table so it does not grow with every request.
//! Active sessions are never touched.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::resonance::core::config::MaintenanceConfig;
use crate::resonance::integrity::IntegrityManager;

/// Statistics from a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Number of finished sessions removed.
    pub pruned: usize,
    /// Sessions still tracked after the sweep.
    pub remaining: usize,
    /// Sweep duration in milliseconds.
    pub duration_ms: u64,
}

/// Background worker pruning finished sessions.
pub struct SessionSweeper {
    integrity: Arc<IntegrityManager>,
    config: MaintenanceConfig,
    shutdown: Arc<Notify>,
}

impl SessionSweeper {
    /// Create a new sweeper.
    #[must_use]
    pub fn new(integrity: Arc<IntegrityManager>, config: MaintenanceConfig) -> Self {
        Self {
            integrity,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a shutdown notifier to stop the sweeper.
    #[must_use]
    pub fn shutdown_notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Spawn the sweeper as a tokio task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Session sweeper is disabled");
            return;
        }

        let interval = Duration::from_secs(self.config.sweep_interval_seconds);
        info!(?interval, "Starting session sweeper");

        loop {
            tokio::select! {
                () = tokio::time::sleep(interval) => {
                    let stats = self.sweep();
                    if stats.pruned > 0 {
                        info!(
                            pruned = stats.pruned,
                            remaining = stats.remaining,
                            duration_ms = stats.duration_ms,
                            "Session sweep completed"
                        );
                    } else {
                        debug!(remaining = stats.remaining, "Session sweep found nothing to prune");
                    }
                }
                () = self.shutdown.notified() => {
                    info!("Session sweeper shutting down");
                    break;
                }
            }
        }
    }

    /// Run a single sweep.
    #[must_use]
    pub fn sweep(&self) -> SweepStats {
        let start = Instant::now();
        let retention = Duration::from_secs(self.config.finished_retention_seconds);
        let pruned = self.integrity.prune_finished(retention);

        SweepStats {
            pruned,
            remaining: self.integrity.len(),
            duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}
