//! TTL Reaper
//!
//! Lazy eviction only catches keys someone reads. A key that expires and is
//! never touched again would otherwise sit in memory (and on disk) forever,
//! so a background task periodically sweeps every open database and evicts
//! whatever has expired, through the same path reads use.
//!
//! The reaper runs as a Tokio task:
//! 1. Sleeps for the configured interval (default 60s)
//! 2. Wakes up and calls [`StorageEngine::cleanup_expired`]
//! 3. Logs per-database and total counts when anything was evicted
//!
//! Stop it before syncing the journals at shutdown.

use crate::config::DEFAULT_REAPER_INTERVAL;
use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Configuration for the TTL reaper.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Time between sweeps
    pub interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REAPER_INTERVAL,
        }
    }
}

/// A handle to the running reaper.
///
/// Dropping the handle signals the task to stop.
#[derive(Debug)]
pub struct Reaper {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Reaper {
    /// Spawns the reaper on the current Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use jsondb::storage::{Reaper, ReaperConfig, StorageEngine};
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::open(config)?);
    /// let reaper = Reaper::start(Arc::clone(&engine), ReaperConfig::default());
    ///
    /// // ...
    ///
    /// reaper.shutdown().await;
    /// engine.sync_all()?;
    /// ```
    pub fn start(engine: Arc<StorageEngine>, config: ReaperConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(interval_secs = config.interval.as_secs_f64(), "TTL reaper started");
        let task = tokio::spawn(reaper_loop(engine, config, shutdown_rx));

        Self {
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Signals the reaper to stop without waiting for it.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stops the reaper and waits for any sweep in progress to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "TTL reaper task ended abnormally");
            }
        }
        info!("TTL reaper stopped");
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn reaper_loop(
    engine: Arc<StorageEngine>,
    config: ReaperConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("TTL reaper received shutdown signal");
                    return;
                }
            }
        }

        // sweeping touches the disk; keep it off the async workers
        let sweep_engine = Arc::clone(&engine);
        let report = match tokio::task::spawn_blocking(move || sweep_engine.cleanup_expired()).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "TTL sweep failed");
                continue;
            }
        };

        for (db, count) in &report.per_db {
            info!(db = *db, evicted = *count, "Evicted expired keys");
        }
        if report.total > 0 {
            info!(
                evicted = report.total,
                databases = report.per_db.len(),
                "TTL sweep complete"
            );
        }
    }
}
