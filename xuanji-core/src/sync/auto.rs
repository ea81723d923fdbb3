//! Periodic background sync.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::engine::SyncEngine;
use super::error::SyncError;

const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Runs incremental sync on a fixed interval until shut down. The first run
/// starts immediately.
pub struct AutoSync {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl AutoSync {
    pub fn spawn(engine: Arc<SyncEngine>, interval: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);
        let interval = interval.max(MIN_INTERVAL);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(interval_secs = interval.as_secs(), "auto-sync started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match engine.incremental_sync().await {
                            Ok(result) if result.success => {
                                tracing::debug!(%result, "auto-sync run complete");
                            }
                            Ok(result) => {
                                tracing::warn!(%result, "auto-sync run had errors");
                            }
                            Err(SyncError::AlreadyRunning) => {
                                tracing::debug!("auto-sync skipped, a run is already active");
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "auto-sync run failed");
                            }
                        }
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("auto-sync stopped");
        });

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signals the loop to stop and waits for an in-flight run to finish.
    /// Calling it again is a no-op.
    pub async fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.shutdown.send(true);
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "auto-sync task ended abnormally");
        }
    }
}
