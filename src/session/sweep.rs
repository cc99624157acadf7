//! Periodic sweep of expired sessions

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::store::SessionStore;

/// Handle to a running sweep task.
///
/// Dropping the handle also stops the task.
pub struct SweepHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Stop the sweep and wait for the task to finish
    pub async fn shutdown(self) {
        info!("Stopping session sweep");
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            warn!("Session sweep task ended abnormally: {}", e);
        }
    }

    /// Whether the task has already exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the sweep task, running every `interval`
pub fn spawn_sweep_task(store: Arc<SessionStore>, interval: Duration) -> SweepHandle {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    let removed = store.sweep_expired();
                    debug!(removed, remaining = store.len(), "Session sweep completed");
                }
            }
        }
        debug!("Session sweep task exited");
    });

    info!(interval_secs = interval.as_secs(), "Session sweep task started");

    SweepHandle { shutdown_tx, task }
}
