//! Background task that keeps the queue drained

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use super::engine::{DrainOutcome, SyncEngine};
use super::trigger::SyncTrigger;
use crate::state::SyncState;

/// Handle to the spawned drain loop
#[derive(Debug)]
pub struct SyncWorker {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl SyncWorker {
    /// Spawn the loop on the current tokio runtime.
    ///
    /// Drains on start, on every trigger request, when connectivity comes
    /// back, and on the configured interval while online.
    pub fn spawn(engine: Arc<SyncEngine>, trigger: SyncTrigger) -> Self {
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run(engine, trigger, shutdown_rx));
        Self {
            shutdown: Some(shutdown),
            handle,
        }
    }

    /// Stop the loop after any pass in progress completes
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(error) = (&mut self.handle).await {
            tracing::warn!("Sync worker ended abnormally: {error}");
        }
    }
}

async fn run(engine: Arc<SyncEngine>, trigger: SyncTrigger, mut shutdown: oneshot::Receiver<()>) {
    match engine.recover_interrupted() {
        Ok(0) => {}
        Ok(count) => tracing::info!("Requeued {count} interrupted item(s) on start"),
        Err(error) => tracing::warn!("Could not recover interrupted items: {error}"),
    }

    let mut online = engine.connectivity().subscribe();
    let mut interval = time::interval(engine.config().drain_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        "Sync worker started (interval {}s)",
        engine.config().drain_interval_secs
    );
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {
                if engine.connectivity().is_online() {
                    drain(&engine, "interval").await;
                } else {
                    engine.set_state(SyncState::Offline);
                }
            }
            () = trigger.requested() => drain(&engine, "request").await,
            changed = online.changed() => {
                if changed.is_err() {
                    break;
                }
                if *online.borrow_and_update() {
                    drain(&engine, "reconnect").await;
                } else {
                    engine.set_state(SyncState::Offline);
                }
            }
        }
    }
    tracing::info!("Sync worker stopped");
}

async fn drain(engine: &SyncEngine, reason: &str) {
    match engine.drain().await {
        Ok(DrainOutcome::Completed(summary)) if summary.processed() > 0 => {
            tracing::debug!("Drain ({reason}) processed {} item(s)", summary.processed());
        }
        Ok(_) => {}
        Err(error) => tracing::error!("Drain ({reason}) failed: {error}"),
    }
}
