//! Drains the sync queue into the remote system.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::config::SyncConfig;
use crate::connectivity::Connectivity;
use crate::db::LocalStore;
use crate::error::{Error, Result};
use crate::models::{Collection, Operation, QueueItem, QueueStatus, RecordId};
use crate::notify::Notifier;
use crate::queue::SyncQueue;
use crate::remote::{returned_id, RemoteClient, RemoteResult};
use crate::state::SyncState;

/// Display time for the summary of a pass with failures
const SUMMARY_DURATION: Duration = Duration::from_secs(4);

/// Why a drain request did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another pass is running; this request is coalesced into it
    AlreadyDraining,
    Offline,
}

/// Counts for one completed drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Failed items that reached the attempt limit during this pass
    pub parked: usize,
    /// Creates whose local record was re-keyed to the remote id
    pub adopted: usize,
    /// Items left pending behind an unsent create for the same record
    pub deferred: usize,
}

impl DrainSummary {
    pub const fn processed(&self) -> usize {
        self.succeeded + self.failed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum DrainOutcome {
    Skipped { reason: SkipReason },
    Completed(DrainSummary),
}

impl DrainOutcome {
    pub const fn summary(&self) -> Option<&DrainSummary> {
        match self {
            Self::Completed(summary) => Some(summary),
            Self::Skipped { .. } => None,
        }
    }
}

/// Clears the draining flag when a pass ends, however it ends
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Pushes queued mutations to the remote, one at a time and oldest first.
///
/// At most one pass runs at a time. A remote failure only affects its own
/// item, which is retried on later passes until the attempt limit parks it.
pub struct SyncEngine {
    store: Arc<LocalStore>,
    queue: SyncQueue,
    remote: Arc<dyn RemoteClient>,
    connectivity: Connectivity,
    notifier: Arc<dyn Notifier>,
    config: SyncConfig,
    draining: AtomicBool,
    state: watch::Sender<SyncState>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("draining", &self.is_draining())
            .field("state", &self.current_state())
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(
        store: Arc<LocalStore>,
        queue: SyncQueue,
        remote: Arc<dyn RemoteClient>,
        connectivity: Connectivity,
        notifier: Arc<dyn Notifier>,
        config: SyncConfig,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            store,
            queue,
            remote,
            connectivity,
            notifier,
            config,
            draining: AtomicBool::new(false),
            state,
        }
    }

    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub const fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    pub const fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub(crate) fn set_state(&self, state: SyncState) {
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    fn try_begin(&self) -> Option<DrainGuard<'_>> {
        self.draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DrainGuard(&self.draining))
    }

    /// Requeue items a previous process left `IN_FLIGHT`.
    ///
    /// Does nothing while a pass is running.
    pub fn recover_interrupted(&self) -> Result<usize> {
        let Some(_guard) = self.try_begin() else {
            return Ok(0);
        };
        self.queue.recover_in_flight()
    }

    /// Run one drain pass over every `PENDING` item
    pub async fn drain(&self) -> Result<DrainOutcome> {
        let Some(_guard) = self.try_begin() else {
            tracing::debug!("Drain already running; request coalesced");
            return Ok(DrainOutcome::Skipped {
                reason: SkipReason::AlreadyDraining,
            });
        };
        if !self.connectivity.is_online() {
            self.set_state(SyncState::Offline);
            return Ok(DrainOutcome::Skipped {
                reason: SkipReason::Offline,
            });
        }

        self.set_state(SyncState::Syncing);
        match self.drain_ready().await {
            Ok(summary) => {
                self.finish(&summary);
                Ok(DrainOutcome::Completed(summary))
            }
            Err(error) => {
                tracing::error!("Drain aborted by local store error: {error}");
                self.set_state(SyncState::Error);
                Err(error)
            }
        }
    }

    async fn drain_ready(&self) -> Result<DrainSummary> {
        let ready = self.queue.dequeue_ready()?;
        let mut summary = DrainSummary::default();
        if ready.is_empty() {
            return Ok(summary);
        }
        tracing::info!("Draining {} queued change(s)", ready.len());

        for queued in ready {
            if queued.operation != Operation::Create
                && queued.entity_id.is_temporary()
                && self.has_unsent_create(queued.entity_type, &queued.entity_id)?
            {
                summary.deferred += 1;
                continue;
            }
            if !self.queue.mark_in_flight(queued.id)? {
                continue;
            }
            // Re-read: the payload may have been merged or re-keyed meanwhile.
            let Some(item) = self.queue.get(queued.id)? else {
                continue;
            };

            match self.push(&item).await {
                Ok(inserted) => {
                    summary.succeeded += 1;
                    match self.complete(&item, inserted.as_ref()) {
                        Ok(true) => summary.adopted += 1,
                        Ok(false) => {}
                        Err(error) => self.settle_sent(&item, &error)?,
                    }
                }
                Err(error) => {
                    summary.failed += 1;
                    match self.queue.mark_failed(item.id, &error.to_string()) {
                        Ok(failed) if failed.status == QueueStatus::Failed => {
                            summary.parked += 1;
                            self.notifier.error(&format!(
                                "Could not sync {} of {} {} after {} attempts: {error}",
                                failed.operation.as_str().to_lowercase(),
                                failed.entity_type,
                                failed.entity_id,
                                failed.attempts
                            ));
                        }
                        Ok(_) => {}
                        Err(store_error) => {
                            tracing::error!(
                                "Could not record failure of queue item #{}: {store_error}",
                                item.id
                            );
                            self.queue.release(item.id)?;
                        }
                    }
                }
            }
        }
        Ok(summary)
    }

    /// The remote accepted `item` but storing the result failed.
    ///
    /// The item is removed so it is never sent twice; a create keeps its
    /// temporary id locally.
    fn settle_sent(&self, item: &QueueItem, error: &Error) -> Result<()> {
        tracing::error!(
            "Sent {} {} {} but could not store the result: {error}",
            item.operation,
            item.entity_type,
            item.entity_id
        );
        self.queue.mark_succeeded(item.id)?;
        self.notifier.error(&format!(
            "Synced {} {} but could not update the local copy: {error}",
            item.entity_type, item.entity_id
        ));
        Ok(())
    }

    fn has_unsent_create(&self, collection: Collection, id: &RecordId) -> Result<bool> {
        Ok(self
            .store
            .read(|tx| tx.unsent_create(collection, id))?
            .is_some())
    }

    /// Send one item; a create returns the stored row
    async fn push(&self, item: &QueueItem) -> RemoteResult<Option<serde_json::Value>> {
        tracing::debug!(
            "Sending {} {} {} (queue #{})",
            item.operation,
            item.entity_type,
            item.entity_id,
            item.id
        );
        match item.operation {
            Operation::Create => self
                .remote
                .insert(item.entity_type, &item.payload)
                .await
                .map(Some),
            Operation::Update => self
                .remote
                .update(item.entity_type, &item.entity_id, &item.payload)
                .await
                .map(|()| None),
            Operation::Delete => self
                .remote
                .delete(item.entity_type, &item.entity_id)
                .await
                .map(|()| None),
        }
    }

    /// Remove a sent item, adopting the remote id of a create when enabled.
    ///
    /// Returns whether the local record was re-keyed.
    fn complete(&self, item: &QueueItem, inserted: Option<&serde_json::Value>) -> Result<bool> {
        let adopted_id = match inserted {
            Some(row) if self.config.adopt_remote_ids => match returned_id(row) {
                Ok(id) if id != item.entity_id => Some(id),
                Ok(_) => None,
                Err(error) => {
                    tracing::warn!(
                        "Created {} {} but could not read its remote id: {error}",
                        item.entity_type,
                        item.entity_id
                    );
                    None
                }
            },
            _ => None,
        };

        let Some(new_id) = adopted_id else {
            self.queue.mark_succeeded(item.id)?;
            return Ok(false);
        };

        let collection = item.entity_type;
        self.store
            .transaction(&[collection, Collection::SyncQueue], |tx| {
                tx.remove_queue_item(item.id)?;
                tx.rename_record(collection, &item.entity_id, &new_id)?;
                tx.retarget_queue_items(collection, &item.entity_id, &new_id)?;
                Ok(())
            })?;

        tracing::info!(
            "Adopted remote id {new_id} for {} {}",
            collection,
            item.entity_id
        );
        Ok(true)
    }

    fn finish(&self, summary: &DrainSummary) {
        if summary.processed() == 0 {
            self.set_state(SyncState::Synced);
            return;
        }

        tracing::info!(
            "Drain finished: {} synced, {} failed, {} parked, {} deferred",
            summary.succeeded,
            summary.failed,
            summary.parked,
            summary.deferred
        );
        if summary.failed == 0 {
            self.notifier
                .success(&format!("Synced {} change(s)", summary.succeeded));
            self.set_state(SyncState::Synced);
        } else {
            self.notifier.info(
                &format!(
                    "Synced {} change(s), {} failed",
                    summary.succeeded, summary.failed
                ),
                SUMMARY_DURATION,
            );
            self.set_state(SyncState::Error);
        }
    }
}
