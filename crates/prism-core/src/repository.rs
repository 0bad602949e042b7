//! Entity repositories: the only write path into entity collections.
//!
//! Every mutation lands in the local store together with its sync queue item
//! in a single transaction, and returns without waiting for the remote.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::db::{LocalStore, Query, StoreTx};
use crate::error::{Error, Result};
use crate::live::{LiveQuery, LiveViews};
use crate::models::{
    apply_patch, merge_object, patch_object, Collection, Contact, CustomField, CustomFieldSchema,
    Entity, Group, IdGenerator, NewQueueItem, Operation, QueueItem, RecordId, RecordMeta,
};
use crate::notify::{Notifier, SUCCESS_DURATION};
use crate::remote::RemoteClient;
use crate::sync::SyncTrigger;

pub type ContactRepository = EntityRepository<Contact>;
pub type GroupRepository = EntityRepository<Group>;
pub type CustomFieldSchemaRepository = EntityRepository<CustomFieldSchema>;
pub type CustomFieldRepository = EntityRepository<CustomField>;

/// Collaborators shared by every repository
#[derive(Clone)]
pub struct RepositoryDeps {
    pub store: Arc<LocalStore>,
    pub remote: Arc<dyn RemoteClient>,
    pub ids: Arc<dyn IdGenerator>,
    pub notifier: Arc<dyn Notifier>,
    pub trigger: SyncTrigger,
    pub views: Arc<LiveViews>,
    /// Minimum age of the last pull before a non-forced pull reads again
    pub freshness_window: Duration,
}

/// Result of [`EntityRepository::sync_from_remote`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// The last pull is within the freshness window; nothing was read
    Fresh,
    Pulled {
        upserted: usize,
        /// Remote rows that could not be decoded
        rejected: usize,
    },
}

pub struct EntityRepository<E: Entity> {
    deps: RepositoryDeps,
    last_pull: Mutex<Option<Instant>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> std::fmt::Debug for EntityRepository<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRepository")
            .field("collection", &E::COLLECTION)
            .field("last_pull", &*self.last_pull())
            .finish_non_exhaustive()
    }
}

const fn write_scope<E: Entity>() -> [Collection; 2] {
    [E::COLLECTION, Collection::SyncQueue]
}

impl<E: Entity> EntityRepository<E> {
    pub fn new(deps: RepositoryDeps) -> Self {
        Self {
            deps,
            last_pull: Mutex::new(None),
            _entity: PhantomData,
        }
    }

    fn last_pull(&self) -> MutexGuard<'_, Option<Instant>> {
        self.last_pull
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Notify the outcome of a local write and wake the worker on success
    fn report<T>(&self, operation: Operation, result: Result<T>) -> Result<T> {
        let verb = operation.as_str().to_lowercase();
        match &result {
            Ok(_) => {
                self.deps
                    .notifier
                    .success(&format!("{} {verb}d", capitalize(E::LABEL)));
                self.deps.trigger.request();
            }
            Err(error) => {
                tracing::warn!("Could not {verb} {}: {error}", E::LABEL);
                self.deps
                    .notifier
                    .error(&format!("Could not {verb} {}: {error}", E::LABEL));
            }
        }
        result
    }

    /// Store a new record under a temporary id and queue its `CREATE`
    pub fn create(&self, draft: E::Draft) -> Result<RecordId> {
        let result = self.try_create(draft);
        self.report(Operation::Create, result)
    }

    fn try_create(&self, draft: E::Draft) -> Result<RecordId> {
        let owner = self
            .deps
            .remote
            .current_principal()
            .ok_or(Error::NotAuthenticated)?;
        let id = self.deps.ids.temporary_id();
        let record = E::from_draft(RecordMeta::new(id.clone(), owner), draft);

        self.deps.store.transaction(&write_scope::<E>(), |tx| {
            record.validate(tx)?;
            tx.put(&record)?;
            tx.enqueue(&NewQueueItem {
                entity_type: E::COLLECTION,
                operation: Operation::Create,
                entity_id: id.clone(),
                payload: serde_json::to_value(&record)?,
            })?;
            Ok(())
        })?;

        tracing::debug!("Created {} {id}", E::LABEL);
        Ok(id)
    }

    /// Merge `patch` into the stored record and queue the change.
    ///
    /// While the record's `CREATE` has not been sent and nothing is queued
    /// after it, the change is folded into that item instead of queuing an
    /// `UPDATE`.
    pub fn update(&self, id: &RecordId, patch: &E::Patch) -> Result<E> {
        let result = self.try_update(id, patch);
        self.report(Operation::Update, result)
    }

    fn try_update(&self, id: &RecordId, patch: &E::Patch) -> Result<E> {
        let changes = patch_object(patch)?;

        self.deps.store.transaction(&write_scope::<E>(), |tx| {
            let current: E = tx
                .get(id)?
                .ok_or_else(|| Error::NotFound(format!("{} {id}", E::LABEL)))?;
            let mut updated = apply_patch(&current, &changes)?;
            updated.meta_mut().updated_at = Utc::now();
            updated.validate(tx)?;
            tx.put(&updated)?;

            let mut diff: Map<String, Value> = changes.clone();
            diff.insert(
                "updated_at".to_string(),
                serde_json::to_value(updated.meta().updated_at)?,
            );

            if let Some(create) = mergeable_create::<E>(tx, id)? {
                let mut payload = create.payload;
                merge_object(&mut payload, &diff);
                tx.set_queue_payload(create.id, &payload)?;
                tracing::debug!("Merged update into queued create #{}", create.id);
                return Ok(updated);
            }

            diff.insert("id".to_string(), serde_json::to_value(id)?);
            tx.enqueue(&NewQueueItem {
                entity_type: E::COLLECTION,
                operation: Operation::Update,
                entity_id: id.clone(),
                payload: Value::Object(diff),
            })?;
            Ok(updated)
        })
    }

    /// Remove a record; returns whether it existed.
    ///
    /// A record the remote has never seen is dropped along with its unsent
    /// queue items, so nothing is sent for it.
    pub fn delete(&self, id: &RecordId) -> Result<bool> {
        let result = self.try_delete(id);
        match result {
            Ok(false) => Ok(false),
            other => self.report(Operation::Delete, other),
        }
    }

    fn try_delete(&self, id: &RecordId) -> Result<bool> {
        self.deps.store.transaction(&write_scope::<E>(), |tx| {
            if !tx.delete::<E>(id)? {
                return Ok(false);
            }

            if id.is_temporary() {
                let discarded = tx.discard_unsent(E::COLLECTION, id)?;
                if discarded
                    .iter()
                    .any(|item| item.operation == Operation::Create)
                {
                    tracing::debug!(
                        "Dropped {} unsent item(s) for {} {id}",
                        discarded.len(),
                        E::LABEL
                    );
                    return Ok(true);
                }
            }

            tx.enqueue(&NewQueueItem {
                entity_type: E::COLLECTION,
                operation: Operation::Delete,
                entity_id: id.clone(),
                payload: json!({ "id": id }),
            })?;
            Ok(true)
        })
    }

    pub fn get(&self, id: &RecordId) -> Result<Option<E>> {
        self.deps.store.get(id)
    }

    pub fn list(&self, query: &Query) -> Result<Vec<E>> {
        self.deps.store.query(query)
    }

    /// Live results for `query`; see [`LiveViews::observe`]
    pub fn observe(&self, query: Query) -> Result<LiveQuery<E>> {
        self.deps.views.observe(query)
    }

    fn is_fresh(&self) -> bool {
        self.last_pull()
            .is_some_and(|pulled| pulled.elapsed() < self.deps.freshness_window)
    }

    /// Replace local copies with the remote collection.
    ///
    /// Without `force`, does nothing when the last successful pull is
    /// younger than the freshness window. Records that exist only locally
    /// are kept. A forced pull reports success; a scheduled one reports an
    /// info notice.
    pub async fn sync_from_remote(&self, force: bool) -> Result<PullOutcome> {
        if !force && self.is_fresh() {
            tracing::debug!("Skipping pull of {}: cache is fresh", E::COLLECTION);
            return Ok(PullOutcome::Fresh);
        }

        let result = self.pull().await;
        match &result {
            Ok(PullOutcome::Pulled { upserted, .. }) => {
                let message = format!("Refreshed {upserted} {} record(s)", E::LABEL);
                if force {
                    self.deps.notifier.success(&message);
                } else {
                    self.deps.notifier.info(&message, SUCCESS_DURATION);
                }
            }
            Ok(PullOutcome::Fresh) => {}
            Err(error) => {
                self.deps.notifier.error(&format!(
                    "Could not refresh {} records: {error}",
                    E::LABEL
                ));
            }
        }
        result
    }

    async fn pull(&self) -> Result<PullOutcome> {
        let rows = self.deps.remote.select_all(E::COLLECTION).await?;

        let mut records = Vec::with_capacity(rows.len());
        let mut rejected = 0;
        for row in rows {
            match serde_json::from_value::<E>(row) {
                Ok(record) => records.push(record),
                Err(error) => {
                    rejected += 1;
                    tracing::warn!("Skipping undecodable {} row: {error}", E::LABEL);
                }
            }
        }

        self.deps.store.transaction(&[E::COLLECTION], |tx| {
            for record in &records {
                tx.put(record)?;
            }
            Ok(())
        })?;
        *self.last_pull() = Some(Instant::now());

        tracing::info!(
            "Pulled {} {} record(s) ({rejected} rejected)",
            records.len(),
            E::COLLECTION
        );
        Ok(PullOutcome::Pulled {
            upserted: records.len(),
            rejected,
        })
    }
}

/// The unsent `CREATE` an update may be folded into.
///
/// Only when it is still the record's newest queue item: an `UPDATE` queued
/// behind it (while it was in flight) must stay ahead of later changes.
fn mergeable_create<E: Entity>(tx: &StoreTx<'_>, id: &RecordId) -> Result<Option<QueueItem>> {
    if !id.is_temporary() {
        return Ok(None);
    }
    let Some(create) = tx.unsent_create(E::COLLECTION, id)? else {
        return Ok(None);
    };
    let newest = tx.latest_queue_item(E::COLLECTION, id)?;
    Ok(newest
        .is_some_and(|item| item.id == create.id)
        .then_some(create))
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
