//! Process-local remote with failure injection, for tests and demos

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{RemoteClient, RemoteError, RemoteResult};
use crate::models::{Collection, RecordId, TEMP_ID_PREFIX};

/// One request received by an [`InMemoryRemote`]
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Insert { collection: Collection, row: Value },
    Update {
        collection: Collection,
        id: RecordId,
        patch: Value,
    },
    Delete { collection: Collection, id: RecordId },
    SelectAll { collection: Collection },
}

impl RemoteCall {
    /// Id of the targeted row; for inserts, the id carried in the row
    pub fn target_id(&self) -> Option<String> {
        match self {
            Self::Insert { row, .. } => row.get("id").map(id_key),
            Self::Update { id, .. } | Self::Delete { id, .. } => Some(id.to_string()),
            Self::SelectAll { .. } => None,
        }
    }
}

#[derive(Debug, Default)]
struct Failures {
    all: bool,
    next: usize,
    records: BTreeSet<String>,
}

type Tables = BTreeMap<Collection, BTreeMap<String, Value>>;

/// Remote backed by in-process maps.
///
/// Inserted rows without a permanent id receive sequential numeric ids.
#[derive(Debug)]
pub struct InMemoryRemote {
    tables: Mutex<Tables>,
    calls: Mutex<Vec<RemoteCall>>,
    failures: Mutex<Failures>,
    principal: Mutex<Option<String>>,
    latency: Mutex<Option<Duration>>,
    next_id: AtomicU64,
    selects: AtomicUsize,
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Failures::default()),
            principal: Mutex::new(None),
            latency: Mutex::new(None),
            next_id: AtomicU64::new(1),
            selects: AtomicUsize::new(0),
        }
    }

    /// Start signed in as `principal`
    #[must_use]
    pub fn with_principal(self, principal: impl Into<String>) -> Self {
        self.set_principal(Some(principal.into()));
        self
    }

    /// First id handed out to inserted rows
    #[must_use]
    pub fn with_next_id(self, next_id: u64) -> Self {
        self.next_id.store(next_id, Ordering::SeqCst);
        self
    }

    pub fn set_principal(&self, principal: Option<String>) {
        *lock(&self.principal) = principal;
    }

    /// Delay every call, so concurrent callers overlap
    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.latency) = latency;
    }

    /// Fail every call until switched off
    pub fn set_failing(&self, failing: bool) {
        lock(&self.failures).all = failing;
    }

    /// Fail the next `count` calls
    pub fn fail_next(&self, count: usize) {
        lock(&self.failures).next = count;
    }

    /// Fail every call targeting the row with this id
    pub fn fail_record(&self, id: impl Into<String>) {
        lock(&self.failures).records.insert(id.into());
    }

    pub fn clear_failures(&self) {
        *lock(&self.failures) = Failures::default();
    }

    /// Pre-populate a table
    pub fn seed(&self, collection: Collection, rows: impl IntoIterator<Item = Value>) {
        let mut tables = lock(&self.tables);
        let table = tables.entry(collection).or_default();
        for row in rows {
            if let Some(id) = row.get("id").map(id_key) {
                table.insert(id, row);
            }
        }
    }

    pub fn rows(&self, collection: Collection) -> Vec<Value> {
        lock(&self.tables)
            .get(&collection)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every request received so far, in order
    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.calls).clone()
    }

    /// Mutating requests only (inserts, updates and deletes)
    pub fn mutations(&self) -> Vec<RemoteCall> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, RemoteCall::SelectAll { .. }))
            .collect()
    }

    pub fn select_count(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    async fn receive(&self, call: RemoteCall) -> RemoteResult<()> {
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let target = call.target_id();
        lock(&self.calls).push(call);

        let mut failures = lock(&self.failures);
        if failures.next > 0 {
            failures.next -= 1;
            return Err(RemoteError::Rejected("injected failure".to_string()));
        }
        if failures.all {
            return Err(RemoteError::Rejected("remote unavailable".to_string()));
        }
        if let Some(target) = target.filter(|id| failures.records.contains(id)) {
            return Err(RemoteError::Rejected(format!("row {target} rejected")));
        }
        Ok(())
    }
}

fn id_key(id: &Value) -> String {
    match id {
        Value::String(id) => id.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl RemoteClient for InMemoryRemote {
    async fn insert(&self, collection: Collection, row: &Value) -> RemoteResult<Value> {
        self.receive(RemoteCall::Insert {
            collection,
            row: row.clone(),
        })
        .await?;

        let Value::Object(mut stored) = row.clone() else {
            return Err(RemoteError::Rejected("row must be an object".to_string()));
        };
        let provided = stored
            .get("id")
            .map(id_key)
            .filter(|id| !id.starts_with(TEMP_ID_PREFIX));
        let id = match provided {
            Some(id) => id,
            None => self.next_id.fetch_add(1, Ordering::SeqCst).to_string(),
        };
        stored.insert("id".to_string(), Value::String(id.clone()));

        let stored = Value::Object(stored);
        lock(&self.tables)
            .entry(collection)
            .or_default()
            .insert(id, stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &RecordId,
        patch: &Value,
    ) -> RemoteResult<()> {
        self.receive(RemoteCall::Update {
            collection,
            id: id.clone(),
            patch: patch.clone(),
        })
        .await?;

        let mut tables = lock(&self.tables);
        let row = tables
            .get_mut(&collection)
            .and_then(|table| table.get_mut(&id.to_string()));
        if let (Some(Value::Object(row)), Value::Object(patch)) = (row, patch) {
            for (key, value) in patch {
                if key != "id" {
                    row.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> RemoteResult<()> {
        self.receive(RemoteCall::Delete {
            collection,
            id: id.clone(),
        })
        .await?;

        if let Some(table) = lock(&self.tables).get_mut(&collection) {
            table.remove(&id.to_string());
        }
        Ok(())
    }

    async fn select_all(&self, collection: Collection) -> RemoteResult<Vec<Value>> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        self.receive(RemoteCall::SelectAll { collection }).await?;
        Ok(self.rows(collection))
    }

    fn current_principal(&self) -> Option<String> {
        lock(&self.principal).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test(flavor = "multi_thread")]
    async fn insert_assigns_sequential_ids() {
        let remote = InMemoryRemote::new().with_next_id(42);

        let first = remote
            .insert(Collection::Contacts, &json!({ "id": "temp_x", "first_name": "Ali" }))
            .await
            .unwrap();
        let second = remote
            .insert(Collection::Contacts, &json!({ "first_name": "Sara" }))
            .await
            .unwrap();

        assert_eq!(first["id"], "42");
        assert_eq!(second["id"], "43");
        assert_eq!(remote.rows(Collection::Contacts).len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_and_delete_apply_to_rows() {
        let remote = InMemoryRemote::new();
        remote.seed(Collection::Groups, [json!({ "id": "7", "name": "Old" })]);
        let id = RecordId::permanent("7");

        remote
            .update(Collection::Groups, &id, &json!({ "id": "7", "name": "New" }))
            .await
            .unwrap();
        assert_eq!(remote.rows(Collection::Groups)[0]["name"], "New");

        remote.delete(Collection::Groups, &id).await.unwrap();
        assert!(remote.rows(Collection::Groups).is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn injected_failures_are_logged_and_returned() {
        let remote = InMemoryRemote::new();
        remote.fail_next(1);
        remote.fail_record("9");

        let id = RecordId::permanent("9");
        assert!(remote.delete(Collection::Contacts, &id).await.is_err());
        assert!(remote.delete(Collection::Contacts, &id).await.is_err());
        assert!(remote
            .delete(Collection::Contacts, &RecordId::permanent("10"))
            .await
            .is_ok());

        assert_eq!(remote.calls().len(), 3);
        remote.clear_failures();
        assert!(remote.delete(Collection::Contacts, &id).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn select_all_is_counted() {
        let remote = InMemoryRemote::new().with_principal("u1");
        remote.select_all(Collection::Contacts).await.unwrap();

        assert_eq!(remote.select_count(), 1);
        assert!(remote.mutations().is_empty());
        assert_eq!(remote.current_principal().as_deref(), Some("u1"));
    }
}
