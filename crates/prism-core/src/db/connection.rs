//! Local store connection management

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, TransactionBehavior};
use tokio::sync::broadcast;

use super::migrations;
use super::query::Query;
use super::transaction::StoreTx;
use crate::error::{Error, Result};
use crate::models::{Collection, Entity, RecordId};

/// Buffered change notifications before slow subscribers start lagging
const CHANGE_FEED_CAPACITY: usize = 256;

/// Durable on-device store for entity records and the sync queue.
///
/// Wraps a single `SQLite` connection. Every write runs inside a native
/// transaction and, once committed, publishes the collections it touched on
/// the change feed.
pub struct LocalStore {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<Collection>,
    path: Option<PathBuf>,
}

impl LocalStore {
    /// Open a store at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        tracing::debug!("Opened local store at {}", path.display());
        Self::init(conn, Some(path))
    }

    /// Open an in-memory store (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(mut conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        Self::configure(&conn)?;
        migrations::run(&mut conn)?;

        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
            changes,
            path,
        })
    }

    /// Configure `SQLite` pragmas
    fn configure(conn: &Connection) -> Result<()> {
        // In-memory databases refuse WAL; that is fine.
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .ok();
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    /// Filesystem location, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::StoreUnavailable(e.to_string()))
    }

    /// Run `f` atomically: every write inside commits together or not at all.
    ///
    /// Only collections listed in `scope` may be written.
    pub fn transaction<T>(
        &self,
        scope: &[Collection],
        f: impl FnOnce(&mut StoreTx<'_>) -> Result<T>,
    ) -> Result<T> {
        let (output, written) = {
            let mut conn = self.lock()?;
            let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut tx = StoreTx::new(&txn, scope);
            let output = f(&mut tx)?;
            let written = tx.into_written();
            txn.commit()?;
            (output, written)
        };

        for collection in written {
            // No live views is not an error.
            let _ = self.changes.send(collection);
        }
        Ok(output)
    }

    /// Run read-only work against a consistent connection
    pub fn read<T>(&self, f: impl FnOnce(&StoreTx<'_>) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        let tx = StoreTx::new(&conn, &[]);
        f(&tx)
    }

    /// Receive the collections touched by each committed write
    pub fn subscribe(&self) -> broadcast::Receiver<Collection> {
        self.changes.subscribe()
    }

    /// Fetch a record by id
    pub fn get<E: Entity>(&self, id: &RecordId) -> Result<Option<E>> {
        self.read(|tx| tx.get(id))
    }

    /// Insert or overwrite a record by id
    pub fn put<E: Entity>(&self, record: &E) -> Result<()> {
        self.transaction(&[E::COLLECTION], |tx| tx.put(record))
    }

    /// Delete a record; deleting an absent id is a no-op
    pub fn delete<E: Entity>(&self, id: &RecordId) -> Result<bool> {
        self.transaction(&[E::COLLECTION], |tx| tx.delete::<E>(id))
    }

    /// Records matching `query`
    pub fn query<E: Entity>(&self, query: &Query) -> Result<Vec<E>> {
        self.read(|tx| tx.query(query))
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::OrderBy;
    use crate::models::{Group, IdGenerator, NewGroup, RecordMeta, UuidGenerator};
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn group(name: &str, owner: &str) -> Group {
        Group {
            meta: RecordMeta::new(UuidGenerator.temporary_id(), owner),
            name: name.to_string(),
            color: None,
        }
    }

    #[test]
    fn test_put_and_get() {
        let store = LocalStore::open_in_memory().unwrap();
        let friends = group("Friends", "u1");

        store.put(&friends).unwrap();

        let fetched: Group = store.get(&friends.meta.id).unwrap().unwrap();
        assert_eq!(fetched, friends);
    }

    #[test]
    fn test_put_overwrites_by_id() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut friends = group("Friends", "u1");
        store.put(&friends).unwrap();

        friends.name = "Close friends".into();
        store.put(&friends).unwrap();

        let all: Vec<Group> = store.query(&Query::all()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Close friends");
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = LocalStore::open_in_memory().unwrap();
        let friends = group("Friends", "u1");
        store.put(&friends).unwrap();

        assert!(store.delete::<Group>(&friends.meta.id).unwrap());
        assert!(!store.delete::<Group>(&friends.meta.id).unwrap());
        assert!(store.get::<Group>(&friends.meta.id).unwrap().is_none());
    }

    #[test]
    fn test_query_filters_and_orders() {
        let store = LocalStore::open_in_memory().unwrap();
        for (name, owner) in [("Work", "u1"), ("family", "u1"), ("Friends", "u1"), ("Gym", "u2")] {
            store.put(&group(name, owner)).unwrap();
        }

        let names = |groups: Vec<Group>| groups.into_iter().map(|g| g.name).collect::<Vec<_>>();

        let owned: Vec<Group> = store.query(&Query::all().owned_by("u1")).unwrap();
        assert_eq!(names(owned), vec!["family", "Friends", "Work"]);

        let prefixed: Vec<Group> = store.query(&Query::all().name_starts_with("F")).unwrap();
        assert_eq!(names(prefixed), vec!["family", "Friends"]);

        let limited: Vec<Group> = store
            .query(&Query::all().order_by(OrderBy::Name).descending().limit(2))
            .unwrap();
        assert_eq!(names(limited), vec!["Work", "Gym"]);
    }

    #[test]
    fn test_query_updated_since() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut old = group("Old", "u1");
        old.meta.updated_at = Utc::now() - Duration::days(2);
        store.put(&old).unwrap();
        store.put(&group("Fresh", "u1")).unwrap();

        let recent: Vec<Group> = store
            .query(&Query::all().updated_since(Utc::now() - Duration::hours(1)))
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].name, "Fresh");
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let store = LocalStore::open_in_memory().unwrap();
        let friends = group("Friends", "u1");

        let result: Result<()> = store.transaction(&[Collection::Groups], |tx| {
            tx.put(&friends)?;
            Err(Error::InvalidInput("abort".into()))
        });

        assert!(result.is_err());
        assert!(store.get::<Group>(&friends.meta.id).unwrap().is_none());
    }

    #[test]
    fn test_write_outside_scope_is_rejected() {
        let store = LocalStore::open_in_memory().unwrap();
        let friends = group("Friends", "u1");

        let result = store.transaction(&[Collection::Contacts], |tx| tx.put(&friends));

        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(store.get::<Group>(&friends.meta.id).unwrap().is_none());
    }

    #[test]
    fn test_commit_publishes_changes() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut changes = store.subscribe();

        store.put(&group("Friends", "u1")).unwrap();

        assert_eq!(changes.try_recv().unwrap(), Collection::Groups);
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn test_rename_record_rewrites_id() {
        let store = LocalStore::open_in_memory().unwrap();
        let friends = group("Friends", "u1");
        store.put(&friends).unwrap();
        let permanent = RecordId::permanent("42");

        let renamed = store
            .transaction(&[Collection::Groups], |tx| {
                tx.rename_record(Collection::Groups, &friends.meta.id, &permanent)
            })
            .unwrap();

        assert!(renamed);
        assert!(store.get::<Group>(&friends.meta.id).unwrap().is_none());
        let adopted: Group = store.get(&permanent).unwrap().unwrap();
        assert_eq!(adopted.meta.id, permanent);
        assert_eq!(adopted.name, "Friends");
    }

    #[test]
    fn test_open_on_disk_persists() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("prism.db");
        let friends = Group::from_draft(
            RecordMeta::new(RecordId::permanent("7"), "u1"),
            NewGroup {
                name: "Friends".into(),
                color: Some("#ff0000".into()),
            },
        );

        {
            let store = LocalStore::open(&path).unwrap();
            assert_eq!(store.path(), Some(path.as_path()));
            store.put(&friends).unwrap();
        }

        let reopened = LocalStore::open(&path).unwrap();
        let fetched: Group = reopened.get(&friends.meta.id).unwrap().unwrap();
        assert_eq!(fetched, friends);
    }
}
