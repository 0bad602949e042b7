//! `sync_queue` table access within a store transaction

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::StoreTx;
use crate::error::{Error, Result};
use crate::models::{
    Collection, NewQueueItem, Operation, QueueCounts, QueueItem, QueueStatus, RecordId,
};

const COLUMNS: &str =
    "id, entity_type, operation, entity_id, payload, status, attempts, last_error, created_at";

fn parse_item(row: &Row<'_>) -> rusqlite::Result<QueueItem> {
    let payload: String = row.get(4)?;
    let payload = serde_json::from_str(&payload)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    let created_at: i64 = row.get(8)?;
    Ok(QueueItem {
        id: row.get(0)?,
        entity_type: row.get(1)?,
        operation: row.get(2)?,
        entity_id: row.get(3)?,
        payload,
        status: row.get(5)?,
        attempts: row.get(6)?,
        last_error: row.get(7)?,
        created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_default(),
    })
}

impl StoreTx<'_> {
    fn select_items(&self, filter: &str, args: impl rusqlite::Params) -> Result<Vec<QueueItem>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM sync_queue WHERE {filter} ORDER BY created_at ASC, id ASC"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let items = stmt
            .query_map(args, parse_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Append a mutation with `PENDING` status; returns its queue id
    pub fn enqueue(&mut self, item: &NewQueueItem) -> Result<i64> {
        if !item.entity_type.is_entity() {
            return Err(Error::InvalidInput(format!(
                "cannot queue mutations for '{}'",
                item.entity_type
            )));
        }
        self.mark_written(Collection::SyncQueue)?;

        self.conn().execute(
            "INSERT INTO sync_queue (entity_type, operation, entity_id, payload, status, attempts, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            params![
                item.entity_type,
                item.operation,
                item.entity_id,
                serde_json::to_string(&item.payload)?,
                QueueStatus::Pending,
                Utc::now().timestamp_millis(),
            ],
        )?;
        let id = self.conn().last_insert_rowid();

        tracing::debug!(
            "Queued {} {} {} as #{id}",
            item.operation,
            item.entity_type,
            item.entity_id
        );
        Ok(id)
    }

    pub fn queue_item(&self, id: i64) -> Result<Option<QueueItem>> {
        let sql = format!("SELECT {COLUMNS} FROM sync_queue WHERE id = ?1");
        Ok(self
            .conn()
            .query_row(&sql, params![id], parse_item)
            .optional()?)
    }

    /// Items in processing order, optionally restricted to one status
    pub fn queue_items(&self, status: Option<QueueStatus>) -> Result<Vec<QueueItem>> {
        match status {
            Some(status) => self.select_items("status = ?1", params![status]),
            None => self.select_items("1 = 1", []),
        }
    }

    /// The not-yet-sent `CREATE` for a record, if any
    pub fn unsent_create(
        &self,
        collection: Collection,
        entity_id: &RecordId,
    ) -> Result<Option<QueueItem>> {
        let items = self.select_items(
            "entity_type = ?1 AND entity_id = ?2 AND operation = ?3 AND status IN (?4, ?5)",
            params![
                collection,
                entity_id,
                Operation::Create,
                QueueStatus::Pending,
                QueueStatus::Failed
            ],
        )?;
        Ok(items.into_iter().next())
    }

    /// The most recently queued item for a record, whatever its status
    pub fn latest_queue_item(
        &self,
        collection: Collection,
        entity_id: &RecordId,
    ) -> Result<Option<QueueItem>> {
        let items = self.select_items(
            "entity_type = ?1 AND entity_id = ?2",
            params![collection, entity_id],
        )?;
        Ok(items.into_iter().last())
    }

    pub fn set_queue_payload(&mut self, id: i64, payload: &serde_json::Value) -> Result<()> {
        self.mark_written(Collection::SyncQueue)?;
        let rows = self.conn().execute(
            "UPDATE sync_queue SET payload = ?1 WHERE id = ?2",
            params![serde_json::to_string(payload)?, id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(format!("queue item #{id}")));
        }
        Ok(())
    }

    /// Move a `PENDING` item to `IN_FLIGHT`; false when it is not pending
    pub fn claim_queue_item(&mut self, id: i64) -> Result<bool> {
        self.mark_written(Collection::SyncQueue)?;
        let rows = self.conn().execute(
            "UPDATE sync_queue SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![QueueStatus::InFlight, id, QueueStatus::Pending],
        )?;
        Ok(rows > 0)
    }

    /// Return an `IN_FLIGHT` item to `PENDING` without counting an attempt
    pub fn release_queue_item(&mut self, id: i64) -> Result<bool> {
        self.mark_written(Collection::SyncQueue)?;
        let rows = self.conn().execute(
            "UPDATE sync_queue SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![QueueStatus::Pending, id, QueueStatus::InFlight],
        )?;
        Ok(rows > 0)
    }

    pub fn remove_queue_item(&mut self, id: i64) -> Result<bool> {
        self.mark_written(Collection::SyncQueue)?;
        let rows = self
            .conn()
            .execute("DELETE FROM sync_queue WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    /// Count a failed attempt; parks the item once `max_attempts` is reached.
    ///
    /// A `FAILED` item is returned unchanged.
    pub fn record_queue_failure(
        &mut self,
        id: i64,
        error: &str,
        max_attempts: u32,
    ) -> Result<QueueItem> {
        let mut item = self
            .queue_item(id)?
            .ok_or_else(|| Error::NotFound(format!("queue item #{id}")))?;
        if item.status == QueueStatus::Failed {
            return Ok(item);
        }
        self.mark_written(Collection::SyncQueue)?;

        item.attempts = item.attempts.saturating_add(1);
        item.status = if item.attempts >= max_attempts {
            QueueStatus::Failed
        } else {
            QueueStatus::Pending
        };
        item.last_error = Some(error.to_string());

        self.conn().execute(
            "UPDATE sync_queue SET status = ?1, attempts = ?2, last_error = ?3 WHERE id = ?4",
            params![item.status, item.attempts, item.last_error, id],
        )?;
        Ok(item)
    }

    /// Remove every unsent (`PENDING` or `FAILED`) item for a record
    pub fn discard_unsent(
        &mut self,
        collection: Collection,
        entity_id: &RecordId,
    ) -> Result<Vec<QueueItem>> {
        let items = self.select_items(
            "entity_type = ?1 AND entity_id = ?2 AND status IN (?3, ?4)",
            params![
                collection,
                entity_id,
                QueueStatus::Pending,
                QueueStatus::Failed
            ],
        )?;
        for item in &items {
            self.remove_queue_item(item.id)?;
        }
        Ok(items)
    }

    /// Point remaining items for `old_id` at the record's permanent id
    pub fn retarget_queue_items(
        &mut self,
        collection: Collection,
        old_id: &RecordId,
        new_id: &RecordId,
    ) -> Result<usize> {
        self.mark_written(Collection::SyncQueue)?;
        let rows = self.conn().execute(
            "UPDATE sync_queue
             SET entity_id = ?1, payload = json_set(payload, '$.id', ?1)
             WHERE entity_type = ?2 AND entity_id = ?3",
            params![new_id, collection, old_id],
        )?;
        Ok(rows)
    }

    /// Return items stuck `IN_FLIGHT` (e.g. after a crash) to `PENDING`
    pub fn reset_in_flight(&mut self) -> Result<usize> {
        self.mark_written(Collection::SyncQueue)?;
        let rows = self.conn().execute(
            "UPDATE sync_queue SET status = ?1 WHERE status = ?2",
            params![QueueStatus::Pending, QueueStatus::InFlight],
        )?;
        Ok(rows)
    }

    /// Revive parked items with a fresh retry budget
    pub fn revive_failed(&mut self, id: Option<i64>) -> Result<usize> {
        self.mark_written(Collection::SyncQueue)?;
        let rows = match id {
            Some(id) => self.conn().execute(
                "UPDATE sync_queue SET status = ?1, attempts = 0 WHERE status = ?2 AND id = ?3",
                params![QueueStatus::Pending, QueueStatus::Failed, id],
            )?,
            None => self.conn().execute(
                "UPDATE sync_queue SET status = ?1, attempts = 0 WHERE status = ?2",
                params![QueueStatus::Pending, QueueStatus::Failed],
            )?,
        };
        Ok(rows)
    }

    pub fn queue_counts(&self) -> Result<QueueCounts> {
        let mut stmt = self
            .conn()
            .prepare("SELECT status, COUNT(*) FROM sync_queue GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, QueueStatus>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts = QueueCounts::default();
        for (status, count) in rows {
            let count = usize::try_from(count).unwrap_or_default();
            match status {
                QueueStatus::Pending => counts.pending = count,
                QueueStatus::InFlight => counts.in_flight = count,
                QueueStatus::Failed => counts.failed = count,
            }
        }
        Ok(counts)
    }
}
