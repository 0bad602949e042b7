//! Scoped access to the local store inside one `SQLite` transaction

use std::collections::BTreeSet;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::query::{escape_like, Query};
use crate::error::{Error, Result};
use crate::models::{Collection, Entity, RecordId};

/// Handle passed to [`LocalStore::transaction`](super::LocalStore::transaction).
///
/// Reads may target any collection; writes must target a collection named in
/// the transaction's scope. Collections written are reported to the change
/// feed once the transaction commits.
pub struct StoreTx<'a> {
    conn: &'a Connection,
    scope: &'a [Collection],
    written: BTreeSet<Collection>,
}

impl<'a> StoreTx<'a> {
    pub(crate) const fn new(conn: &'a Connection, scope: &'a [Collection]) -> Self {
        Self {
            conn,
            scope,
            written: BTreeSet::new(),
        }
    }

    pub(crate) const fn conn(&self) -> &Connection {
        self.conn
    }

    /// Record a write to `collection`, rejecting it when out of scope
    pub(crate) fn mark_written(&mut self, collection: Collection) -> Result<()> {
        if !self.scope.contains(&collection) {
            return Err(Error::InvalidInput(format!(
                "collection '{collection}' is not part of this transaction"
            )));
        }
        self.written.insert(collection);
        Ok(())
    }

    pub(crate) fn into_written(self) -> BTreeSet<Collection> {
        self.written
    }

    /// Fetch a record by id
    pub fn get<E: Entity>(&self, id: &RecordId) -> Result<Option<E>> {
        let sql = format!(
            "SELECT data FROM {} WHERE id = ?1",
            E::COLLECTION.table_name()
        );
        let data: Option<String> = self
            .conn
            .query_row(&sql, params![id], |row| row.get(0))
            .optional()?;

        data.map(|data| serde_json::from_str(&data).map_err(Error::from))
            .transpose()
    }

    /// Insert or overwrite a record by id
    pub fn put<E: Entity>(&mut self, record: &E) -> Result<()> {
        self.mark_written(E::COLLECTION)?;

        let meta = record.meta();
        let sql = format!(
            "INSERT INTO {} (id, owner_id, sort_key, created_at, updated_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                sort_key = excluded.sort_key,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                data = excluded.data",
            E::COLLECTION.table_name()
        );
        self.conn.execute(
            &sql,
            params![
                meta.id,
                meta.owner_id,
                record.sort_key(),
                meta.created_at.timestamp_millis(),
                meta.updated_at.timestamp_millis(),
                serde_json::to_string(record)?,
            ],
        )?;

        tracing::debug!("Stored {} {}", E::LABEL, meta.id);
        Ok(())
    }

    /// Delete a record; returns whether a row existed
    pub fn delete<E: Entity>(&mut self, id: &RecordId) -> Result<bool> {
        self.mark_written(E::COLLECTION)?;

        let sql = format!("DELETE FROM {} WHERE id = ?1", E::COLLECTION.table_name());
        let rows = self.conn.execute(&sql, params![id])?;
        Ok(rows > 0)
    }

    /// Records matching `query`
    pub fn query<E: Entity>(&self, query: &Query) -> Result<Vec<E>> {
        let mut sql = format!(
            "SELECT data FROM {} WHERE 1 = 1",
            E::COLLECTION.table_name()
        );
        let mut args: Vec<SqlValue> = Vec::new();

        if let Some(owner_id) = &query.owner_id {
            sql.push_str(" AND owner_id = ?");
            args.push(SqlValue::Text(owner_id.clone()));
        }
        if let Some(prefix) = &query.name_prefix {
            sql.push_str(" AND sort_key LIKE ? ESCAPE '\\'");
            args.push(SqlValue::Text(format!(
                "{}%",
                escape_like(&prefix.trim().to_lowercase())
            )));
        }
        if let Some(since) = query.updated_since {
            sql.push_str(" AND updated_at >= ?");
            args.push(SqlValue::Integer(since.timestamp_millis()));
        }

        let direction = if query.descending { "DESC" } else { "ASC" };
        sql.push_str(&format!(
            " ORDER BY {column} {direction}, id {direction}",
            column = query.order_by.column()
        ));

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            args.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args), |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.iter()
            .map(|data| serde_json::from_str(data).map_err(Error::from))
            .collect()
    }

    /// Re-key a record after the remote system assigned its permanent id.
    ///
    /// A row already stored under `new_id` (e.g. from a pull) is replaced.
    /// Returns whether a record under `old_id` existed.
    pub fn rename_record(
        &mut self,
        collection: Collection,
        old_id: &RecordId,
        new_id: &RecordId,
    ) -> Result<bool> {
        self.mark_written(collection)?;
        let table = collection.table_name();

        let exists: bool = self.conn.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1)"),
            params![old_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(false);
        }

        self.conn
            .execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![new_id])?;
        self.conn.execute(
            &format!(
                "UPDATE {table} SET id = ?1, data = json_set(data, '$.id', ?1) WHERE id = ?2"
            ),
            params![new_id, old_id],
        )?;
        Ok(true)
    }
}
