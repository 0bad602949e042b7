//! Remote system the sync queue drains into

mod memory;
mod rest;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::models::{Collection, RecordId};

pub use memory::{InMemoryRemote, RemoteCall};
pub use rest::RestClient;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Invalid remote response: {0}")]
    InvalidResponse(String),
    #[error("Remote is not configured: {0}")]
    NotConfigured(String),
    /// Refused without reaching a server (offline stub, injected failure)
    #[error("Remote rejected the request: {0}")]
    Rejected(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Table-level access to the remote system of record.
///
/// Rows are exchanged as JSON objects shaped like the local records.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Insert a row; returns the stored row including its permanent id
    async fn insert(&self, collection: Collection, row: &Value) -> RemoteResult<Value>;

    /// Apply a partial update to the row with `id`
    async fn update(&self, collection: Collection, id: &RecordId, patch: &Value)
        -> RemoteResult<()>;

    async fn delete(&self, collection: Collection, id: &RecordId) -> RemoteResult<()>;

    /// Every row of the collection visible to the current principal
    async fn select_all(&self, collection: Collection) -> RemoteResult<Vec<Value>>;

    /// Locally cached signed-in principal, if any
    fn current_principal(&self) -> Option<String>;
}

/// Permanent id of a row returned by [`RemoteClient::insert`]
pub fn returned_id(row: &Value) -> RemoteResult<RecordId> {
    let id = row
        .get("id")
        .ok_or_else(|| RemoteError::InvalidResponse("inserted row has no id".to_string()))?;
    let id: RecordId = serde_json::from_value(id.clone())
        .map_err(|e| RemoteError::InvalidResponse(format!("inserted row id: {e}")))?;
    if id.is_temporary() {
        return Err(RemoteError::InvalidResponse(format!(
            "remote echoed temporary id {id}"
        )));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IdGenerator, UuidGenerator};
    use serde_json::json;

    #[test]
    fn returned_id_accepts_numbers_and_strings() {
        assert_eq!(
            returned_id(&json!({ "id": 42 })).unwrap(),
            RecordId::permanent("42")
        );
        assert_eq!(
            returned_id(&json!({ "id": "abc" })).unwrap(),
            RecordId::permanent("abc")
        );
    }

    #[test]
    fn returned_id_rejects_missing_or_temporary() {
        assert!(returned_id(&json!({ "name": "x" })).is_err());
        let temp = UuidGenerator.temporary_id().to_string();
        assert!(returned_id(&json!({ "id": temp })).is_err());
    }
}
