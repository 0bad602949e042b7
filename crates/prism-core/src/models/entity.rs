//! Shared shape of syncable entity records

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::{Collection, RecordId};
use crate::db::StoreTx;
use crate::error::{Error, Result};

/// Fields a partial update may never overwrite.
const RESERVED_FIELDS: [&str; 4] = ["id", "owner_id", "created_at", "updated_at"];

/// Bookkeeping fields carried by every entity record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    /// Temporary until the remote system accepts the record
    pub id: RecordId,
    /// Owning principal
    #[serde(alias = "user_id", default)]
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecordMeta {
    /// Metadata for a record created right now
    pub fn new(id: RecordId, owner_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner_id: owner_id.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A record type stored in its own collection and mirrored remotely.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Input accepted by `create`
    type Draft: Serialize + Send + Sync;
    /// Partial update accepted by `update`; unset fields must not serialize
    type Patch: Serialize + Send + Sync;

    const COLLECTION: Collection;
    /// Human-readable singular name used in notifications
    const LABEL: &'static str;

    fn from_draft(meta: RecordMeta, draft: Self::Draft) -> Self;

    fn meta(&self) -> &RecordMeta;

    fn meta_mut(&mut self) -> &mut RecordMeta;

    /// Value of the indexed name column (lowercased for ordering and prefix lookups)
    fn sort_key(&self) -> String;

    /// Check references to other collections before a write
    fn validate(&self, _tx: &StoreTx<'_>) -> Result<()> {
        Ok(())
    }

    fn id(&self) -> &RecordId {
        &self.meta().id
    }
}

/// Serialize a patch into the JSON object sent as a partial diff.
///
/// Bookkeeping fields are dropped so a patch can never re-key or re-own a record.
pub fn patch_object<P: Serialize>(patch: &P) -> Result<Map<String, Value>> {
    match serde_json::to_value(patch)? {
        Value::Object(mut map) => {
            for field in RESERVED_FIELDS {
                map.remove(field);
            }
            Ok(map)
        }
        other => Err(Error::InvalidInput(format!(
            "patch must serialize to an object, got {other}"
        ))),
    }
}

/// Shallow-merge `patch` into a JSON object; non-objects are replaced by the patch.
pub fn merge_object(target: &mut Value, patch: &Map<String, Value>) {
    if let Value::Object(map) = target {
        for (key, value) in patch {
            map.insert(key.clone(), value.clone());
        }
    } else {
        *target = Value::Object(patch.clone());
    }
}

/// Deserialize a present field, `null` included, as `Some`.
///
/// Paired with `#[serde(default)]`, an absent field stays `None`, so patch
/// fields of type `Option<Option<T>>` can tell "unchanged" from "cleared".
pub(crate) fn clearable<'de, T, D>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Apply a partial update to a record, producing the merged record.
pub fn apply_patch<E: Entity>(record: &E, patch: &Map<String, Value>) -> Result<E> {
    let mut value = serde_json::to_value(record)?;
    merge_object(&mut value, patch);
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn patch_object_strips_reserved_fields() {
        let map = patch_object(&json!({
            "id": "99",
            "owner_id": "someone-else",
            "name": "Friends"
        }))
        .unwrap();

        assert_eq!(map.len(), 1);
        assert_eq!(map["name"], "Friends");
    }

    #[test]
    fn patch_object_rejects_non_objects() {
        assert!(patch_object(&json!(["not", "an", "object"])).is_err());
    }

    #[test]
    fn merge_object_overwrites_only_patched_keys() {
        let mut target = json!({"name": "Old", "color": "red"});
        let patch = patch_object(&json!({"name": "New"})).unwrap();

        merge_object(&mut target, &patch);

        assert_eq!(target, json!({"name": "New", "color": "red"}));
    }
}
