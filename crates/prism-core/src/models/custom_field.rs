//! Custom field value model

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::custom_field_schema::declared_keys;
use super::{Collection, Entity, RecordId, RecordMeta};
use crate::db::StoreTx;
use crate::error::{Error, Result};

/// A single custom field value attached to a contact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomField {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub contact_id: RecordId,
    /// Key of the schema this value conforms to
    pub field_name: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCustomField {
    pub contact_id: RecordId,
    pub field_name: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Entity for CustomField {
    type Draft = NewCustomField;
    type Patch = CustomFieldPatch;

    const COLLECTION: Collection = Collection::CustomFields;
    const LABEL: &'static str = "custom field";

    fn from_draft(meta: RecordMeta, draft: NewCustomField) -> Self {
        Self {
            meta,
            contact_id: draft.contact_id,
            field_name: draft.field_name,
            value: draft.value,
        }
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn sort_key(&self) -> String {
        self.field_name.to_lowercase()
    }

    fn validate(&self, tx: &StoreTx<'_>) -> Result<()> {
        if declared_keys(tx)?.contains(&self.field_name) {
            Ok(())
        } else {
            Err(Error::UnknownCustomField(self.field_name.clone()))
        }
    }
}
