//! Custom field schema model
//!
//! Schemas declare which keys a contact's custom field map may use.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{Collection, Entity, RecordMeta};
use crate::db::{Query, StoreTx};
use crate::error::{Error, Result};

/// Value type of a custom field; fixed once the schema is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Text,
    Number,
    Date,
    List,
}

/// Declaration of a custom field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldSchema {
    #[serde(flatten)]
    pub meta: RecordMeta,
    /// Unique key referenced from contacts (e.g. `birthday`)
    pub key: String,
    /// User-editable label
    pub label: String,
    #[serde(default, rename = "type")]
    pub field_type: FieldType,
    /// Choices for `list` fields
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomFieldSchema {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub options: Vec<String>,
}

/// Only the label and options may change after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldSchemaPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl Entity for CustomFieldSchema {
    type Draft = NewCustomFieldSchema;
    type Patch = CustomFieldSchemaPatch;

    const COLLECTION: Collection = Collection::CustomFieldSchemas;
    const LABEL: &'static str = "custom field schema";

    fn from_draft(meta: RecordMeta, draft: NewCustomFieldSchema) -> Self {
        Self {
            meta,
            key: draft.key.trim().to_string(),
            label: draft.label,
            field_type: draft.field_type,
            options: draft.options,
        }
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn sort_key(&self) -> String {
        self.label.trim().to_lowercase()
    }

    fn validate(&self, tx: &StoreTx<'_>) -> Result<()> {
        if self.key.is_empty() {
            return Err(Error::InvalidInput("custom field key cannot be empty".into()));
        }

        let clash = tx
            .query::<Self>(&Query::all())?
            .into_iter()
            .any(|schema| schema.key == self.key && schema.meta.id != self.meta.id);
        if clash {
            return Err(Error::InvalidInput(format!(
                "custom field key '{}' already exists",
                self.key
            )));
        }
        Ok(())
    }
}

/// Keys declared by all locally known schemas
pub(crate) fn declared_keys(tx: &StoreTx<'_>) -> Result<BTreeSet<String>> {
    Ok(tx
        .query::<CustomFieldSchema>(&Query::all())?
        .into_iter()
        .map(|schema| schema.key)
        .collect())
}
