//! Contact model

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::custom_field_schema::declared_keys;
use super::entity::clearable;
use super::{Collection, Entity, RecordId, RecordMeta};
use crate::db::StoreTx;
use crate::error::{Error, Result};

/// Gender options offered by the contact form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// A contact in the address book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone_numbers: Vec<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Groups this contact belongs to
    #[serde(default)]
    pub group_ids: Vec<RecordId>,
    /// Values keyed by custom field schema key
    #[serde(default)]
    pub custom_fields: BTreeMap<String, Value>,
}

impl Contact {
    /// "First Last", skipping empty parts
    pub fn display_name(&self) -> String {
        [self.first_name.trim(), self.last_name.trim()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Input for creating a contact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewContact {
    pub first_name: String,
    pub last_name: String,
    pub phone_numbers: Vec<String>,
    pub email: Option<String>,
    pub gender: Option<Gender>,
    pub notes: Option<String>,
    pub group_ids: Vec<RecordId>,
    pub custom_fields: BTreeMap<String, Value>,
}

/// Partial update for a contact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_numbers: Option<Vec<String>>,
    /// `Some(None)` clears the stored value
    #[serde(
        default,
        deserialize_with = "clearable",
        skip_serializing_if = "Option::is_none"
    )]
    pub email: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "clearable",
        skip_serializing_if = "Option::is_none"
    )]
    pub gender: Option<Option<Gender>>,
    #[serde(
        default,
        deserialize_with = "clearable",
        skip_serializing_if = "Option::is_none"
    )]
    pub notes: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_ids: Option<Vec<RecordId>>,
    /// Replaces the whole custom field map
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<BTreeMap<String, Value>>,
}

impl Entity for Contact {
    type Draft = NewContact;
    type Patch = ContactPatch;

    const COLLECTION: Collection = Collection::Contacts;
    const LABEL: &'static str = "contact";

    fn from_draft(meta: RecordMeta, draft: NewContact) -> Self {
        Self {
            meta,
            first_name: draft.first_name,
            last_name: draft.last_name,
            phone_numbers: draft.phone_numbers,
            email: draft.email,
            gender: draft.gender,
            notes: draft.notes,
            group_ids: draft.group_ids,
            custom_fields: draft.custom_fields,
        }
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    // Contacts are listed by last name first.
    fn sort_key(&self) -> String {
        format!("{} {}", self.last_name.trim(), self.first_name.trim())
            .trim()
            .to_lowercase()
    }

    fn validate(&self, tx: &StoreTx<'_>) -> Result<()> {
        if self.custom_fields.is_empty() {
            return Ok(());
        }

        let declared = declared_keys(tx)?;
        if let Some(unknown) = self.custom_fields.keys().find(|key| !declared.contains(*key)) {
            return Err(Error::UnknownCustomField(unknown.clone()));
        }
        Ok(())
    }
}
