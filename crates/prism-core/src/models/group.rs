//! Contact group model

use serde::{Deserialize, Serialize};

use super::entity::clearable;
use super::{Collection, Entity, RecordMeta};

/// A named group of contacts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGroup {
    pub name: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `Some(None)` removes the color
    #[serde(
        default,
        deserialize_with = "clearable",
        skip_serializing_if = "Option::is_none"
    )]
    pub color: Option<Option<String>>,
}

impl Entity for Group {
    type Draft = NewGroup;
    type Patch = GroupPatch;

    const COLLECTION: Collection = Collection::Groups;
    const LABEL: &'static str = "group";

    fn from_draft(meta: RecordMeta, draft: NewGroup) -> Self {
        Self {
            meta,
            name: draft.name,
            color: draft.color,
        }
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn sort_key(&self) -> String {
        self.name.trim().to_lowercase()
    }
}
