//! Data models for Prism

mod collection;
mod contact;
mod custom_field;
mod custom_field_schema;
mod entity;
mod group;
mod id;
mod queue_item;

pub use collection::Collection;
pub use contact::{Contact, ContactPatch, Gender, NewContact};
pub use custom_field::{CustomField, CustomFieldPatch, NewCustomField};
pub use custom_field_schema::{
    CustomFieldSchema, CustomFieldSchemaPatch, FieldType, NewCustomFieldSchema,
};
pub use entity::{apply_patch, merge_object, patch_object, Entity, RecordMeta};
pub use group::{Group, GroupPatch, NewGroup};
pub use id::{IdGenerator, RecordId, UuidGenerator, TEMP_ID_PREFIX};
pub use queue_item::{NewQueueItem, Operation, QueueCounts, QueueItem, QueueStatus};
