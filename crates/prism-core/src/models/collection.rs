//! Named collections in the local store

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A collection of records in the local store.
///
/// Entity collections share their name with the remote table. `SyncQueue` is
/// local only; it is listed so transactions can declare it in their scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Contacts,
    Groups,
    CustomFieldSchemas,
    CustomFields,
    SyncQueue,
}

impl Collection {
    /// Every collection that holds entity records
    pub const ENTITIES: [Self; 4] = [
        Self::Contacts,
        Self::Groups,
        Self::CustomFieldSchemas,
        Self::CustomFields,
    ];

    /// Table name, both locally and on the remote
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Contacts => "contacts",
            Self::Groups => "groups",
            Self::CustomFieldSchemas => "custom_field_schemas",
            Self::CustomFields => "custom_fields",
            Self::SyncQueue => "sync_queue",
        }
    }

    pub const fn is_entity(self) -> bool {
        !matches!(self, Self::SyncQueue)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "contacts" => Ok(Self::Contacts),
            "groups" => Ok(Self::Groups),
            "custom_field_schemas" => Ok(Self::CustomFieldSchemas),
            "custom_fields" => Ok(Self::CustomFields),
            "sync_queue" => Ok(Self::SyncQueue),
            other => Err(Error::InvalidInput(format!("unknown collection '{other}'"))),
        }
    }
}

impl ToSql for Collection {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.table_name()))
    }
}

impl FromSql for Collection {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_parse_back() {
        for collection in Collection::ENTITIES {
            let parsed: Collection = collection.table_name().parse().unwrap();
            assert_eq!(parsed, collection);
            assert!(parsed.is_entity());
        }
        assert!(!Collection::SyncQueue.is_entity());
    }

    #[test]
    fn unknown_collection_is_rejected() {
        assert!("users".parse::<Collection>().is_err());
    }
}
