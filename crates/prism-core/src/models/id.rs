//! Record identifiers

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Prefix marking a client-generated id in its string form.
pub const TEMP_ID_PREFIX: &str = "temp_";

/// Identifier of an entity record.
///
/// A record starts out `Temporary` when created locally and becomes
/// `Permanent` once the remote system has accepted it and assigned (or
/// confirmed) its id. The `temp_<uuid>` string is only the persisted form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "RawRecordId")]
pub enum RecordId {
    /// Client-generated, not yet acknowledged by the remote system
    Temporary(Uuid),
    /// Assigned or confirmed by the remote system
    Permanent(String),
}

impl RecordId {
    /// Wrap a remote-assigned id
    pub fn permanent(id: impl Into<String>) -> Self {
        Self::Permanent(id.into())
    }

    /// Whether the remote system has not acknowledged this record yet
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temporary(uuid) => write!(f, "{TEMP_ID_PREFIX}{uuid}"),
            Self::Permanent(id) => f.write_str(id),
        }
    }
}

impl FromStr for RecordId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidInput("record id cannot be empty".into()));
        }

        match s.strip_prefix(TEMP_ID_PREFIX) {
            Some(suffix) => Uuid::parse_str(suffix)
                .map(Self::Temporary)
                .map_err(|e| Error::InvalidInput(format!("invalid temporary id '{s}': {e}"))),
            None => Ok(Self::Permanent(s.to_string())),
        }
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.to_string()
    }
}

/// Remote backends may hand out numeric primary keys.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawRecordId {
    Text(String),
    Number(i64),
}

impl TryFrom<RawRecordId> for RecordId {
    type Error = Error;

    fn try_from(raw: RawRecordId) -> Result<Self, Self::Error> {
        match raw {
            RawRecordId::Text(text) => text.parse(),
            RawRecordId::Number(n) => Ok(Self::Permanent(n.to_string())),
        }
    }
}

impl ToSql for RecordId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for RecordId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse().map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Source of globally-unique suffixes for temporary ids
pub trait IdGenerator: Send + Sync {
    /// Produce a fresh suffix
    fn next_suffix(&self) -> Uuid;

    /// Produce a fresh temporary record id
    fn temporary_id(&self) -> RecordId {
        RecordId::Temporary(self.next_suffix())
    }
}

/// Default generator using time-sortable UUID v7
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_suffix(&self) -> Uuid {
        Uuid::now_v7()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_id_round_trips_through_string() {
        let id = UuidGenerator.temporary_id();
        let text = id.to_string();
        assert!(text.starts_with(TEMP_ID_PREFIX));

        let parsed: RecordId = text.parse().unwrap();
        assert_eq!(parsed, id);
        assert!(parsed.is_temporary());
    }

    #[test]
    fn plain_strings_are_permanent() {
        let id: RecordId = "42".parse().unwrap();
        assert_eq!(id, RecordId::permanent("42"));
        assert!(!id.is_temporary());
    }

    #[test]
    fn malformed_temporary_id_is_rejected() {
        assert!("temp_not-a-uuid".parse::<RecordId>().is_err());
        assert!("   ".parse::<RecordId>().is_err());
    }

    #[test]
    fn deserializes_numeric_remote_ids() {
        let id: RecordId = serde_json::from_str("1234").unwrap();
        assert_eq!(id, RecordId::permanent("1234"));

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"1234\"");
    }

    #[test]
    fn generator_yields_unique_ids() {
        let first = UuidGenerator.temporary_id();
        let second = UuidGenerator.temporary_id();
        assert_ne!(first, second);
    }
}
