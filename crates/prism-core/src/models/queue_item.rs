//! Sync queue item model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Collection, RecordId};
use crate::error::Error;

/// Remote mutation carried by a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// Processing state of a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Pending,
    InFlight,
    /// Retry budget exhausted; only an explicit retry revives it
    Failed,
}

macro_rules! text_enum {
    ($ty:ty, $($variant:path => $text:literal),+ $(,)?) => {
        impl $ty {
            pub const fn as_str(self) -> &'static str {
                match self {
                    $($variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($variant),)+
                    other => Err(Error::InvalidInput(format!(
                        "unknown {} '{other}'",
                        stringify!($ty)
                    ))),
                }
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum!(Operation,
    Operation::Create => "CREATE",
    Operation::Update => "UPDATE",
    Operation::Delete => "DELETE",
);

text_enum!(QueueStatus,
    QueueStatus::Pending => "PENDING",
    QueueStatus::InFlight => "IN_FLIGHT",
    QueueStatus::Failed => "FAILED",
);

/// One pending remote mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Local sequence number
    pub id: i64,
    pub entity_type: Collection,
    pub operation: Operation,
    /// Record the mutation targets
    pub entity_id: RecordId,
    /// Full record, partial diff with id, or id only
    pub payload: Value,
    pub status: QueueStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Mutation to append to the queue
#[derive(Debug, Clone, PartialEq)]
pub struct NewQueueItem {
    pub entity_type: Collection,
    pub operation: Operation,
    pub entity_id: RecordId,
    pub payload: Value,
}

/// Item totals by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub failed: usize,
}

impl QueueCounts {
    pub const fn total(&self) -> usize {
        self.pending + self.in_flight + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_matches_serde() {
        for status in [QueueStatus::Pending, QueueStatus::InFlight, QueueStatus::Failed] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<QueueStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_operation_is_rejected() {
        assert!("UPSERT".parse::<Operation>().is_err());
    }
}
