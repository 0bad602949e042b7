//! Observable sync status.

use serde::Serialize;

/// What the sync engine is doing, published on a watch channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Started, nothing attempted yet
    #[default]
    Idle,
    Offline,
    Syncing,
    /// Last pass finished with no failures
    Synced,
    /// Last pass had failed items or could not run
    Error,
}

impl SyncState {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
