use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] prism_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Record ID cannot be empty")]
    EmptyRecordId,
    #[error("No {0} found for id/prefix: {1}")]
    RecordNotFound(&'static str, String),
    #[error("{0}")]
    AmbiguousRecordId(String),
    #[error("Invalid field assignment '{0}', expected KEY=VALUE")]
    InvalidFieldAssignment(String),
    #[error("Nothing to change; pass at least one field")]
    EmptyPatch,
    #[error("Failed to resolve {0} directory")]
    NoPlatformDir(&'static str),
    #[error(
        "Sync is not configured. Set PRISM_SUPABASE_URL and PRISM_SUPABASE_ANON_KEY, or add a `remote` section to the config file."
    )]
    SyncNotConfigured,
    #[error("Sync is disabled by --offline")]
    Offline,
}
