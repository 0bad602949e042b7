//! Error types for prism-core

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using prism-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in prism-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// `SQLite` error from the local store
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The store mutex was poisoned by a panicking writer
    #[error("Local store unavailable: {0}")]
    StoreUnavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A custom field key that no schema declares
    #[error("Unknown custom field: {0}")]
    UnknownCustomField(String),

    /// No principal is available to own new records
    #[error("No signed-in user; cannot create records")]
    NotAuthenticated,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote backend error
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
}
