//! Error types shared by the storage engine and the command layer.

use thiserror::Error;

/// Result type alias for JsonDB operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Primary error type for JsonDB.
#[derive(Debug, Error)]
pub enum Error {
    /// Unparsable or unknown command. The session stays open.
    #[error("{0}")]
    Protocol(String),

    /// Well-formed command with an invalid argument. No state is changed.
    #[error("{0}")]
    Validation(String),

    /// AOF append/sync or snapshot read/write/delete failure.
    #[error("storage I/O error: {0}")]
    Storage(#[from] std::io::Error),

    /// An AOF record or snapshot could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Replaying the AOF failed while lazily opening a database.
    /// Only that database is affected.
    #[error("failed to open database {db}: {reason}")]
    DatabaseOpen { db: usize, reason: String },
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Returns true if the error came from disk rather than from the request.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Error::Storage(_) | Error::Serialization(_) | Error::DatabaseOpen { .. }
        )
    }
}
