//! Error types for scrawl-core

use thiserror::Error;

/// Result type alias using scrawl-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in scrawl-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Note is absent, already deleted, or owned by someone else
    #[error("Note not found: {0}")]
    NotFound(String),

    /// A write would break the version invariant of a stored note
    #[error("Stale write for note {note_id}: stored version {stored}, attempted {attempted}")]
    StaleWrite {
        note_id: String,
        stored: i64,
        attempted: i64,
    },

    /// Local and remote copies of a note diverged
    #[error("Sync conflict on note {0}")]
    Conflict(String),

    /// Network failure or timeout talking to the remote service
    #[error("Network unavailable: {0}")]
    TransientNetwork(String),

    /// The remote service refused the request (bad credentials, malformed payload)
    #[error("Remote rejected request: {0}")]
    Rejected(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether retrying the same call later may succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork(_))
    }
}
