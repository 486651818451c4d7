//! Contract of the remote note service the sync engine talks to.

mod http;
mod memory;
#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;

use thiserror::Error;

use crate::error::Error;
use crate::models::{NoteId, OwnerId, RemoteNote};

pub use http::HttpRemoteNoteService;
pub use memory::InMemoryRemote;

/// Failure modes of a remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("remote note not found")]
    NotFound,
    /// A create hit an existing note with different content
    #[error("remote note already exists at version {}", .0.version)]
    AlreadyExists(Box<RemoteNote>),
    /// The expected version no longer matches the stored one
    #[error("remote note is at version {}", .0.version)]
    VersionMismatch(Box<RemoteNote>),
    /// Network failure, timeout, or server-side error; retry later
    #[error("remote unavailable: {0}")]
    Transient(String),
    /// The request itself was refused (auth, validation)
    #[error("remote rejected request: {0}")]
    Rejected(String),
}

impl RemoteError {
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Remote state carried by a conflict response.
    pub fn current(&self) -> Option<&RemoteNote> {
        match self {
            Self::AlreadyExists(current) | Self::VersionMismatch(current) => Some(current),
            _ => None,
        }
    }
}

impl From<RemoteError> for Error {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::NotFound => Self::NotFound("remote note".to_string()),
            RemoteError::AlreadyExists(current) | RemoteError::VersionMismatch(current) => {
                Self::Conflict(current.id.to_string())
            }
            RemoteError::Transient(message) => Self::TransientNetwork(message),
            RemoteError::Rejected(message) => Self::Rejected(message),
        }
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Authoritative note storage behind the sync engine.
///
/// Writes use optimistic concurrency: every update and delete names the
/// version it expects to replace. Replaying a call that already took effect
/// returns the stored note instead of an error.
pub trait RemoteNoteService: Send + Sync {
    /// Store a new note. Replaying an identical create returns the stored copy.
    fn create_remote_note(
        &self,
        note: &RemoteNote,
    ) -> impl Future<Output = RemoteResult<RemoteNote>> + Send;

    /// Replace a note currently at `expected_version` with `payload`.
    fn update_remote_note(
        &self,
        id: &NoteId,
        payload: &RemoteNote,
        expected_version: i64,
    ) -> impl Future<Output = RemoteResult<RemoteNote>> + Send;

    /// Tombstone a note currently at `expected_version`.
    fn delete_remote_note(
        &self,
        id: &NoteId,
        expected_version: i64,
    ) -> impl Future<Output = RemoteResult<RemoteNote>> + Send;

    /// Notes of `owner_id` changed after revision `checkpoint`, tombstones included.
    fn list_remote_notes_since(
        &self,
        owner_id: &OwnerId,
        checkpoint: u64,
    ) -> impl Future<Output = RemoteResult<Vec<RemoteNote>>> + Send;
}
