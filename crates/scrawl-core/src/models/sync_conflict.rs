//! Sync conflict shadow model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

use super::attachment::Attachment;
use super::note::{Note, NoteId};
use super::remote::RemoteNote;

/// Which side of a conflict lost and was shadowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadowSource {
    Local,
    Remote,
}

impl ShadowSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for ShadowSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShadowSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(Error::InvalidInput(format!("unknown shadow source '{other}'"))),
        }
    }
}

/// Losing side of a last-writer-wins resolution, kept for manual merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictShadow {
    /// Row identifier (0 until persisted)
    pub id: i64,
    /// Note involved in the conflict
    pub note_id: NoteId,
    /// Side whose content lost
    pub source: ShadowSource,
    pub title: String,
    pub body: String,
    pub attachment: Option<Attachment>,
    /// Version of the losing copy
    pub version: i64,
    /// `updated_at` of the losing copy, the LWW input
    pub updated_at: i64,
    /// Whether the losing copy was a deletion
    pub deleted: bool,
    /// When the conflict was resolved (Unix ms)
    pub recorded_at: i64,
}

impl ConflictShadow {
    /// Shadow the local copy of a note that lost to the remote.
    #[must_use]
    pub fn from_local(note: &Note, recorded_at: i64) -> Self {
        Self {
            id: 0,
            note_id: note.id,
            source: ShadowSource::Local,
            title: note.title.clone(),
            body: note.body.clone(),
            attachment: note.attachment.clone(),
            version: note.version,
            updated_at: note.updated_at,
            deleted: note.deleted,
            recorded_at,
        }
    }

    /// Shadow a remote copy that lost to the local one.
    #[must_use]
    pub fn from_remote(note: &RemoteNote, recorded_at: i64) -> Self {
        Self {
            id: 0,
            note_id: note.id,
            source: ShadowSource::Remote,
            title: note.title.clone(),
            body: note.body.clone(),
            attachment: note.attachment.clone(),
            version: note.version,
            updated_at: note.updated_at,
            deleted: note.deleted,
            recorded_at,
        }
    }
}
