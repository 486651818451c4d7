//! Note model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::util::unix_millis_now;

use super::attachment::Attachment;

/// A unique identifier for a note, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NoteId(Uuid);

impl NoteId {
    /// Create a new unique note ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Opaque identifier of the user owning a note, supplied by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Wrap a non-empty owner identifier.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("owner id cannot be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Relationship between the local copy of a note and the remote one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Matches the last known remote state
    Clean,
    /// Local changes not yet acknowledged remotely
    Dirty,
    /// Remote and local diverged; a shadow copy of the loser is kept
    Conflicted,
}

impl SyncState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Dirty => "dirty",
            Self::Conflicted => "conflicted",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "clean" => Ok(Self::Clean),
            "dirty" => Ok(Self::Dirty),
            "conflicted" => Ok(Self::Conflicted),
            other => Err(Error::InvalidInput(format!("unknown sync state '{other}'"))),
        }
    }
}

/// A note in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Unique identifier
    pub id: NoteId,
    /// Owning user
    pub owner_id: OwnerId,
    /// Title, may be empty
    pub title: String,
    /// Body text, may be empty
    pub body: String,
    /// Optional attachment reference
    pub attachment: Option<Attachment>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Bumped on every mutation, local or remote
    pub version: i64,
    /// Last remote version acknowledged or pulled (0 = never synced)
    pub remote_version: i64,
    /// Soft delete flag, purged once the remote confirms
    pub deleted: bool,
    /// Sync bookkeeping
    pub sync_state: SyncState,
}

impl Note {
    /// Create a new local note at version 1, not yet known to the remote
    #[must_use]
    pub fn new(owner_id: OwnerId, title: impl Into<String>, body: impl Into<String>) -> Self {
        let now = unix_millis_now();
        Self {
            id: NoteId::new(),
            owner_id,
            title: title.into(),
            body: body.into(),
            attachment: None,
            created_at: now,
            updated_at: now,
            version: 1,
            remote_version: 0,
            deleted: false,
            sync_state: SyncState::Dirty,
        }
    }

    /// Advance `version` by one and move `updated_at` forward.
    ///
    /// `updated_at` never goes backwards, even if the wall clock does.
    pub fn bump(&mut self) {
        self.version += 1;
        self.updated_at = unix_millis_now().max(self.updated_at);
    }

    /// Move `version` to at least `floor`, bumping `updated_at` when it changes.
    pub fn raise_version_above(&mut self, floor: i64) {
        if self.version <= floor {
            self.version = floor + 1;
            self.updated_at = unix_millis_now().max(self.updated_at);
        }
    }

    /// Whether the note shows up in listings
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        !self.deleted
    }

    /// Get title, falling back to the first body line, truncated to `max_len` characters
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        let source = if self.title.trim().is_empty() {
            self.body.lines().next().unwrap_or("")
        } else {
            self.title.as_str()
        };
        source.trim().chars().take(max_len).collect()
    }

    /// Case-insensitive substring match over title and body
    #[must_use]
    pub fn matches_query(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&needle) || self.body.to_lowercase().contains(&needle)
    }
}
