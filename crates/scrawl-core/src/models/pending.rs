//! Pending operation model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

use super::note::{Note, NoteId};

/// Insertion-ordered identifier of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpId(pub i64);

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a queued operation asks the remote to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Create,
    Update,
    Delete,
}

impl OpKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("unknown op kind '{other}'"))),
        }
    }
}

/// A local change waiting to be applied to the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub op_id: OpId,
    pub note_id: NoteId,
    pub kind: OpKind,
    /// Full note snapshot for create/update, `None` for delete
    pub payload: Option<Note>,
    /// Remote version this operation expects to replace
    pub base_version: i64,
    /// Set while the sync engine is sending this operation
    pub in_flight: bool,
    /// Transient failures seen so far
    pub attempts: u32,
    /// Enqueue timestamp (Unix ms)
    pub created_at: i64,
}

impl PendingOperation {
    /// Remote version this operation leaves behind once acknowledged.
    ///
    /// A delete leaves the base version plus one (the remote tombstone).
    #[must_use]
    pub fn resulting_version(&self) -> i64 {
        self.payload
            .as_ref()
            .map_or(self.base_version + 1, |note| note.version)
    }

    /// Whether the facade may still rewrite or discard this operation.
    ///
    /// An op that was attempted once may have reached the remote even if the
    /// response was lost, so it is resent unchanged.
    #[must_use]
    pub const fn is_unsent(&self) -> bool {
        !self.in_flight && self.attempts == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OwnerId;

    fn op(kind: OpKind, payload: Option<Note>, base_version: i64) -> PendingOperation {
        PendingOperation {
            op_id: OpId(1),
            note_id: NoteId::new(),
            kind,
            payload,
            base_version,
            in_flight: false,
            attempts: 0,
            created_at: 0,
        }
    }

    #[test]
    fn resulting_version_uses_payload_version() {
        let mut note = Note::new(OwnerId::new("u").unwrap(), "t", "b");
        note.version = 7;
        assert_eq!(op(OpKind::Update, Some(note), 5).resulting_version(), 7);
    }

    #[test]
    fn resulting_version_for_delete_is_tombstone_version() {
        assert_eq!(op(OpKind::Delete, None, 4).resulting_version(), 5);
    }

    #[test]
    fn op_kind_names_roundtrip() {
        for kind in [OpKind::Create, OpKind::Update, OpKind::Delete] {
            assert_eq!(kind.as_str().parse::<OpKind>().unwrap(), kind);
        }
    }

    #[test]
    fn attempted_ops_are_no_longer_unsent() {
        let mut queued = op(OpKind::Delete, None, 1);
        assert!(queued.is_unsent());
        queued.attempts = 1;
        assert!(!queued.is_unsent());
        queued.attempts = 0;
        queued.in_flight = true;
        assert!(!queued.is_unsent());
    }
}
