//! Remote note model shared by the remote contract, HTTP wire format, and server

use serde::{Deserialize, Serialize};

use super::attachment::Attachment;
use super::note::{Note, NoteId, OwnerId, SyncState};

/// A note as stored by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNote {
    pub id: NoteId,
    pub owner_id: OwnerId,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    pub created_at: i64,
    pub updated_at: i64,
    pub version: i64,
    #[serde(default)]
    pub deleted: bool,
    /// Remote-assigned change counter, 0 on client-built payloads
    #[serde(default)]
    pub revision: u64,
}

impl RemoteNote {
    /// Whether this remote copy holds the same user-visible content as `note`.
    #[must_use]
    pub fn content_matches(&self, note: &Self) -> bool {
        self.id == note.id
            && self.version == note.version
            && self.title == note.title
            && self.body == note.body
            && self.attachment == note.attachment
            && self.deleted == note.deleted
    }

    /// Build a fresh local record from a remote copy.
    #[must_use]
    pub fn to_local(&self) -> Note {
        Note {
            id: self.id,
            owner_id: self.owner_id.clone(),
            title: self.title.clone(),
            body: self.body.clone(),
            attachment: self.attachment.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
            remote_version: self.version,
            deleted: self.deleted,
            sync_state: SyncState::Clean,
        }
    }
}

impl From<&Note> for RemoteNote {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id,
            owner_id: note.owner_id.clone(),
            title: note.title.clone(),
            body: note.body.clone(),
            attachment: note.attachment.clone(),
            created_at: note.created_at,
            updated_at: note.updated_at,
            version: note.version,
            deleted: note.deleted,
            revision: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn local_to_remote_and_back_keeps_content() {
        let note = Note::new(OwnerId::new("u1").unwrap(), "Title", "Body");
        let remote = RemoteNote::from(&note);
        let local = remote.to_local();

        assert_eq!(local.id, note.id);
        assert_eq!(local.title, note.title);
        assert_eq!(local.body, note.body);
        assert_eq!(local.created_at, note.created_at);
        assert_eq!(local.sync_state, SyncState::Clean);
        assert_eq!(local.remote_version, note.version);
    }

    #[test]
    fn content_matches_ignores_revision() {
        let note = Note::new(OwnerId::new("u1").unwrap(), "Title", "Body");
        let a = RemoteNote::from(&note);
        let mut b = a.clone();
        b.revision = 42;
        assert!(a.content_matches(&b));
        b.body.push('!');
        assert!(!a.content_matches(&b));
    }
}
