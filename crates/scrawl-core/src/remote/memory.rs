//! In-process remote note store.
//!
//! Backs the reference API server and the sync tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::{NoteId, OwnerId, RemoteNote};
use crate::util::unix_millis_now;

use super::{RemoteError, RemoteNoteService, RemoteResult};

#[derive(Debug, Default)]
struct RemoteState {
    notes: HashMap<NoteId, RemoteNote>,
    revision: u64,
}

impl RemoteState {
    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }
}

/// Authoritative remote store held in memory. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current stored copy of a note, tombstones included.
    pub fn get(&self, id: &NoteId) -> Option<RemoteNote> {
        self.lock().notes.get(id).cloned()
    }

    pub fn owner_of(&self, id: &NoteId) -> Option<OwnerId> {
        self.lock().notes.get(id).map(|note| note.owner_id.clone())
    }

    /// Latest revision handed out.
    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    pub fn len(&self) -> usize {
        self.lock().notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn create(&self, note: &RemoteNote) -> RemoteResult<RemoteNote> {
        if note.version < 1 {
            return Err(RemoteError::Rejected(format!(
                "note {} must start at version 1 or later",
                note.id
            )));
        }

        let mut state = self.lock();
        if let Some(existing) = state.notes.get(&note.id) {
            if existing.owner_id == note.owner_id && existing.content_matches(note) {
                return Ok(existing.clone());
            }
            return Err(RemoteError::AlreadyExists(Box::new(existing.clone())));
        }

        let revision = state.next_revision();
        let stored = RemoteNote {
            revision,
            ..note.clone()
        };
        state.notes.insert(stored.id, stored.clone());
        tracing::debug!(note = %stored.id, version = stored.version, revision, "Created remote note");
        Ok(stored)
    }

    pub fn update(
        &self,
        id: &NoteId,
        payload: &RemoteNote,
        expected_version: i64,
    ) -> RemoteResult<RemoteNote> {
        if payload.id != *id {
            return Err(RemoteError::Rejected(format!(
                "payload id {} does not match note {id}",
                payload.id
            )));
        }

        let mut state = self.lock();
        let Some(current) = state.notes.get(id).cloned() else {
            return Err(RemoteError::NotFound);
        };

        if current.version != expected_version {
            // Replaying an update that already landed
            if current.content_matches(payload) {
                return Ok(current);
            }
            return Err(RemoteError::VersionMismatch(Box::new(current)));
        }
        if payload.version <= expected_version {
            return Err(RemoteError::Rejected(format!(
                "payload version {} must exceed expected version {expected_version}",
                payload.version
            )));
        }

        let revision = state.next_revision();
        // Updating a tombstone at its current version resurrects the note
        let stored = RemoteNote {
            id: current.id,
            owner_id: current.owner_id,
            created_at: current.created_at,
            updated_at: payload.updated_at.max(current.updated_at),
            revision,
            ..payload.clone()
        };
        state.notes.insert(stored.id, stored.clone());
        tracing::debug!(note = %id, version = stored.version, revision, "Updated remote note");
        Ok(stored)
    }

    pub fn delete(&self, id: &NoteId, expected_version: i64) -> RemoteResult<RemoteNote> {
        let mut state = self.lock();
        let Some(current) = state.notes.get(id).cloned() else {
            return Err(RemoteError::NotFound);
        };

        if current.deleted {
            return Ok(current);
        }
        if current.version != expected_version {
            return Err(RemoteError::VersionMismatch(Box::new(current)));
        }

        let revision = state.next_revision();
        let tombstone = RemoteNote {
            version: expected_version + 1,
            updated_at: unix_millis_now().max(current.updated_at),
            deleted: true,
            revision,
            ..current
        };
        state.notes.insert(tombstone.id, tombstone.clone());
        tracing::debug!(note = %id, version = tombstone.version, revision, "Deleted remote note");
        Ok(tombstone)
    }

    pub fn list_since(&self, owner_id: &OwnerId, checkpoint: u64) -> Vec<RemoteNote> {
        let state = self.lock();
        let mut notes: Vec<RemoteNote> = state
            .notes
            .values()
            .filter(|note| note.owner_id == *owner_id && note.revision > checkpoint)
            .cloned()
            .collect();
        notes.sort_by_key(|note| note.revision);
        notes
    }
}

impl RemoteNoteService for InMemoryRemote {
    async fn create_remote_note(&self, note: &RemoteNote) -> RemoteResult<RemoteNote> {
        self.create(note)
    }

    async fn update_remote_note(
        &self,
        id: &NoteId,
        payload: &RemoteNote,
        expected_version: i64,
    ) -> RemoteResult<RemoteNote> {
        self.update(id, payload, expected_version)
    }

    async fn delete_remote_note(
        &self,
        id: &NoteId,
        expected_version: i64,
    ) -> RemoteResult<RemoteNote> {
        self.delete(id, expected_version)
    }

    async fn list_remote_notes_since(
        &self,
        owner_id: &OwnerId,
        checkpoint: u64,
    ) -> RemoteResult<Vec<RemoteNote>> {
        Ok(self.list_since(owner_id, checkpoint))
    }
}
