//! Note Service: the synchronous API the UI calls.
//!
//! Mutations write the note and its pending operation in one store transaction
//! and return as soon as that is durable. Nothing here touches the network.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::db::{LocalStore, NoteChange, StoreTxn, WriteOrigin};
use crate::error::{Error, Result};
use crate::models::{
    Attachment, ConflictShadow, Note, NoteId, OpKind, OwnerId, PendingOperation, SyncState,
};
use crate::session::Session;

/// Facade over the local store scoped to the session's owner.
#[derive(Clone)]
pub struct NoteService {
    store: Arc<LocalStore>,
    session: Session,
}

impl NoteService {
    pub const fn new(store: Arc<LocalStore>, session: Session) -> Self {
        Self { store, session }
    }

    pub const fn owner_id(&self) -> &OwnerId {
        &self.session.owner_id
    }

    pub const fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Create a note owned by the session user and queue its creation.
    pub fn create_note(&self, title: &str, body: &str) -> Result<Note> {
        let note = Note::new(self.owner_id().clone(), title, body);
        self.store.write(|txn| {
            txn.put(&note, WriteOrigin::Local)?;
            txn.append_pending(&note.id, OpKind::Create, Some(&note), 0)?;
            Ok(())
        })?;
        tracing::debug!(note = %note.id, "Created note");
        Ok(note)
    }

    /// Replace title and body of a visible note.
    pub fn update_note(&self, id: &NoteId, title: &str, body: &str) -> Result<Note> {
        self.mutate(id, |note| {
            title.clone_into(&mut note.title);
            body.clone_into(&mut note.body);
        })
    }

    /// Set or clear the attachment reference of a visible note.
    pub fn set_attachment(&self, id: &NoteId, attachment: Option<Attachment>) -> Result<Note> {
        self.mutate(id, move |note| note.attachment = attachment)
    }

    /// Soft-delete a note and queue the remote deletion.
    ///
    /// A note whose creation never left the device is purged outright.
    pub fn delete_note(&self, id: &NoteId) -> Result<()> {
        self.store.write(|txn| {
            let mut note = self.visible_note(txn, id)?;
            let pending = txn.pending_for(id)?;
            let (unsent, sent): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(PendingOperation::is_unsent);

            let discarded_create = unsent.iter().any(|op| op.kind == OpKind::Create);
            let first_discarded_base = unsent.first().map(|op| op.base_version);
            for op in &unsent {
                txn.remove_pending(op.op_id)?;
            }

            if discarded_create && sent.is_empty() {
                txn.purge(id)?;
                tracing::debug!(note = %id, "Deleted unsynced note");
                return Ok(());
            }

            let base_version = first_discarded_base
                .unwrap_or_else(|| base_version_after(&note, &sent));
            note.deleted = true;
            note.bump();
            note.sync_state = SyncState::Dirty;
            txn.put(&note, WriteOrigin::Local)?;
            txn.append_pending(id, OpKind::Delete, None, base_version)?;
            tracing::debug!(note = %id, base_version, "Deleted note");
            Ok(())
        })
    }

    /// Fetch a visible note of the session owner.
    pub fn get_note(&self, id: &NoteId) -> Result<Note> {
        self.store
            .get(id)?
            .filter(|note| note.is_visible() && note.owner_id == self.session.owner_id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Visible notes, most recently updated first.
    pub fn list_notes(&self) -> Result<Vec<Note>> {
        self.store.list(self.owner_id())
    }

    pub fn search_notes(&self, query: &str, limit: usize) -> Result<Vec<Note>> {
        self.store.search(self.owner_id(), query, limit)
    }

    /// Resolve a full id or unique id prefix to a note of the session owner.
    pub fn resolve_note_id(&self, raw: &str) -> Result<NoteId> {
        let raw = raw.trim();
        if let Ok(id) = raw.parse::<NoteId>() {
            return Ok(id);
        }

        let matches = self.store.note_ids_by_prefix(self.owner_id(), raw, 2)?;
        match matches.as_slice() {
            [single] => single
                .parse()
                .map_err(|_| Error::InvalidInput(format!("invalid note id '{single}'"))),
            [] => Err(Error::NotFound(raw.to_string())),
            _ => Err(Error::InvalidInput(format!(
                "note id prefix '{raw}' is ambiguous"
            ))),
        }
    }

    pub fn pending_operations(&self) -> Result<Vec<PendingOperation>> {
        self.store.list_pending(self.owner_id())
    }

    /// Shadows kept from resolved conflicts, optionally for one note.
    pub fn conflicts(&self, id: Option<&NoteId>) -> Result<Vec<ConflictShadow>> {
        let shadows = self.store.list_shadows(id)?;
        let mut owned = Vec::with_capacity(shadows.len());
        for shadow in shadows {
            let belongs = self
                .store
                .get(&shadow.note_id)?
                .is_some_and(|note| note.owner_id == self.session.owner_id);
            if belongs {
                owned.push(shadow);
            }
        }
        Ok(owned)
    }

    /// Dismiss the shadows of a conflicted note.
    ///
    /// Returns the note, or `None` when the remote deletion won and the
    /// tombstone was purged.
    pub fn acknowledge_conflict(&self, id: &NoteId) -> Result<Option<Note>> {
        self.store.write(|txn| {
            let mut note = txn
                .get(id)?
                .filter(|note| note.owner_id == self.session.owner_id)
                .ok_or_else(|| Error::NotFound(id.to_string()))?;

            txn.clear_shadows(id)?;
            let has_pending = txn.has_pending(id)?;

            if note.sync_state == SyncState::Conflicted {
                if note.deleted && !has_pending {
                    txn.purge(id)?;
                    return Ok(None);
                }
                note.sync_state = if has_pending {
                    SyncState::Dirty
                } else {
                    SyncState::Clean
                };
                txn.put(&note, WriteOrigin::Sync)?;
            }

            Ok(note.is_visible().then_some(note))
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NoteChange> {
        self.store.subscribe()
    }

    fn visible_note(&self, txn: &StoreTxn<'_>, id: &NoteId) -> Result<Note> {
        txn.get(id)?
            .filter(|note| note.is_visible() && note.owner_id == self.session.owner_id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    fn mutate(&self, id: &NoteId, edit: impl FnOnce(&mut Note)) -> Result<Note> {
        let note = self.store.write(|txn| {
            let mut note = self.visible_note(txn, id)?;
            edit(&mut note);
            note.bump();
            note.sync_state = SyncState::Dirty;
            txn.put(&note, WriteOrigin::Local)?;

            let pending = txn.pending_for(id)?;
            match pending.last() {
                Some(last)
                    if last.is_unsent() && matches!(last.kind, OpKind::Create | OpKind::Update) =>
                {
                    txn.replace_pending_payload(last.op_id, &note)?;
                }
                _ => {
                    let base_version = base_version_after(&note, &pending);
                    txn.append_pending(id, OpKind::Update, Some(&note), base_version)?;
                }
            }
            Ok(note)
        })?;
        tracing::debug!(note = %note.id, version = note.version, "Updated note");
        Ok(note)
    }
}

/// Remote version the next queued op for `note` will find.
fn base_version_after(note: &Note, queued: &[PendingOperation]) -> i64 {
    queued
        .last()
        .map_or(note.remote_version, PendingOperation::resulting_version)
}
