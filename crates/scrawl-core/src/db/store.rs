//! Local Store: the on-device source of truth for notes and the pending-operation log.
//!
//! Every public call runs as one `SQLite` transaction behind a single mutex, so
//! the UI thread and the sync engine never observe half-applied writes. Change
//! notifications are published after commit.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Transaction;
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::models::{ConflictShadow, Note, NoteId, OpId, OpKind, OwnerId, PendingOperation};

use super::connection::Database;
use super::repository::SqliteNoteRepository;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Who is writing a note, which decides how the version invariant is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrigin {
    /// User-initiated mutation: version must advance by exactly one
    Local,
    /// Sync engine applying remote state: version may jump but never drop
    Sync,
}

/// Notification published for every committed note write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteChange {
    Upserted(Note),
    Purged(NoteId),
}

impl NoteChange {
    pub const fn note_id(&self) -> NoteId {
        match self {
            Self::Upserted(note) => note.id,
            Self::Purged(id) => *id,
        }
    }
}

/// Thread-safe local note store.
pub struct LocalStore {
    db: Mutex<Database>,
    changes: broadcast::Sender<NoteChange>,
}

impl LocalStore {
    /// Wrap an opened database.
    pub fn new(db: Database) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            db: Mutex::new(db),
            changes,
        }
    }

    /// Open (or create) the store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Subscribe to committed note changes.
    pub fn subscribe(&self) -> broadcast::Receiver<NoteChange> {
        self.changes.subscribe()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| Error::Database("local store lock poisoned".to_string()))
    }

    fn read<T>(&self, f: impl FnOnce(&SqliteNoteRepository<'_>) -> Result<T>) -> Result<T> {
        let db = self.lock()?;
        let repo = SqliteNoteRepository::new(db.connection());
        f(&repo)
    }

    /// Run `f` as a single atomic unit.
    ///
    /// If `f` fails nothing is written and no notification is sent.
    pub fn write<T>(&self, f: impl FnOnce(&mut StoreTxn<'_>) -> Result<T>) -> Result<T> {
        let (value, changes) = {
            let mut db = self.lock()?;
            let mut txn = StoreTxn {
                tx: db.connection_mut().transaction()?,
                changes: Vec::new(),
            };
            let value = f(&mut txn)?;
            let changes = std::mem::take(&mut txn.changes);
            txn.tx.commit()?;
            (value, changes)
        };

        for change in changes {
            // No subscribers is fine
            let _ = self.changes.send(change);
        }
        Ok(value)
    }

    /// Fetch a note by id, tombstones included.
    pub fn get(&self, id: &NoteId) -> Result<Option<Note>> {
        self.read(|repo| repo.get(id))
    }

    /// Visible notes of an owner ordered by `updated_at` descending.
    pub fn list(&self, owner_id: &OwnerId) -> Result<Vec<Note>> {
        self.read(|repo| repo.list(owner_id))
    }

    /// Visible notes whose title or body contains `query`, ignoring case.
    pub fn search(&self, owner_id: &OwnerId, query: &str, limit: usize) -> Result<Vec<Note>> {
        let notes = self.list(owner_id)?;
        Ok(notes
            .into_iter()
            .filter(|note| note.matches_query(query))
            .take(limit)
            .collect())
    }

    /// Ids of the owner's visible notes starting with `prefix`.
    pub fn note_ids_by_prefix(
        &self,
        owner_id: &OwnerId,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        self.read(|repo| repo.ids_by_prefix(owner_id, prefix, limit))
    }

    /// Upsert a note, enforcing the version invariant for `origin`.
    pub fn put(&self, note: &Note, origin: WriteOrigin) -> Result<()> {
        self.write(|txn| txn.put(note, origin))
    }

    pub fn append_pending(
        &self,
        note_id: &NoteId,
        kind: OpKind,
        payload: Option<&Note>,
        base_version: i64,
    ) -> Result<PendingOperation> {
        self.write(|txn| txn.append_pending(note_id, kind, payload, base_version))
    }

    /// Oldest queued operation for a note.
    pub fn next_pending(&self, note_id: &NoteId) -> Result<Option<PendingOperation>> {
        self.read(|repo| repo.next_pending(note_id))
    }

    pub fn remove_pending(&self, op_id: OpId) -> Result<bool> {
        self.write(|txn| txn.remove_pending(op_id))
    }

    pub fn pending_for(&self, note_id: &NoteId) -> Result<Vec<PendingOperation>> {
        self.read(|repo| repo.pending_for_note(note_id))
    }

    /// Notes of `owner_id` with queued operations, oldest queue first.
    pub fn pending_note_ids(&self, owner_id: &OwnerId) -> Result<Vec<NoteId>> {
        self.read(|repo| repo.pending_note_ids(owner_id))
    }

    pub fn list_pending(&self, owner_id: &OwnerId) -> Result<Vec<PendingOperation>> {
        self.read(|repo| repo.list_pending(owner_id))
    }

    pub fn pending_count(&self, owner_id: &OwnerId) -> Result<usize> {
        self.read(|repo| repo.count_pending(owner_id))
    }

    pub fn set_in_flight(&self, op_id: OpId, in_flight: bool) -> Result<()> {
        self.write(|txn| txn.set_in_flight(op_id, in_flight))
    }

    /// Clear in-flight markers left behind by an interrupted run.
    pub fn reset_in_flight(&self) -> Result<usize> {
        self.write(|txn| txn.repo().reset_in_flight())
    }

    /// Release an in-flight op after a transient failure.
    pub fn record_attempt(&self, op_id: OpId) -> Result<()> {
        self.write(|txn| txn.repo().record_attempt(op_id))
    }

    pub fn list_shadows(&self, note_id: Option<&NoteId>) -> Result<Vec<ConflictShadow>> {
        self.read(|repo| repo.list_shadows(note_id))
    }

    pub fn checkpoint(&self, owner_id: &OwnerId) -> Result<u64> {
        self.read(|repo| repo.checkpoint(owner_id))
    }

    pub fn set_checkpoint(&self, owner_id: &OwnerId, revision: u64) -> Result<()> {
        self.write(|txn| txn.repo().set_checkpoint(owner_id, revision))
    }

    /// Physically remove a note with its queue and shadows.
    pub fn purge(&self, note_id: &NoteId) -> Result<bool> {
        self.write(|txn| txn.purge(note_id))
    }
}

/// Handle to an open store transaction.
pub struct StoreTxn<'a> {
    tx: Transaction<'a>,
    changes: Vec<NoteChange>,
}

impl StoreTxn<'_> {
    fn repo(&self) -> SqliteNoteRepository<'_> {
        SqliteNoteRepository::new(&self.tx)
    }

    pub fn get(&self, id: &NoteId) -> Result<Option<Note>> {
        self.repo().get(id)
    }

    /// Upsert a note after checking the version and timestamp invariants.
    pub fn put(&mut self, note: &Note, origin: WriteOrigin) -> Result<()> {
        let stored = self.repo().get(&note.id)?;
        let stored_version = stored.as_ref().map_or(0, |stored| stored.version);

        let version_ok = match origin {
            WriteOrigin::Local => note.version == stored_version + 1,
            WriteOrigin::Sync => note.version >= stored_version,
        };
        if !version_ok {
            tracing::error!(
                note = %note.id,
                stored = stored_version,
                attempted = note.version,
                ?origin,
                "Rejected stale note write"
            );
            return Err(Error::StaleWrite {
                note_id: note.id.to_string(),
                stored: stored_version,
                attempted: note.version,
            });
        }

        if let Some(stored) = stored.as_ref() {
            if note.version == stored.version && note.updated_at != stored.updated_at {
                return Err(Error::InvalidInput(format!(
                    "note {} changed updated_at without a version change",
                    note.id
                )));
            }
            if note.updated_at < stored.updated_at {
                return Err(Error::InvalidInput(format!(
                    "note {} updated_at moved backwards",
                    note.id
                )));
            }
            if note.created_at != stored.created_at {
                return Err(Error::InvalidInput(format!(
                    "note {} created_at is immutable",
                    note.id
                )));
            }
        }

        self.repo().upsert(note)?;
        self.changes.push(NoteChange::Upserted(note.clone()));
        Ok(())
    }

    pub fn append_pending(
        &mut self,
        note_id: &NoteId,
        kind: OpKind,
        payload: Option<&Note>,
        base_version: i64,
    ) -> Result<PendingOperation> {
        let op = self
            .repo()
            .insert_pending(note_id, kind, payload, base_version)?;
        tracing::debug!(note = %note_id, op = %op.op_id, %kind, base_version, "Queued pending operation");
        Ok(op)
    }

    pub fn pending_for(&self, note_id: &NoteId) -> Result<Vec<PendingOperation>> {
        self.repo().pending_for_note(note_id)
    }

    pub fn next_pending(&self, note_id: &NoteId) -> Result<Option<PendingOperation>> {
        self.repo().next_pending(note_id)
    }

    pub fn has_pending(&self, note_id: &NoteId) -> Result<bool> {
        self.repo().has_pending(note_id)
    }

    pub fn get_pending(&self, op_id: OpId) -> Result<Option<PendingOperation>> {
        self.repo().get_pending(op_id)
    }

    pub fn replace_pending_payload(&mut self, op_id: OpId, payload: &Note) -> Result<()> {
        self.repo().replace_pending_payload(op_id, payload)
    }

    pub fn remove_pending(&mut self, op_id: OpId) -> Result<bool> {
        self.repo().delete_pending(op_id)
    }

    /// Drop every queued operation of a note.
    pub fn clear_pending(&mut self, note_id: &NoteId) -> Result<usize> {
        self.repo().delete_pending_for_note(note_id)
    }

    pub fn set_in_flight(&mut self, op_id: OpId, in_flight: bool) -> Result<()> {
        self.repo().set_in_flight(op_id, in_flight)
    }

    pub fn record_shadow(&mut self, shadow: &ConflictShadow) -> Result<i64> {
        self.repo().insert_shadow(shadow)
    }

    pub fn list_shadows(&self, note_id: &NoteId) -> Result<Vec<ConflictShadow>> {
        self.repo().list_shadows(Some(note_id))
    }

    pub fn clear_shadows(&mut self, note_id: &NoteId) -> Result<usize> {
        self.repo().delete_shadows(note_id)
    }

    pub fn purge(&mut self, note_id: &NoteId) -> Result<bool> {
        let repo = self.repo();
        repo.delete_pending_for_note(note_id)?;
        repo.delete_shadows(note_id)?;
        let removed = repo.delete_note(note_id)?;
        if removed {
            tracing::debug!(note = %note_id, "Purged note");
            self.changes.push(NoteChange::Purged(*note_id));
        }
        Ok(removed)
    }
}
