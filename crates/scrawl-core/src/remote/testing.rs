//! Remote wrapper that can be switched offline and records calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::models::{NoteId, OwnerId, RemoteNote};

use super::{InMemoryRemote, RemoteError, RemoteNoteService, RemoteResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Create(NoteId),
    Update(NoteId, i64),
    Delete(NoteId, i64),
    List(u64),
}

#[derive(Debug, Clone)]
pub struct ToggleRemote {
    pub inner: InMemoryRemote,
    online: Arc<AtomicBool>,
    stalled: Arc<AtomicBool>,
    calls: Arc<Mutex<Vec<RemoteCall>>>,
}

impl ToggleRemote {
    pub fn new(inner: InMemoryRemote) -> Self {
        Self {
            inner,
            online: Arc::new(AtomicBool::new(true)),
            stalled: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Make every call hang until the engine's timeout fires.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn write_calls(&self) -> Vec<RemoteCall> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, RemoteCall::List(_)))
            .collect()
    }

    async fn gate(&self, call: RemoteCall) -> RemoteResult<()> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        if self.stalled.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
        }
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Transient("network unreachable".to_string()))
        }
    }
}

impl RemoteNoteService for ToggleRemote {
    async fn create_remote_note(&self, note: &RemoteNote) -> RemoteResult<RemoteNote> {
        self.gate(RemoteCall::Create(note.id)).await?;
        self.inner.create(note)
    }

    async fn update_remote_note(
        &self,
        id: &NoteId,
        payload: &RemoteNote,
        expected_version: i64,
    ) -> RemoteResult<RemoteNote> {
        self.gate(RemoteCall::Update(*id, expected_version)).await?;
        self.inner.update(id, payload, expected_version)
    }

    async fn delete_remote_note(
        &self,
        id: &NoteId,
        expected_version: i64,
    ) -> RemoteResult<RemoteNote> {
        self.gate(RemoteCall::Delete(*id, expected_version)).await?;
        self.inner.delete(id, expected_version)
    }

    async fn list_remote_notes_since(
        &self,
        owner_id: &OwnerId,
        checkpoint: u64,
    ) -> RemoteResult<Vec<RemoteNote>> {
        self.gate(RemoteCall::List(checkpoint)).await?;
        Ok(self.inner.list_since(owner_id, checkpoint))
    }
}
