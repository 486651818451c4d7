//! Sync engine: pushes the pending-operation log and pulls remote changes.
//!
//! The engine is the only component doing network I/O. Operations for one note
//! are sent strictly in order by a single sender; different notes are sent
//! concurrently. All store writes go through `WriteOrigin::Sync`, so versions
//! only move forward.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::SyncSettings;
use crate::db::{LocalStore, StoreTxn, WriteOrigin};
use crate::error::Result;
use crate::models::{
    ConflictShadow, Note, NoteId, OpKind, PendingOperation, RemoteNote, SyncState,
};
use crate::remote::{RemoteError, RemoteNoteService, RemoteResult};
use crate::session::Session;
use crate::state::{SyncPhase, SyncStatus};
use crate::util::unix_millis_now;

use super::backoff::Backoff;

/// Result of pulling remote changes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PullReport {
    pub applied: usize,
    pub purged: usize,
    /// Notes skipped because local operations are still queued
    pub deferred: usize,
    /// Echoes of versions this device already knows
    pub skipped: usize,
    pub checkpoint: u64,
}

/// Result of draining the pending-operation log.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
    pub acked: usize,
    pub conflicts: usize,
    /// Updates re-queued as creates because the remote lost the note
    pub requeued: usize,
    /// One entry per note that stopped early, oldest first
    pub failures: Vec<String>,
}

impl DrainReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn absorb(&mut self, note_id: NoteId, outcome: NoteOutcome) {
        self.acked += outcome.acked;
        self.conflicts += outcome.conflicts;
        self.requeued += outcome.requeued;
        if let Some(failure) = outcome.failure {
            self.failures.push(format!("{note_id}: {failure}"));
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub pull: Option<PullReport>,
    pub drain: DrainReport,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.drain.is_complete()
    }
}

#[derive(Debug, Default)]
struct NoteOutcome {
    acked: usize,
    conflicts: usize,
    requeued: usize,
    failure: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PullOutcome {
    Applied,
    Purged,
    Deferred,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    LocalWon,
    RemoteWon,
    Settled,
}

type Claims = Arc<Mutex<HashSet<NoteId>>>;

/// Exclusive right to send a note's operations, released on drop.
struct NoteClaim {
    claims: Claims,
    note_id: NoteId,
}

impl Drop for NoteClaim {
    fn drop(&mut self) {
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.note_id);
    }
}

struct EngineInner<R> {
    store: Arc<LocalStore>,
    remote: R,
    session: Session,
    settings: SyncSettings,
    claims: Claims,
    status: watch::Sender<SyncStatus>,
}

/// Reconciles the local store with a remote note service.
pub struct SyncEngine<R> {
    inner: Arc<EngineInner<R>>,
}

impl<R> Clone for SyncEngine<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> SyncEngine<R>
where
    R: RemoteNoteService + 'static,
{
    pub fn new(
        store: Arc<LocalStore>,
        remote: R,
        session: Session,
        settings: SyncSettings,
    ) -> Result<Self> {
        settings.validate()?;
        let (status, _) = watch::channel(SyncStatus::default());
        Ok(Self {
            inner: Arc::new(EngineInner {
                store,
                remote,
                session,
                settings,
                claims: Arc::new(Mutex::new(HashSet::new())),
                status,
            }),
        })
    }

    /// Observe sync progress.
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    pub fn remote(&self) -> &R {
        &self.inner.remote
    }

    fn store(&self) -> &LocalStore {
        &self.inner.store
    }

    /// Pull, then drain, publishing status around the pass.
    pub async fn sync_once(&self) -> Result<SyncReport> {
        self.pass(true).await
    }

    async fn pass(&self, pull: bool) -> Result<SyncReport> {
        self.inner
            .status
            .send_modify(|status| status.phase = SyncPhase::Syncing);

        let result: Result<SyncReport> = async {
            let pull = if pull { Some(self.pull().await?) } else { None };
            let drain = self.drain().await?;
            Ok(SyncReport { pull, drain })
        }
        .await;

        self.finish_pass(&result);
        result
    }

    fn finish_pass(&self, result: &Result<SyncReport>) {
        let pending_ops = self
            .store()
            .pending_count(&self.inner.session.owner_id)
            .unwrap_or_default();
        let last_error = match result {
            Ok(report) => report.drain.failures.last().cloned(),
            Err(error) => Some(error.to_string()),
        };

        match &last_error {
            Some(error) => tracing::warn!(pending_ops, "Sync pass incomplete: {error}"),
            None => tracing::debug!(pending_ops, "Sync pass finished"),
        }

        self.inner.status.send_modify(|status| {
            status.pending_ops = pending_ops;
            if last_error.is_none() && pending_ops == 0 {
                status.phase = SyncPhase::Synced;
                status.last_synced_at = Some(unix_millis_now());
            } else {
                status.phase = SyncPhase::Pending;
            }
            status.last_error = last_error;
        });
    }

    /// Fetch remote changes since the stored checkpoint and apply them.
    pub async fn pull(&self) -> Result<PullReport> {
        let owner_id = &self.inner.session.owner_id;
        let checkpoint = self.store().checkpoint(owner_id)?;
        let remote_notes = self
            .with_timeout(
                self.inner
                    .remote
                    .list_remote_notes_since(owner_id, checkpoint),
            )
            .await?;

        let mut report = PullReport {
            checkpoint,
            ..PullReport::default()
        };
        for remote in &remote_notes {
            report.checkpoint = report.checkpoint.max(remote.revision);
            if remote.owner_id != *owner_id {
                tracing::warn!(note = %remote.id, "Ignoring pulled note of another owner");
                continue;
            }
            match self.store().write(|txn| apply_pulled(txn, remote))? {
                PullOutcome::Applied => report.applied += 1,
                PullOutcome::Purged => report.purged += 1,
                PullOutcome::Deferred => report.deferred += 1,
                PullOutcome::Skipped => report.skipped += 1,
            }
        }

        if report.checkpoint > checkpoint {
            self.store().set_checkpoint(owner_id, report.checkpoint)?;
        }
        if report.applied + report.purged > 0 {
            tracing::info!(
                applied = report.applied,
                purged = report.purged,
                deferred = report.deferred,
                "Pulled remote changes"
            );
        }
        Ok(report)
    }

    /// Send every queued operation, one sender per note.
    pub async fn drain(&self) -> Result<DrainReport> {
        let note_ids = self.store().pending_note_ids(&self.inner.session.owner_id)?;
        let mut report = DrainReport::default();
        let max_senders = self.inner.settings.max_concurrent_sends;
        let mut senders = JoinSet::new();

        for note_id in note_ids {
            let Some(claim) = self.claim(note_id) else {
                tracing::debug!(note = %note_id, "Note already has a sender");
                continue;
            };
            while senders.len() >= max_senders {
                if let Some(joined) = senders.join_next().await {
                    collect_sender(&mut report, joined);
                }
            }

            let engine = self.clone();
            senders.spawn(async move {
                let _claim = claim;
                (note_id, engine.send_note(note_id).await)
            });
        }

        while let Some(joined) = senders.join_next().await {
            collect_sender(&mut report, joined);
        }

        if report.acked + report.conflicts > 0 {
            tracing::info!(
                acked = report.acked,
                conflicts = report.conflicts,
                failed = report.failures.len(),
                "Drained pending operations"
            );
        }
        Ok(report)
    }

    /// Long-running loop driven by connectivity, store changes, and a pull timer.
    ///
    /// Shutdown is only observed between passes.
    pub async fn run(
        &self,
        mut connectivity: watch::Receiver<bool>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let recovered = self.store().reset_in_flight()?;
        if recovered > 0 {
            tracing::info!(recovered, "Reset interrupted in-flight operations");
        }

        let settings = self.inner.settings;
        let mut changes = self.store().subscribe();
        let mut backoff = Backoff::new(settings.initial_backoff(), settings.max_backoff());
        let mut next_pull: Option<Instant> = None;
        let mut retry_at: Option<Instant> = None;
        let mut drain_requested = false;

        tracing::info!(owner = %self.inner.session.owner_id, "Sync engine started");
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if !*connectivity.borrow_and_update() {
                self.inner
                    .status
                    .send_modify(|status| status.phase = SyncPhase::Offline);
                next_pull = None;
                retry_at = None;
                backoff.reset();
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    changed = connectivity.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    received = changes.recv() => {
                        if matches!(received, Err(broadcast::error::RecvError::Closed)) {
                            break;
                        }
                    }
                }
                continue;
            }

            let now = Instant::now();
            let backing_off = retry_at.is_some_and(|at| at > now);
            let pull_due = next_pull.map_or(true, |at| at <= now);
            if !backing_off && (pull_due || drain_requested) {
                drain_requested = false;
                let result = self.pass(pull_due).await;
                if pull_due {
                    next_pull = Some(Instant::now() + settings.pull_interval());
                }

                let complete = result.as_ref().is_ok_and(SyncReport::is_complete);
                if complete {
                    backoff.reset();
                    retry_at = None;
                } else {
                    let delay = backoff.next_delay();
                    tracing::warn!(?delay, "Backing off after failed sync pass");
                    retry_at = Some(Instant::now() + delay);
                    next_pull = None;
                }
                continue;
            }

            let deadline = retry_at.or(next_pull).unwrap_or(now);
            tokio::select! {
                () = shutdown.cancelled() => break,
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                received = changes.recv() => match received {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => drain_requested = true,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                () = sleep_until(deadline) => {
                    if retry_at.is_some_and(|at| at <= Instant::now()) {
                        retry_at = None;
                    }
                }
            }
        }

        self.inner
            .status
            .send_modify(|status| status.phase = SyncPhase::Offline);
        tracing::info!("Sync engine stopped");
        Ok(())
    }

    fn claim(&self, note_id: NoteId) -> Option<NoteClaim> {
        let mut claims = self
            .inner
            .claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        claims.insert(note_id).then(|| NoteClaim {
            claims: Arc::clone(&self.inner.claims),
            note_id,
        })
    }

    async fn with_timeout<T>(
        &self,
        call: impl Future<Output = RemoteResult<T>> + Send,
    ) -> RemoteResult<T> {
        let limit = self.inner.settings.request_timeout();
        timeout(limit, call).await.unwrap_or_else(|_| {
            Err(RemoteError::Transient(format!(
                "request timed out after {}s",
                limit.as_secs()
            )))
        })
    }

    /// Send the queued operations of one note in order until the queue is
    /// empty or a call fails.
    async fn send_note(&self, note_id: NoteId) -> Result<NoteOutcome> {
        let mut outcome = NoteOutcome::default();

        while let Some(op) = self.take_next(&note_id)? {
            tracing::debug!(
                note = %note_id,
                op = %op.op_id,
                kind = %op.kind,
                base_version = op.base_version,
                "Sending pending operation"
            );

            match self.send(&op).await {
                Ok(remote) => {
                    self.acknowledge(&op, Some(&remote))?;
                    outcome.acked += 1;
                }
                Err(RemoteError::VersionMismatch(current) | RemoteError::AlreadyExists(current)) => {
                    if is_replay(&op, &current) {
                        tracing::debug!(note = %note_id, op = %op.op_id, "Remote already applied operation");
                        self.acknowledge(&op, Some(&current))?;
                        outcome.acked += 1;
                    } else {
                        let resolution = self.resolve_conflict(&op, &current)?;
                        tracing::warn!(
                            note = %note_id,
                            local_version = op.resulting_version(),
                            remote_version = current.version,
                            ?resolution,
                            "Resolved sync conflict"
                        );
                        if resolution != Resolution::Settled {
                            outcome.conflicts += 1;
                        }
                    }
                }
                Err(RemoteError::NotFound) if op.kind == OpKind::Delete => {
                    self.acknowledge(&op, None)?;
                    outcome.acked += 1;
                }
                Err(RemoteError::NotFound) if op.kind == OpKind::Update => {
                    tracing::warn!(note = %note_id, "Remote lost note, re-queueing as create");
                    self.requeue_as_create(&op)?;
                    outcome.requeued += 1;
                }
                Err(error) => {
                    self.store().record_attempt(op.op_id)?;
                    if error.is_transient() {
                        tracing::warn!(note = %note_id, op = %op.op_id, "Operation will be retried: {error}");
                    } else {
                        tracing::error!(note = %note_id, op = %op.op_id, "Remote refused operation: {error}");
                    }
                    outcome.failure = Some(error.to_string());
                    break;
                }
            }
        }

        Ok(outcome)
    }

    /// Mark the oldest op of a note in flight, reading its latest payload.
    fn take_next(&self, note_id: &NoteId) -> Result<Option<PendingOperation>> {
        self.store().write(|txn| {
            let Some(mut op) = txn.next_pending(note_id)? else {
                return Ok(None);
            };
            txn.set_in_flight(op.op_id, true)?;
            op.in_flight = true;
            Ok(Some(op))
        })
    }

    async fn send(&self, op: &PendingOperation) -> RemoteResult<RemoteNote> {
        let remote = &self.inner.remote;
        match (op.kind, op.payload.as_ref()) {
            (OpKind::Create, Some(note)) => {
                self.with_timeout(remote.create_remote_note(&RemoteNote::from(note)))
                    .await
            }
            (OpKind::Update, Some(note)) => {
                self.with_timeout(remote.update_remote_note(
                    &op.note_id,
                    &RemoteNote::from(note),
                    op.base_version,
                ))
                .await
            }
            (OpKind::Delete, _) => {
                self.with_timeout(remote.delete_remote_note(&op.note_id, op.base_version))
                    .await
            }
            (kind, None) => Err(RemoteError::Rejected(format!(
                "{kind} operation {} has no payload",
                op.op_id
            ))),
        }
    }

    fn acknowledge(&self, op: &PendingOperation, remote: Option<&RemoteNote>) -> Result<()> {
        self.store().write(|txn| {
            txn.remove_pending(op.op_id)?;
            let Some(mut note) = txn.get(&op.note_id)? else {
                return Ok(());
            };

            if op.kind == OpKind::Delete {
                return retire(txn, note, remote);
            }

            if let Some(remote) = remote {
                note.remote_version = note.remote_version.max(remote.version);
                if remote.version > note.version {
                    note.version = remote.version;
                    note.updated_at = note.updated_at.max(remote.updated_at);
                }
            }
            if note.sync_state == SyncState::Dirty && !txn.has_pending(&note.id)? {
                note.sync_state = SyncState::Clean;
            }
            txn.put(&note, WriteOrigin::Sync)
        })
    }

    /// Last-writer-wins by `updated_at`, local preferred on ties. The losing
    /// side is kept as a shadow and the note is marked conflicted.
    fn resolve_conflict(&self, op: &PendingOperation, current: &RemoteNote) -> Result<Resolution> {
        let recorded_at = unix_millis_now();
        self.store().write(|txn| {
            let Some(local) = txn.get(&op.note_id)? else {
                txn.clear_pending(&op.note_id)?;
                return Ok(Resolution::Settled);
            };

            txn.clear_pending(&local.id)?;
            if local.deleted && current.deleted {
                retire(txn, local, Some(current))?;
                return Ok(Resolution::Settled);
            }

            if local.updated_at >= current.updated_at {
                txn.record_shadow(&ConflictShadow::from_remote(current, recorded_at))?;
                let mut note = local;
                note.raise_version_above(current.version);
                note.remote_version = current.version;
                note.sync_state = SyncState::Conflicted;
                txn.put(&note, WriteOrigin::Sync)?;
                if note.deleted {
                    txn.append_pending(&note.id, OpKind::Delete, None, current.version)?;
                } else {
                    txn.append_pending(&note.id, OpKind::Update, Some(&note), current.version)?;
                }
                Ok(Resolution::LocalWon)
            } else {
                txn.record_shadow(&ConflictShadow::from_local(&local, recorded_at))?;
                let mut note = absorb_remote(&local, current);
                note.sync_state = SyncState::Conflicted;
                txn.put(&note, WriteOrigin::Sync)?;
                Ok(Resolution::RemoteWon)
            }
        })
    }

    fn requeue_as_create(&self, op: &PendingOperation) -> Result<()> {
        self.store().write(|txn| {
            txn.clear_pending(&op.note_id)?;
            let Some(mut note) = txn.get(&op.note_id)? else {
                return Ok(());
            };
            if note.deleted {
                return retire(txn, note, None);
            }
            note.remote_version = 0;
            txn.put(&note, WriteOrigin::Sync)?;
            txn.append_pending(&note.id, OpKind::Create, Some(&note), 0)?;
            Ok(())
        })
    }
}

fn collect_sender(
    report: &mut DrainReport,
    joined: std::result::Result<(NoteId, Result<NoteOutcome>), tokio::task::JoinError>,
) {
    match joined {
        Ok((note_id, Ok(outcome))) => report.absorb(note_id, outcome),
        Ok((note_id, Err(error))) => {
            tracing::error!(note = %note_id, "Sync failed for note: {error}");
            report.failures.push(format!("{note_id}: {error}"));
        }
        Err(error) => {
            tracing::error!("Sync sender task failed: {error}");
            report.failures.push(format!("sender task failed: {error}"));
        }
    }
}

/// Whether `current` shows the remote already applied `op`.
fn is_replay(op: &PendingOperation, current: &RemoteNote) -> bool {
    match (op.kind, op.payload.as_ref()) {
        (OpKind::Delete, _) => current.deleted,
        (_, Some(payload)) => current.content_matches(&RemoteNote::from(payload)),
        (_, None) => false,
    }
}

/// Local record carrying the remote content with a version above both sides.
fn absorb_remote(local: &Note, remote: &RemoteNote) -> Note {
    Note {
        id: local.id,
        owner_id: local.owner_id.clone(),
        title: remote.title.clone(),
        body: remote.body.clone(),
        attachment: remote.attachment.clone(),
        created_at: local.created_at,
        updated_at: local.updated_at.max(remote.updated_at),
        version: if remote.version > local.version {
            remote.version
        } else {
            local.version + 1
        },
        remote_version: remote.version,
        deleted: remote.deleted,
        sync_state: local.sync_state,
    }
}

/// Drop a deleted note, unless it carries a conflict the user has not seen.
fn retire(txn: &mut StoreTxn<'_>, mut note: Note, remote: Option<&RemoteNote>) -> Result<()> {
    if note.sync_state != SyncState::Conflicted {
        txn.purge(&note.id)?;
        return Ok(());
    }

    if let Some(remote) = remote {
        note.remote_version = note.remote_version.max(remote.version);
        if remote.version > note.version {
            note.version = remote.version;
            note.updated_at = note.updated_at.max(remote.updated_at);
        }
    }
    txn.put(&note, WriteOrigin::Sync)
}

fn apply_pulled(txn: &mut StoreTxn<'_>, remote: &RemoteNote) -> Result<PullOutcome> {
    let Some(local) = txn.get(&remote.id)? else {
        if remote.deleted {
            return Ok(PullOutcome::Skipped);
        }
        txn.put(&remote.to_local(), WriteOrigin::Sync)?;
        return Ok(PullOutcome::Applied);
    };

    if txn.has_pending(&local.id)? {
        return Ok(PullOutcome::Deferred);
    }
    if remote.version <= local.remote_version {
        return Ok(PullOutcome::Skipped);
    }

    if remote.deleted && local.sync_state != SyncState::Conflicted {
        txn.purge(&local.id)?;
        return Ok(PullOutcome::Purged);
    }

    let mut note = absorb_remote(&local, remote);
    if note.sync_state != SyncState::Conflicted {
        note.sync_state = SyncState::Clean;
    }
    txn.put(&note, WriteOrigin::Sync)?;
    Ok(PullOutcome::Applied)
}
