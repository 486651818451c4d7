//! Sync status published by the engine for UI and CLI consumers.

/// Coarse sync phase shown to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPhase {
    Offline,
    Syncing,
    Synced,
    /// Local changes are waiting for the remote, usually after a transient failure
    Pending,
}

impl SyncPhase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Pending => "pending",
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the engine's progress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub pending_ops: usize,
    /// Unix ms of the last pass that left nothing pending
    pub last_synced_at: Option<i64>,
    pub last_error: Option<String>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Offline,
            pending_ops: 0,
            last_synced_at: None,
            last_error: None,
        }
    }
}
