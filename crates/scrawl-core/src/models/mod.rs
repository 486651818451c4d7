//! Data models for Scrawl

mod attachment;
mod note;
mod pending;
mod remote;
mod sync_conflict;

pub use attachment::{Attachment, AttachmentKind};
pub use note::{Note, NoteId, OwnerId, SyncState};
pub use pending::{OpId, OpKind, PendingOperation};
pub use remote::RemoteNote;
pub use sync_conflict::{ConflictShadow, ShadowSource};
