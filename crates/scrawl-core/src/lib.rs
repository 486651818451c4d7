//! scrawl-core - Core library for Scrawl
//!
//! This crate contains the shared models, the on-device note store, the note
//! service used by clients, and the sync engine that reconciles the device
//! with the remote note service.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod session;
pub mod state;
pub mod sync;
pub mod util;

pub use config::SyncSettings;
pub use db::{LocalStore, NoteChange};
pub use error::{Error, Result};
pub use models::{Note, NoteId, OwnerId};
pub use remote::{HttpRemoteNoteService, InMemoryRemote, RemoteError, RemoteNoteService};
pub use services::NoteService;
pub use session::Session;
pub use state::{SyncPhase, SyncStatus};
pub use sync::SyncEngine;
