//! Database layer for Scrawl

mod connection;
mod migrations;
mod repository;
mod store;

pub use connection::Database;
pub use repository::SqliteNoteRepository;
pub use store::{LocalStore, NoteChange, StoreTxn, WriteOrigin};
