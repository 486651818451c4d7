//! Client-facing services built on the local store.

mod notes;

pub use notes::NoteService;
