//! Background reconciliation between the local store and the remote service.

mod backoff;
mod engine;
#[cfg(test)]
mod tests;

pub use backoff::Backoff;
pub use engine::{DrainReport, PullReport, SyncEngine, SyncReport};
