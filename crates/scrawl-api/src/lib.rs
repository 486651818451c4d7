//! scrawl-api - reference remote note service
//!
//! Serves the remote note contract over HTTP so sync clients can be pointed
//! at a real server. Notes live in memory for the lifetime of the process.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

pub use config::AppConfig;
pub use routes::{app_router, AppState};
