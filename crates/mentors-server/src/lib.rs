//! Mentor directory HTTP server.
//!
//! Reads are served from an in-process snapshot of the mentor catalog
//! ([`cache::DirectoryCache`]) that is refreshed on a TTL, on demand, and
//! patched in place after writes. See [`triggers`] for the write paths that
//! keep the snapshot consistent with the backing store.

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod repository;
pub mod server;
pub mod storage;
pub mod triggers;

pub use config::AppConfig;
pub use error::ApiError;
pub use server::{AppState, MentorsServer, ServerBuilder, build_app};
