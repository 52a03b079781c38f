//! Legacy record-store backend for the mentors directory.
//!
//! This crate implements the `MentorStore` trait from `mentors-storage` on top
//! of the hosted record-store HTTP API the directory originally lived in.
//!
//! # Example
//!
//! ```ignore
//! use mentors_db_records::{RecordsConfig, RecordsStore};
//! use mentors_storage::MentorStore;
//!
//! let config = RecordsConfig::new("https://api.records.example", "appXXXX", "key");
//! let store = RecordsStore::new(config)?;
//! let mentors = store.fetch_all().await?;
//! ```
//!
//! # Representation
//!
//! The record store links tags by tag record ID and exposes their names through
//! a lookup field. Reads use the lookup field, writes use the linked IDs.
//! Declined mentors are filtered out server-side and treated as not found.

mod client;
mod config;
mod error;
mod mapping;
mod store;

pub use client::{RecordsClient, RawRecord};
pub use config::RecordsConfig;
pub use error::{RecordsError, Result};
pub use store::RecordsStore;

pub use mentors_storage::{MentorStore, StorageError};
