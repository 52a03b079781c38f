//! Test support for the mentors directory.
//!
//! [`MemoryStore`] is an in-memory [`MentorStore`] with call counters, failure
//! injection and an artificial latency knob, so cache behavior can be asserted
//! in terms of how many backend calls it made. [`fixtures`] builds records.

pub mod fixtures;
mod store;

pub use store::{CallCounts, MemoryStore, tag_id};

pub use mentors_storage::{MentorStore, StorageError};
