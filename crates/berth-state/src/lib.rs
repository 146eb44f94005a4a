//! Persistent task state for the berth scheduler.
//!
//! A framework scheduler must remember which tasks it launched and with
//! which reservation identities, or a restart would strand reserved
//! resources and persistent volumes on agents forever. This crate stores
//! `TaskInfo` records, status updates, and permanent-failure marks in a
//! redb database, and exposes the read side as the `TaskStore` trait the
//! offer evaluator is constructed with.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::{StateStore, TaskStore, PERMANENTLY_FAILED_LABEL};
