//! redb table definitions for the berth state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized
//! protocol types). Task records and statuses are keyed by the persisted
//! task name, e.g. `data-0-server`.

use redb::TableDefinition;

/// Task records keyed by task name.
pub const TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");

/// Latest status update keyed by task name.
pub const STATUSES: TableDefinition<&str, &[u8]> = TableDefinition::new("statuses");
