//! StateStore — redb-backed task persistence for berth.
//!
//! Holds the task records a framework scheduler must survive restarts
//! with: the `TaskInfo` last launched for each task name (including the
//! reservation and persistence labels on its resources), the latest
//! status update, and permanent-failure marks. All values are
//! JSON-serialized into redb's `&[u8]` value columns. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable};
use tracing::debug;

use berth_proto::{TaskInfo, TaskStatus};

use crate::error::{StateError, StateResult};
use crate::tables::{STATUSES, TASKS};

/// Label marking a task as permanently failed; set by the recovery path,
/// read by the offer evaluator when classifying a pod.
pub const PERMANENTLY_FAILED_LABEL: &str = "permanently_failed";

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// The read capability the offer evaluator is constructed with. The
/// surrounding framework synchronizes writes; evaluation takes a snapshot
/// through these methods at pipeline-construction time only.
pub trait TaskStore: Send + Sync {
    /// Every persisted task record in the service.
    fn fetch_tasks(&self) -> StateResult<Vec<TaskInfo>>;

    /// A single task record by task name.
    fn fetch_task(&self, task_name: &str) -> StateResult<Option<TaskInfo>>;

    /// The latest status update for a task, if any was received.
    fn fetch_status(&self, task_name: &str) -> StateResult<Option<TaskStatus>>;

    /// Whether the recovery path has marked this task permanently failed.
    fn is_marked_failed(&self, task_name: &str) -> StateResult<bool>;
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(TASKS).map_err(map_err!(Table))?;
        txn.open_table(STATUSES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Tasks ──────────────────────────────────────────────────────

    /// Insert or update a task record, keyed by its name.
    pub fn put_task(&self, task: &TaskInfo) -> StateResult<()> {
        let value = serde_json::to_vec(task).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(TASKS).map_err(map_err!(Table))?;
            table
                .insert(task.name.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(task = %task.name, "task stored");
        Ok(())
    }

    /// Delete a task record and its status. Returns true if it existed.
    pub fn delete_task(&self, task_name: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut tasks = txn.open_table(TASKS).map_err(map_err!(Table))?;
            existed = tasks.remove(task_name).map_err(map_err!(Write))?.is_some();
            let mut statuses = txn.open_table(STATUSES).map_err(map_err!(Table))?;
            statuses.remove(task_name).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(task = %task_name, existed, "task deleted");
        Ok(existed)
    }

    // ── Statuses ───────────────────────────────────────────────────

    /// Record the latest status update for a task.
    pub fn put_status(&self, task_name: &str, status: &TaskStatus) -> StateResult<()> {
        let value = serde_json::to_vec(status).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(STATUSES).map_err(map_err!(Table))?;
            table
                .insert(task_name, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Failure marks ──────────────────────────────────────────────

    /// Mark a task permanently failed. The label rides on the stored task
    /// record so it survives alongside the reservation identity it voids.
    pub fn mark_failed(&self, task_name: &str) -> StateResult<()> {
        let mut task = self
            .fetch_task(task_name)?
            .ok_or_else(|| StateError::TaskNotFound(task_name.to_string()))?;
        task.labels.set(PERMANENTLY_FAILED_LABEL, "true");
        self.put_task(&task)
    }
}

impl TaskStore for StateStore {
    fn fetch_tasks(&self) -> StateResult<Vec<TaskInfo>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TASKS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let task: TaskInfo =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(task);
        }
        Ok(results)
    }

    fn fetch_task(&self, task_name: &str) -> StateResult<Option<TaskInfo>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TASKS).map_err(map_err!(Table))?;
        match table.get(task_name).map_err(map_err!(Read))? {
            Some(guard) => {
                let task: TaskInfo =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    fn fetch_status(&self, task_name: &str) -> StateResult<Option<TaskStatus>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(STATUSES).map_err(map_err!(Table))?;
        match table.get(task_name).map_err(map_err!(Read))? {
            Some(guard) => {
                let status: TaskStatus =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }

    fn is_marked_failed(&self, task_name: &str) -> StateResult<bool> {
        Ok(self
            .fetch_task(task_name)?
            .map(|t| t.labels.get(PERMANENTLY_FAILED_LABEL) == Some("true"))
            .unwrap_or(false))
    }
}
