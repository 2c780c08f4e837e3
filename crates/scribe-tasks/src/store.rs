//! Task state store
//!
//! Single writer of task records. Every mutation takes the storage lock,
//! reloads the persisted list and runs against a copy of it; the copy is
//! persisted and only then swapped in, so a failed closure or a failed write
//! leaves state untouched. Several stores (or processes) over the same file
//! therefore see each other's writes.

use chrono::{DateTime, Utc};
use scribe_core::{Result, ScribeError, Task};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::progress::ProgressSnapshot;
use crate::storage::TaskPersistence;

/// All tasks of one project, with aggregate counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskList {
    pub project: String,
    pub tasks: Vec<Task>,
    pub total: usize,
    pub completed: usize,
    pub progress: ProgressSnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskList {
    pub fn new(project: impl Into<String>, tasks: Vec<Task>) -> Self {
        let now = Utc::now();
        let mut list = Self {
            project: project.into(),
            tasks,
            total: 0,
            completed: 0,
            progress: ProgressSnapshot::default(),
            created_at: now,
            updated_at: now,
        };
        list.recompute();
        list
    }

    /// Refresh counters and the progress snapshot from the task records
    pub fn recompute(&mut self) {
        self.progress = ProgressSnapshot::compute(&self.tasks);
        self.total = self.progress.total;
        self.completed = self.progress.completed;
        self.updated_at = Utc::now();
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Look up a task or fail with `TaskNotFound`
    pub fn require(&self, id: &str) -> Result<&Task> {
        self.get(id)
            .ok_or_else(|| ScribeError::TaskNotFound(id.to_string()))
    }

    pub fn require_mut(&mut self, id: &str) -> Result<&mut Task> {
        self.get_mut(id)
            .ok_or_else(|| ScribeError::TaskNotFound(id.to_string()))
    }
}

/// Serialized access to the persisted task list
pub struct TaskStore {
    state: Mutex<TaskList>,
    storage: Arc<dyn TaskPersistence>,
}

impl TaskStore {
    /// Open an existing task list
    #[instrument(skip(storage))]
    pub async fn open(storage: Arc<dyn TaskPersistence>) -> Result<Self> {
        let list = storage.load().await?.ok_or_else(|| {
            ScribeError::NotInitialized("no task list found, run `scribe plan` first".to_string())
        })?;
        debug!(project = %list.project, tasks = list.tasks.len(), "Opened task store");

        Ok(Self {
            state: Mutex::new(list),
            storage,
        })
    }

    /// Create a task list, replacing whatever was stored before
    #[instrument(skip(storage, tasks), fields(tasks = tasks.len()))]
    pub async fn create(
        storage: Arc<dyn TaskPersistence>,
        project: &str,
        mut tasks: Vec<Task>,
    ) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        if let Some(duplicate) = tasks.iter().find(|t| !seen.insert(t.id.as_str())) {
            return Err(ScribeError::Other(format!(
                "duplicate task id: {}",
                duplicate.id
            )));
        }

        // Creation order breaks priority ties
        for (sequence, task) in tasks.iter_mut().enumerate() {
            task.sequence = sequence as u64;
        }

        let list = TaskList::new(project, tasks);
        let _lock = storage.lock().await?;
        storage.save(&list).await?;
        info!(project, total = list.total, "Created task list");

        Ok(Self {
            state: Mutex::new(list),
            storage,
        })
    }

    /// Copy of the current list
    pub async fn snapshot(&self) -> TaskList {
        self.state.lock().await.clone()
    }

    /// Reload the persisted list, picking up writes made by other stores
    pub async fn refresh(&self) -> Result<TaskList> {
        self.mutate(|list| Ok(list.clone())).await
    }

    /// Latest persisted copy of one task
    pub async fn get(&self, id: &str) -> Result<Task> {
        self.mutate(|list| list.require(id).cloned()).await
    }

    pub async fn progress(&self) -> ProgressSnapshot {
        self.state.lock().await.progress.clone()
    }

    /// Apply `f` atomically
    ///
    /// The closure sees a working copy of the latest persisted list. On `Err`
    /// from the closure or from persistence the stored list is left exactly
    /// as it was. A closure that changes nothing causes no write.
    pub async fn mutate<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut TaskList) -> Result<R>,
    {
        let mut guard = self.state.lock().await;
        let _lock = self.storage.lock().await?;
        if let Some(latest) = self.storage.load().await? {
            *guard = latest;
        }
        let mut working = guard.clone();

        let value = f(&mut working)?;
        if working == *guard {
            debug!("Task list unchanged, nothing to save");
            return Ok(value);
        }
        working.recompute();
        self.storage.save(&working).await?;

        *guard = working;
        Ok(value)
    }
}
