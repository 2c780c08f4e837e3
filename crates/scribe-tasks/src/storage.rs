//! Persistence backends for the task list

use async_trait::async_trait;
use fs2::FileExt;
use scribe_core::{Result, ScribeError, STATE_DIR};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, instrument};

use crate::store::TaskList;

/// Exclusive hold on a stored task list, released on drop
#[derive(Debug, Default)]
pub struct StorageLock {
    file: Option<File>,
}

impl StorageLock {
    /// A lock that guards nothing, for backends only reachable in-process
    pub fn unshared() -> Self {
        Self::default()
    }
}

impl Drop for StorageLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}

/// Where a task list is durably kept (allows in-memory stores in tests)
#[async_trait]
pub trait TaskPersistence: Send + Sync {
    /// Load the stored list, `None` when nothing was saved yet
    async fn load(&self) -> Result<Option<TaskList>>;

    /// Replace the stored list
    async fn save(&self, list: &TaskList) -> Result<()>;

    /// Block other writers (including other processes) until the returned
    /// guard is dropped
    async fn lock(&self) -> Result<StorageLock> {
        Ok(StorageLock::unshared())
    }
}

/// Task list stored as pretty JSON at `.scribe/tasks.json`
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location inside a project root
    pub fn for_root(root: &Path) -> Self {
        Self::new(root.join(STATE_DIR).join("tasks.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file that carries the advisory lock
    pub fn lock_path(&self) -> PathBuf {
        self.path.with_extension("json.lock")
    }
}

#[async_trait]
impl TaskPersistence for JsonFileStorage {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Result<Option<TaskList>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let list: TaskList = serde_json::from_str(&raw)?;
        debug!(tasks = list.tasks.len(), "Loaded task list");
        Ok(Some(list))
    }

    #[instrument(skip(self, list), fields(path = %self.path.display(), tasks = list.tasks.len()))]
    async fn save(&self, list: &TaskList) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to temp file then rename so readers never see a partial list
        let tmp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(list)?;
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        debug!("Saved task list");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn lock(&self) -> Result<StorageLock> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let lock_path = self.lock_path();
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(|e| ScribeError::Other(format!("task list lock did not finish: {}", e)))??;

        debug!("Locked task list");
        Ok(StorageLock { file: Some(file) })
    }
}

/// Volatile storage, optionally failing writes on demand
#[derive(Debug, Default)]
pub struct MemoryStorage {
    list: Mutex<Option<TaskList>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `save` fail with an I/O error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Last successfully saved list
    pub fn saved(&self) -> Option<TaskList> {
        self.list.lock().ok().and_then(|guard| guard.clone())
    }
}

#[async_trait]
impl TaskPersistence for MemoryStorage {
    async fn load(&self) -> Result<Option<TaskList>> {
        Ok(self.saved())
    }

    async fn save(&self, list: &TaskList) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ScribeError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "memory storage is read-only",
            )));
        }
        let mut guard = self
            .list
            .lock()
            .map_err(|_| ScribeError::Other("memory storage lock poisoned".to_string()))?;
        *guard = Some(list.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_json_storage_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = JsonFileStorage::for_root(dir.path());
        assert!(storage.load().await.unwrap().is_none());

        let list = TaskList::new("demo", Vec::new());
        storage.save(&list).await.unwrap();
        assert!(storage.path().exists());
        assert!(!storage.path().with_extension("json.tmp").exists());

        let loaded = storage.load().await.unwrap().unwrap();
        assert_eq!(loaded.project, "demo");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let storage = JsonFileStorage::for_root(dir.path());
        std::fs::create_dir_all(storage.path().parent().unwrap()).unwrap();
        std::fs::write(storage.path(), "{ not json").unwrap();

        assert!(matches!(
            storage.load().await,
            Err(ScribeError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_json_lock_is_exclusive_until_dropped() {
        let dir = TempDir::new().unwrap();
        let storage = JsonFileStorage::for_root(dir.path());

        let guard = storage.lock().await.unwrap();
        let other = std::fs::File::open(storage.lock_path()).unwrap();
        assert!(other.try_lock_exclusive().is_err());

        drop(guard);
        other.try_lock_exclusive().unwrap();
        FileExt::unlock(&other).unwrap();
    }

    #[tokio::test]
    async fn test_memory_storage_can_fail_writes() {
        let storage = MemoryStorage::new();
        storage.fail_writes(true);
        assert!(storage.save(&TaskList::new("demo", Vec::new())).await.is_err());
        assert!(storage.saved().is_none());
    }
}
