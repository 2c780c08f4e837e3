//! Service wiring
//!
//! Synchronous services are declared in a [`ServiceRegistry`] and built on
//! first use. The task store needs an async load, so the dispatcher is
//! assembled on top of the registry's storage and validator.

use anyhow::{Context, Result};
use scribe_batch::{BatchBuilder, FilePrioritizer, PlanStore};
use scribe_core::{ScribeConfig, ServiceRegistry};
use scribe_tasks::{Dispatcher, JsonFileStorage, TaskGenerator, TaskPersistence, TaskStore};
use scribe_validation::Validator;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CONFIG: &str = "config";
pub const PRIORITIZER: &str = "prioritizer";
pub const BUILDER: &str = "builder";
pub const VALIDATOR: &str = "validator";
pub const GENERATOR: &str = "generator";
pub const PLANS: &str = "plans";
pub const STORAGE: &str = "storage";

pub struct Services {
    root: PathBuf,
    registry: ServiceRegistry,
}

impl Services {
    /// Declare every service for the project at `root`
    pub fn new(root: &Path) -> Result<Self> {
        let mut registry = ServiceRegistry::new();

        let config_root = root.to_path_buf();
        registry.register(CONFIG, &[], move |_| {
            ScribeConfig::load_or_default(&config_root)
        });

        registry.register(PRIORITIZER, &[CONFIG], |r| {
            let config = r.get::<ScribeConfig>(CONFIG)?;
            // Generated docs must never be scanned as sources
            FilePrioritizer::new(&config.scan)?
                .with_exclusion(config.output.docs_dir.trim_end_matches('/'))
        });

        registry.register(BUILDER, &[CONFIG], |r| {
            let config = r.get::<ScribeConfig>(CONFIG)?;
            Ok(BatchBuilder::new(&config.budget))
        });

        registry.register(GENERATOR, &[CONFIG], |r| {
            let config = r.get::<ScribeConfig>(CONFIG)?;
            Ok(TaskGenerator::new(&config))
        });

        let validator_root = root.to_path_buf();
        registry.register(VALIDATOR, &[CONFIG], move |r| {
            let config = r.get::<ScribeConfig>(CONFIG)?;
            Ok(Validator::new(validator_root.clone(), config.validation.clone()))
        });

        let plans_root = root.to_path_buf();
        registry.register(PLANS, &[], move |_| Ok(PlanStore::new(&plans_root)));

        let storage_root = root.to_path_buf();
        registry.register(STORAGE, &[], move |_| {
            Ok(JsonFileStorage::for_root(&storage_root))
        });

        registry
            .validate()
            .context("Invalid service wiring")?;

        Ok(Self {
            root: root.to_path_buf(),
            registry,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> Result<Arc<ScribeConfig>> {
        self.registry
            .get(CONFIG)
            .context("Failed to load .scribe/config.toml")
    }

    pub fn prioritizer(&self) -> Result<Arc<FilePrioritizer>> {
        Ok(self.registry.get(PRIORITIZER)?)
    }

    pub fn builder(&self) -> Result<Arc<BatchBuilder>> {
        Ok(self.registry.get(BUILDER)?)
    }

    pub fn generator(&self) -> Result<Arc<TaskGenerator>> {
        Ok(self.registry.get(GENERATOR)?)
    }

    pub fn validator(&self) -> Result<Arc<Validator>> {
        Ok(self.registry.get(VALIDATOR)?)
    }

    pub fn plans(&self) -> Result<Arc<PlanStore>> {
        Ok(self.registry.get(PLANS)?)
    }

    pub fn storage(&self) -> Result<Arc<dyn TaskPersistence>> {
        let storage: Arc<JsonFileStorage> = self.registry.get(STORAGE)?;
        Ok(storage)
    }

    /// Open the persisted task list and put a dispatcher in front of it
    pub async fn dispatcher(&self) -> Result<Dispatcher> {
        let store = TaskStore::open(self.storage()?)
            .await
            .context("Failed to open the task list")?;
        Ok(Dispatcher::new(Arc::new(store), self.validator()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_wiring_resolves_every_service() {
        let dir = TempDir::new().unwrap();
        let services = Services::new(dir.path()).unwrap();

        assert_eq!(services.config().unwrap().output.docs_dir, "docs");
        services.prioritizer().unwrap();
        services.builder().unwrap();
        services.generator().unwrap();
        services.plans().unwrap();
        services.storage().unwrap();
        assert_eq!(services.validator().unwrap().root(), dir.path());
    }

    #[test]
    fn test_config_is_shared() {
        let dir = TempDir::new().unwrap();
        let services = Services::new(dir.path()).unwrap();
        let first = services.config().unwrap();
        let second = services.config().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_dispatcher_requires_a_plan() {
        let dir = TempDir::new().unwrap();
        let services = Services::new(dir.path()).unwrap();
        assert!(services.dispatcher().await.is_err());
    }
}
