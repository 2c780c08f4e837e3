//! Batch plan persistence under `.scribe/`
//!
//! The manifest lives in `manifest.json` and every work unit in
//! `batches/<batch-id>.json`. Writes go to a temporary file that is renamed
//! into place so a crash never leaves a half-written plan behind.

use scribe_core::{Result, ScribeError, STATE_DIR};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::builder::{BatchManifest, BatchPlan, WorkUnit};

const MANIFEST_FILE: &str = "manifest.json";
const BATCHES_DIR: &str = "batches";

/// Reads and writes batch plans for one project
#[derive(Debug, Clone)]
pub struct PlanStore {
    state_dir: PathBuf,
}

impl PlanStore {
    pub fn new(root: &Path) -> Self {
        Self {
            state_dir: root.join(STATE_DIR),
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.state_dir.join(MANIFEST_FILE)
    }

    pub fn unit_path(&self, id: &str) -> PathBuf {
        self.state_dir.join(BATCHES_DIR).join(format!("{}.json", id))
    }

    /// Whether a plan has been written
    pub async fn exists(&self) -> bool {
        fs::try_exists(self.manifest_path()).await.unwrap_or(false)
    }

    /// Replace any existing plan with `plan`
    pub async fn save(&self, plan: &BatchPlan) -> Result<()> {
        let batches_dir = self.state_dir.join(BATCHES_DIR);
        match fs::remove_dir_all(&batches_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&batches_dir).await?;

        for unit in &plan.units {
            write_json_atomic(&self.unit_path(&unit.id), unit).await?;
        }
        write_json_atomic(&self.manifest_path(), &plan.manifest).await?;

        debug!(
            batches = plan.units.len(),
            dir = %self.state_dir.display(),
            "Saved batch plan"
        );
        Ok(())
    }

    /// Load the manifest, or `None` when no plan exists yet
    pub async fn load_manifest(&self) -> Result<Option<BatchManifest>> {
        match fs::read(self.manifest_path()).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Load a single work unit by id
    pub async fn load_unit(&self, id: &str) -> Result<WorkUnit> {
        let path = self.unit_path(id);
        let data = fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ScribeError::Other(format!("Work unit {} not found at {}", id, path.display()))
            } else {
                e.into()
            }
        })?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Load the manifest and every unit it lists
    ///
    /// Units missing from disk are skipped with a warning.
    pub async fn load_plan(&self) -> Result<Option<BatchPlan>> {
        let Some(manifest) = self.load_manifest().await? else {
            return Ok(None);
        };

        let mut units = Vec::with_capacity(manifest.batches.len());
        for summary in &manifest.batches {
            match self.load_unit(&summary.id).await {
                Ok(unit) => units.push(unit),
                Err(e) => warn!(batch = %summary.id, error = %e, "Skipping missing work unit"),
            }
        }

        Ok(Some(BatchPlan { manifest, units }))
    }
}

/// Serialize `value` as pretty JSON to `path` via a temporary sibling
pub(crate) async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let data = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}
