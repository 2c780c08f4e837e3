//! Work-unit construction
//!
//! Files arrive in priority order and each one picks a strategy by size:
//! small files are packed into combined batches, medium files get a batch
//! of their own (trimmed when slightly over target), and large files are
//! chunked at structural boundaries into one batch per chunk.

use chrono::{DateTime, Utc};
use scribe_core::{BudgetConfig, Category, ChunkInfo, Language, ScribeError, SourceFile};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::boundary::BoundaryDetector;
use crate::budget::TokenEstimator;
use crate::trimmer::{ContentTrimmer, TrimReport};
use crate::warning::{BatchWarning, WarningKind};

/// Concurrent file reads while loading batch content
const MAX_CONCURRENT_READS: usize = 32;

/// How a work unit was built
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStrategy {
    /// Several small files packed together
    Combined,
    /// One medium file, possibly trimmed
    Single,
    /// One chunk of a large file
    Chunked,
}

impl std::fmt::Display for BatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Combined => write!(f, "combined"),
            Self::Single => write!(f, "single"),
            Self::Chunked => write!(f, "chunked"),
        }
    }
}

/// One file (or file chunk) inside a work unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnitEntry {
    pub path: String,
    pub category: Category,
    pub language: Language,
    pub importance: i32,
    /// Content as delivered to the agent, trimmed or chunked as needed
    pub content: String,
    pub estimated_tokens: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<ChunkInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim: Option<TrimReport>,
    /// What the agent should focus on for this entry
    pub processing_hint: String,
}

/// A bundle of file content sized to fit one agent context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    /// `batch-001`, `batch-002`, ...
    pub id: String,
    /// 1-based position in the plan
    pub index: usize,
    pub strategy: BatchStrategy,
    pub entries: Vec<WorkUnitEntry>,
    pub estimated_tokens: usize,
    /// SHA-256 over the entries, hex encoded
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<BatchWarning>,
}

impl WorkUnit {
    /// Distinct file paths in entry order
    pub fn files(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.entries
            .iter()
            .filter(|e| seen.insert(e.path.as_str()))
            .map(|e| e.path.clone())
            .collect()
    }

    pub fn max_importance(&self) -> i32 {
        self.entries.iter().map(|e| e.importance).max().unwrap_or(0)
    }

    /// Chunk position when this unit holds one chunk of a large file
    pub fn chunk(&self) -> Option<&ChunkInfo> {
        match self.strategy {
            BatchStrategy::Chunked => self.entries.first().and_then(|e| e.chunk.as_ref()),
            _ => None,
        }
    }

    /// Recompute the fingerprint from the current entries
    pub fn fingerprint(entries: &[WorkUnitEntry]) -> String {
        let mut hasher = Sha256::new();
        for entry in entries {
            hasher.update(entry.path.as_bytes());
            hasher.update([0u8]);
            if let Some(chunk) = &entry.chunk {
                hasher.update(chunk.ordinal.to_le_bytes());
                hasher.update(chunk.total.to_le_bytes());
            }
            hasher.update(entry.content.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}

/// Per-batch line of the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub id: String,
    pub strategy: BatchStrategy,
    pub files: Vec<String>,
    pub estimated_tokens: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<ChunkInfo>,
}

/// Overview of one batching run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchManifest {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub files_considered: usize,
    pub files_included: usize,
    pub total_batches: usize,
    pub total_tokens: usize,
    pub strategies: BTreeMap<BatchStrategy, usize>,
    pub batches: Vec<BatchSummary>,
    /// Files left out because the batch limit was reached
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deferred: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<BatchWarning>,
}

/// Fully materialized output of the builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPlan {
    pub manifest: BatchManifest,
    pub units: Vec<WorkUnit>,
}

impl BatchPlan {
    /// Look up a work unit by id
    pub fn unit(&self, id: &str) -> Option<&WorkUnit> {
        self.units.iter().find(|u| u.id == id)
    }
}

/// Packs prioritized files into work units
#[derive(Debug, Clone)]
pub struct BatchBuilder {
    budget: BudgetConfig,
    estimator: TokenEstimator,
    trimmer: ContentTrimmer,
    detector: BoundaryDetector,
}

struct Draft {
    strategy: BatchStrategy,
    entries: Vec<WorkUnitEntry>,
    tokens: usize,
    warnings: Vec<BatchWarning>,
}

impl Draft {
    fn new(strategy: BatchStrategy) -> Self {
        Self {
            strategy,
            entries: Vec::new(),
            tokens: 0,
            warnings: Vec::new(),
        }
    }

    fn push(&mut self, entry: WorkUnitEntry) {
        self.tokens += entry.estimated_tokens;
        self.entries.push(entry);
    }
}

impl BatchBuilder {
    pub fn new(budget: &BudgetConfig) -> Self {
        let estimator = TokenEstimator::from_config(budget);
        Self {
            budget: budget.clone(),
            estimator,
            trimmer: ContentTrimmer::new(estimator, budget.high_value_fraction),
            detector: BoundaryDetector::new(estimator),
        }
    }

    pub fn estimator(&self) -> TokenEstimator {
        self.estimator
    }

    /// Files costing less than this are packed into combined batches
    fn small_file_limit(&self) -> usize {
        (self.budget.target_batch_tokens as f64 * self.budget.small_file_ratio) as usize
    }

    /// Read every file under `root` and assemble the plan
    ///
    /// Reads run concurrently and are all joined before assembly starts.
    /// Unreadable and non-UTF-8 files are skipped with a warning.
    #[instrument(skip(self, root, files), fields(root = %root.display(), files = files.len()))]
    pub async fn build(&self, root: &Path, files: &[SourceFile]) -> BatchPlan {
        let (loaded, warnings) = load_contents(root, files).await;
        self.assemble(files.len(), loaded, warnings)
    }

    /// Assemble already loaded `(file, content)` pairs, in priority order
    pub fn assemble(
        &self,
        files_considered: usize,
        loaded: Vec<(SourceFile, String)>,
        mut warnings: Vec<BatchWarning>,
    ) -> BatchPlan {
        let small_limit = self.small_file_limit();
        let max_batches = self.budget.max_batches;

        let mut drafts: Vec<Draft> = Vec::new();
        let mut open_combined: Option<usize> = None;
        let mut deferred: Vec<String> = Vec::new();

        for (file, content) in loaded {
            let cost = self.estimator.estimate(&content);
            if cost == 0 {
                debug!(path = %file.path, "Skipping empty file");
                warnings.push(BatchWarning::new(
                    WarningKind::Empty,
                    file.path.clone(),
                    "file is empty, nothing to document",
                ));
                continue;
            }

            if cost < small_limit {
                let fits_open = open_combined
                    .map(|idx| drafts[idx].tokens + cost <= self.budget.target_batch_tokens)
                    .unwrap_or(false);

                let idx = match open_combined {
                    Some(idx) if fits_open => idx,
                    _ => {
                        if drafts.len() >= max_batches {
                            defer(&mut deferred, &mut warnings, &file.path);
                            continue;
                        }
                        drafts.push(Draft::new(BatchStrategy::Combined));
                        open_combined = Some(drafts.len() - 1);
                        drafts.len() - 1
                    }
                };
                drafts[idx].push(self.entry(&file, content, cost, None, None));
            } else if cost <= self.budget.max_file_tokens {
                if drafts.len() >= max_batches {
                    defer(&mut deferred, &mut warnings, &file.path);
                    continue;
                }
                let mut draft = Draft::new(BatchStrategy::Single);
                if cost > self.budget.target_file_tokens {
                    let outcome =
                        self.trimmer
                            .trim(&content, file.language, self.budget.target_file_tokens);
                    let tokens = self.estimator.estimate(&outcome.content);
                    draft.push(self.entry(&file, outcome.content, tokens, None, outcome.report));
                } else {
                    draft.push(self.entry(&file, content, cost, None, None));
                }
                drafts.push(draft);
            } else {
                let mut chunks =
                    self.detector
                        .split(&content, file.language, self.budget.target_file_tokens);
                let remaining = max_batches.saturating_sub(drafts.len());
                let keep = chunks.len().min(self.budget.max_chunks_per_file);
                if keep > remaining {
                    defer(&mut deferred, &mut warnings, &file.path);
                    continue;
                }

                let mut cap_warning = None;
                if chunks.len() > keep {
                    let err = ScribeError::BudgetExceeded {
                        path: file.path.clone(),
                        cost,
                        max: self.budget.target_file_tokens * keep,
                    };
                    let warning = BatchWarning::new(
                        WarningKind::BudgetExceeded,
                        file.path.clone(),
                        format!("{}; kept {} of {} chunks", err, keep, chunks.len()),
                    );
                    warn!(path = %file.path, kept = keep, total = chunks.len(), "Chunk limit reached");
                    chunks.truncate(keep);
                    cap_warning = Some(warning);
                }

                for chunk in chunks {
                    let mut draft = Draft::new(BatchStrategy::Chunked);
                    draft.push(self.entry(
                        &file,
                        chunk.content,
                        chunk.estimated_tokens,
                        Some(chunk.info),
                        None,
                    ));
                    drafts.push(draft);
                }
                if let (Some(warning), Some(last)) = (cap_warning, drafts.last_mut()) {
                    last.warnings.push(warning.clone());
                    warnings.push(warning);
                }
            }
        }

        let units: Vec<WorkUnit> = drafts
            .into_iter()
            .enumerate()
            .map(|(i, draft)| WorkUnit {
                id: format!("batch-{:03}", i + 1),
                index: i + 1,
                strategy: draft.strategy,
                content_hash: WorkUnit::fingerprint(&draft.entries),
                estimated_tokens: draft.tokens,
                entries: draft.entries,
                warnings: draft.warnings,
            })
            .collect();

        let manifest = manifest_for(files_considered, &units, deferred, warnings);
        info!(
            batches = manifest.total_batches,
            included = manifest.files_included,
            deferred = manifest.deferred.len(),
            "Batch plan assembled"
        );

        BatchPlan { manifest, units }
    }

    fn entry(
        &self,
        file: &SourceFile,
        content: String,
        estimated_tokens: usize,
        chunk: Option<ChunkInfo>,
        trim: Option<TrimReport>,
    ) -> WorkUnitEntry {
        let mut hint = file.category.processing_hint();
        if let Some(info) = &chunk {
            hint.push_str(&format!(
                ". This is {} of {}; document only what appears here and note references to other chunks",
                info, file.path
            ));
        }
        if let Some(report) = &trim {
            hint.push_str(&format!(
                ". Content was trimmed ({}), so describe omitted bodies from their signatures",
                report.strategy
            ));
        }

        WorkUnitEntry {
            path: file.path.clone(),
            category: file.category,
            language: file.language,
            importance: file.importance,
            content,
            estimated_tokens,
            chunk,
            trim,
            processing_hint: hint,
        }
    }
}

fn defer(deferred: &mut Vec<String>, warnings: &mut Vec<BatchWarning>, path: &str) {
    warn!(path, "Batch limit reached, deferring file");
    deferred.push(path.to_string());
    warnings.push(BatchWarning::new(
        WarningKind::Deferred,
        path,
        "batch limit reached",
    ));
}

fn manifest_for(
    files_considered: usize,
    units: &[WorkUnit],
    deferred: Vec<String>,
    warnings: Vec<BatchWarning>,
) -> BatchManifest {
    let mut strategies: BTreeMap<BatchStrategy, usize> = BTreeMap::new();
    let mut included: BTreeSet<&str> = BTreeSet::new();
    for unit in units {
        *strategies.entry(unit.strategy).or_default() += 1;
        included.extend(unit.entries.iter().map(|e| e.path.as_str()));
    }

    BatchManifest {
        run_id: Uuid::new_v4(),
        created_at: Utc::now(),
        files_considered,
        files_included: included.len(),
        total_batches: units.len(),
        total_tokens: units.iter().map(|u| u.estimated_tokens).sum(),
        strategies,
        batches: units
            .iter()
            .map(|u| BatchSummary {
                id: u.id.clone(),
                strategy: u.strategy,
                files: u.files(),
                estimated_tokens: u.estimated_tokens,
                chunk: u.chunk().cloned(),
            })
            .collect(),
        deferred,
        warnings,
    }
}

/// Read all files concurrently, returning them in input order
async fn load_contents(
    root: &Path,
    files: &[SourceFile],
) -> (Vec<(SourceFile, String)>, Vec<BatchWarning>) {
    let permits = Arc::new(Semaphore::new(MAX_CONCURRENT_READS));
    let mut set = JoinSet::new();

    for (idx, file) in files.iter().enumerate() {
        let path = root.join(&file.path);
        let permits = permits.clone();
        set.spawn(async move {
            let _permit = permits.acquire_owned().await;
            let result = match tokio::fs::read(&path).await {
                Ok(bytes) => String::from_utf8(bytes).map_err(|_| "not valid UTF-8".to_string()),
                Err(e) => Err(e.to_string()),
            };
            (idx, result)
        });
    }

    let mut slots: Vec<Option<String>> = vec![None; files.len()];
    let mut finished = vec![false; files.len()];
    let mut join_errors = Vec::new();
    let mut warnings = Vec::new();

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, result)) => {
                finished[idx] = true;
                match result {
                    Ok(content) => slots[idx] = Some(content),
                    Err(message) => {
                        let path = &files[idx].path;
                        warn!(path = %path, error = %message, "Skipping unreadable file");
                        warnings.push(BatchWarning::from_error(&ScribeError::scan(path, message)));
                    }
                }
            }
            Err(e) => join_errors.push(e.to_string()),
        }
    }
    warnings.extend(unfinished_reads(files, &finished, join_errors));

    // Reads complete out of order; zipping with the input restores priority order
    let loaded = files
        .iter()
        .cloned()
        .zip(slots)
        .filter_map(|(file, content)| content.map(|c| (file, c)))
        .collect();

    warnings.sort_by(|a, b| a.path.cmp(&b.path));
    (loaded, warnings)
}

/// Warnings naming the files whose read task panicked or was cancelled
///
/// A join error does not carry the index of its task, so each file that
/// never reported back is paired with one of the collected errors.
fn unfinished_reads(
    files: &[SourceFile],
    finished: &[bool],
    join_errors: Vec<String>,
) -> Vec<BatchWarning> {
    let mut errors = join_errors.into_iter();
    files
        .iter()
        .zip(finished)
        .filter(|(_, done)| !**done)
        .map(|(file, _)| {
            let message = errors
                .next()
                .unwrap_or_else(|| "read task did not finish".to_string());
            warn!(path = %file.path, error = %message, "File read task failed");
            BatchWarning::new(WarningKind::Unreadable, file.path.clone(), message)
        })
        .collect()
}
