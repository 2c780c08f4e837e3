//! Configuration management for Scribe
//!
//! This module provides configuration structures for project-level Scribe settings,
//! including scan exclusions, token budgets, validation thresholds and output layout.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::{Result, ScribeError};

/// Directory holding Scribe state inside a project
pub const STATE_DIR: &str = ".scribe";

/// Project-level Scribe configuration
///
/// Loaded from `.scribe/config.toml` in the project root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScribeConfig {
    /// Tree walking and exclusions
    #[serde(default)]
    pub scan: ScanConfig,

    /// Token budgets for files and batches
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Output validation thresholds
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Where generated documentation goes
    #[serde(default)]
    pub output: OutputConfig,

    /// Per-path task priority overrides
    #[serde(default)]
    pub priority_overrides: BTreeMap<String, i32>,
}

/// Tree walking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Maximum directory depth below the root
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Glob patterns matched against every path segment
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,

    /// Extensionless file names recognized in addition to README/CHANGELOG
    #[serde(default)]
    pub extra_filenames: Vec<String>,
}

/// Token budget configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Characters per estimated token
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,

    /// Comfortable batch size the builder aims for
    #[serde(default = "default_target_batch_tokens")]
    pub target_batch_tokens: usize,

    /// Hard ceiling for any batch
    #[serde(default = "default_max_batch_tokens")]
    pub max_batch_tokens: usize,

    /// Size a medium file is trimmed down to, and the chunk size for large files
    #[serde(default = "default_target_file_tokens")]
    pub target_file_tokens: usize,

    /// Files above this are chunked instead of trimmed
    #[serde(default = "default_max_file_tokens")]
    pub max_file_tokens: usize,

    /// Files below `small_file_ratio * target_batch_tokens` are packed together
    #[serde(default = "default_small_file_ratio")]
    pub small_file_ratio: f64,

    /// Share of the trim budget reserved for high-value lines
    #[serde(default = "default_high_value_fraction")]
    pub high_value_fraction: f64,

    /// Maximum number of batches in one plan
    #[serde(default = "default_max_batches")]
    pub max_batches: usize,

    /// Maximum number of chunks kept for a single file
    #[serde(default = "default_max_chunks_per_file")]
    pub max_chunks_per_file: usize,
}

/// Output validation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Minimum aggregate score, in percent
    #[serde(default = "default_min_score_percent")]
    pub min_score_percent: f64,

    /// Documents shorter than this are considered trivial
    #[serde(default = "default_min_document_chars")]
    pub min_document_chars: usize,

    /// Minimum number of markdown headings in a document
    #[serde(default = "default_min_headings")]
    pub min_headings: usize,
}

/// Output layout configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory (relative to the root) receiving generated documents
    #[serde(default = "default_docs_dir")]
    pub docs_dir: String,

    /// Extension of generated documents
    #[serde(default = "default_extension")]
    pub extension: String,
}

// Default value providers
fn default_max_depth() -> usize {
    6
}

fn default_exclude() -> Vec<String> {
    [
        ".git",
        ".hg",
        ".svn",
        ".jj",
        STATE_DIR,
        "node_modules",
        "target",
        "dist",
        "build",
        "out",
        "vendor",
        "coverage",
        "__pycache__",
        ".venv",
        "venv",
        ".idea",
        ".vscode",
        ".next",
        "*.log",
        "*.lock",
        "*.min.js",
        "*.min.css",
        "*.map",
        "package-lock.json",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_chars_per_token() -> usize {
    4
}

fn default_target_batch_tokens() -> usize {
    8_000
}

fn default_max_batch_tokens() -> usize {
    12_000
}

fn default_target_file_tokens() -> usize {
    6_000
}

fn default_max_file_tokens() -> usize {
    10_000
}

fn default_small_file_ratio() -> f64 {
    0.5
}

fn default_high_value_fraction() -> f64 {
    0.8
}

fn default_max_batches() -> usize {
    500
}

fn default_max_chunks_per_file() -> usize {
    16
}

fn default_min_score_percent() -> f64 {
    70.0
}

fn default_min_document_chars() -> usize {
    200
}

fn default_min_headings() -> usize {
    1
}

fn default_docs_dir() -> String {
    "docs".to_string()
}

fn default_extension() -> String {
    "md".to_string()
}

impl ScribeConfig {
    /// Path of the config file for a project root
    pub fn config_path(root: &Path) -> PathBuf {
        root.join(STATE_DIR).join("config.toml")
    }

    /// Load configuration from `.scribe/config.toml` or use defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = Self::config_path(root);

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)
                .map_err(|e| ScribeError::Config(format!("Failed to parse config file: {}", e)))?
        } else {
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Write default configuration to `.scribe/config.toml`
    pub fn write_default(root: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(root.join(STATE_DIR))?;

        let config_path = Self::config_path(root);
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| ScribeError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }

    /// Reject budgets that cannot be satisfied together
    pub fn validate(&self) -> Result<()> {
        let b = &self.budget;
        if b.chars_per_token == 0 {
            return Err(ScribeError::Config("chars_per_token must be positive".into()));
        }
        if b.target_batch_tokens == 0 || b.target_file_tokens == 0 {
            return Err(ScribeError::Config("token targets must be positive".into()));
        }
        if b.target_batch_tokens > b.max_batch_tokens {
            return Err(ScribeError::Config(format!(
                "target_batch_tokens ({}) exceeds max_batch_tokens ({})",
                b.target_batch_tokens, b.max_batch_tokens
            )));
        }
        if b.target_file_tokens > b.max_file_tokens {
            return Err(ScribeError::Config(format!(
                "target_file_tokens ({}) exceeds max_file_tokens ({})",
                b.target_file_tokens, b.max_file_tokens
            )));
        }
        if b.max_file_tokens > b.max_batch_tokens {
            return Err(ScribeError::Config(format!(
                "max_file_tokens ({}) exceeds max_batch_tokens ({})",
                b.max_file_tokens, b.max_batch_tokens
            )));
        }
        for (name, ratio) in [
            ("small_file_ratio", b.small_file_ratio),
            ("high_value_fraction", b.high_value_fraction),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(ScribeError::Config(format!(
                    "{} must be in (0, 1], got {}",
                    name, ratio
                )));
            }
        }
        if b.max_batches == 0 || b.max_chunks_per_file == 0 {
            return Err(ScribeError::Config(
                "max_batches and max_chunks_per_file must be positive".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.validation.min_score_percent) {
            return Err(ScribeError::Config(format!(
                "min_score_percent must be within 0-100, got {}",
                self.validation.min_score_percent
            )));
        }
        Ok(())
    }

    /// Priority override for a path, if one is configured
    pub fn priority_override(&self, path: &str) -> Option<i32> {
        self.priority_overrides.get(path).copied()
    }
}

impl Default for ScribeConfig {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            budget: BudgetConfig::default(),
            validation: ValidationConfig::default(),
            output: OutputConfig::default(),
            priority_overrides: BTreeMap::new(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            exclude: default_exclude(),
            extra_filenames: Vec::new(),
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            chars_per_token: default_chars_per_token(),
            target_batch_tokens: default_target_batch_tokens(),
            max_batch_tokens: default_max_batch_tokens(),
            target_file_tokens: default_target_file_tokens(),
            max_file_tokens: default_max_file_tokens(),
            small_file_ratio: default_small_file_ratio(),
            high_value_fraction: default_high_value_fraction(),
            max_batches: default_max_batches(),
            max_chunks_per_file: default_max_chunks_per_file(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_score_percent: default_min_score_percent(),
            min_document_chars: default_min_document_chars(),
            min_headings: default_min_headings(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            docs_dir: default_docs_dir(),
            extension: default_extension(),
        }
    }
}
