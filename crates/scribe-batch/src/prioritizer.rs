//! Source tree scanning, classification and ranking

use chrono::{DateTime, Utc};
use glob::Pattern;
use scribe_core::{Category, Language, Result, ScanConfig, ScribeError, SourceFile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, instrument, warn};
use walkdir::{DirEntry, WalkDir};

use crate::warning::BatchWarning;

const BASE_IMPORTANCE: i32 = 50;
const DEPTH_PENALTY: i32 = 5;
const TINY_FILE_BYTES: u64 = 100;
const HUGE_FILE_BYTES: u64 = 100 * 1024;

/// Stems that mark an entry point on their own
const ENTRY_STEMS: &[&str] = &[
    "main", "index", "app", "server", "lib", "__main__", "__init__", "cli", "program",
    "bootstrap",
];
const ENTRY_DIRS: &[&str] = &["bin", "cmd"];

/// Keyword table checked in order after entry points
const KEYWORDS: &[(Category, &[&str], &[&str])] = &[
    (
        Category::Config,
        &[
            "config", "configuration", "settings", "setup", "env", "constants", "conf",
            "dockerfile", "makefile",
        ],
        &["config", "configs", "settings", "conf"],
    ),
    (
        Category::Route,
        &["route", "routes", "router", "routing", "urls", "endpoint", "endpoints"],
        &["routes", "routers", "api", "endpoints"],
    ),
    (
        Category::Controller,
        &["controller", "controllers", "handler", "handlers", "view", "views", "resolver"],
        &["controllers", "handlers", "views", "resolvers"],
    ),
    (
        Category::Service,
        &["service", "services", "provider", "manager", "client", "repository", "repo"],
        &["services", "providers", "repositories"],
    ),
    (
        Category::Model,
        &["model", "models", "schema", "schemas", "entity", "entities", "dto", "types"],
        &["models", "schemas", "entities", "domain"],
    ),
    (
        Category::Component,
        &["component", "components", "widget", "page", "layout", "screen"],
        &["components", "widgets", "pages", "layouts", "ui"],
    ),
    (
        Category::Utility,
        &["util", "utils", "utility", "utilities", "helper", "helpers", "common", "shared"],
        &["util", "utils", "helpers", "lib", "common", "shared"],
    ),
    (
        Category::Test,
        &["test", "tests", "spec", "specs", "e2e", "fixture", "fixtures", "mock", "mocks"],
        &["test", "tests", "spec", "__tests__", "testing"],
    ),
];

/// Result of scanning a project tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    /// Files sorted by importance, then category order, then path
    pub files: Vec<SourceFile>,
    pub by_category: BTreeMap<Category, Vec<String>>,
    pub by_language: BTreeMap<Language, Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<BatchWarning>,
}

impl ScanReport {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn from_files(mut files: Vec<SourceFile>, warnings: Vec<BatchWarning>) -> Self {
        sort_by_priority(&mut files);

        let mut by_category: BTreeMap<Category, Vec<String>> = BTreeMap::new();
        let mut by_language: BTreeMap<Language, Vec<String>> = BTreeMap::new();
        for file in &files {
            by_category
                .entry(file.category)
                .or_default()
                .push(file.path.clone());
            by_language
                .entry(file.language)
                .or_default()
                .push(file.path.clone());
        }

        Self {
            files,
            by_category,
            by_language,
            warnings,
        }
    }
}

/// Sort files by importance descending, then category order, then path
pub fn sort_by_priority(files: &mut [SourceFile]) {
    files.sort_by(|a, b| {
        b.importance
            .cmp(&a.importance)
            .then_with(|| a.category.order().cmp(&b.category.order()))
            .then_with(|| a.path.cmp(&b.path))
    });
}

/// Walks a project tree and ranks the files worth documenting
#[derive(Debug, Clone)]
pub struct FilePrioritizer {
    max_depth: usize,
    exclusions: Vec<Pattern>,
    extra_filenames: Vec<String>,
}

impl FilePrioritizer {
    /// Compile the exclusion patterns of a scan configuration
    pub fn new(config: &ScanConfig) -> Result<Self> {
        let exclusions = config
            .exclude
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    ScribeError::Config(format!("Invalid exclusion pattern '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            max_depth: config.max_depth,
            exclusions,
            extra_filenames: config
                .extra_filenames
                .iter()
                .map(|n| n.to_lowercase())
                .collect(),
        })
    }

    /// Add one more exclusion, such as the generated documentation directory
    pub fn with_exclusion(mut self, pattern: &str) -> Result<Self> {
        let compiled = Pattern::new(pattern).map_err(|e| {
            ScribeError::Config(format!("Invalid exclusion pattern '{}': {}", pattern, e))
        })?;
        self.exclusions.push(compiled);
        Ok(self)
    }

    fn is_excluded(&self, relative: &str, name: &str) -> bool {
        self.exclusions.iter().any(|pattern| {
            if pattern.as_str().contains('/') {
                pattern.matches(relative)
            } else {
                pattern.matches(name)
            }
        })
    }

    fn language_of(&self, relative: &str, name: &str) -> Option<Language> {
        Language::from_path(relative).or_else(|| {
            self.extra_filenames
                .contains(&name.to_lowercase())
                .then_some(Language::Text)
        })
    }

    /// Scan `root` and return every recognized file, ranked
    ///
    /// Unreadable entries below the root become warnings. Only an unreadable
    /// root is fatal.
    #[instrument(skip(self, root), fields(root = %root.display()))]
    pub fn scan(&self, root: &Path) -> Result<ScanReport> {
        std::fs::read_dir(root).map_err(|e| ScribeError::RootUnreadable {
            path: root.display().to_string(),
            message: e.to_string(),
        })?;

        let mut files = Vec::new();
        let mut warnings = Vec::new();

        let walker = WalkDir::new(root)
            .max_depth(self.max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.entry_excluded(root, entry));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(|p| relative_path(root, p))
                        .unwrap_or_default();
                    warn!(path = %path, error = %err, "Skipping unreadable entry");
                    warnings.push(BatchWarning::from_error(&ScribeError::scan(path, &err)));
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let relative = relative_path(root, entry.path());
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(language) = self.language_of(&relative, &name) else {
                continue;
            };

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!(path = %relative, error = %err, "Skipping file without metadata");
                    warnings.push(BatchWarning::from_error(&ScribeError::scan(&relative, &err)));
                    continue;
                }
            };

            let size_bytes = metadata.len();
            let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
            let depth = entry.depth().saturating_sub(1);
            let category = classify(&relative, language);
            let importance = importance(&relative, category, size_bytes, depth);

            files.push(SourceFile {
                path: relative,
                size_bytes,
                modified,
                category,
                language,
                importance,
                depth,
            });
        }

        let report = ScanReport::from_files(files, warnings);
        info!(
            files = report.files.len(),
            warnings = report.warnings.len(),
            "Scan complete"
        );
        Ok(report)
    }

    fn entry_excluded(&self, root: &Path, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        let relative = relative_path(root, entry.path());
        let excluded = self.is_excluded(&relative, &name);
        if excluded {
            debug!(path = %relative, "Excluded");
        }
        excluded
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn stem_tokens(stem: &str) -> Vec<String> {
    stem.split(['.', '_', '-'])
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn keyword_matches(stem_lower: &str, tokens: &[String], keyword: &str) -> bool {
    tokens.iter().any(|t| t == keyword)
        || (keyword.len() >= 5 && stem_lower.ends_with(keyword))
}

/// Assign a category from the file name and its directories
///
/// Data formats are configuration regardless of name. Otherwise entry
/// points are recognized first, then the keyword table in order.
pub fn classify(path: &str, language: Language) -> Category {
    if language.is_config_format() {
        return Category::Config;
    }

    let segments: Vec<&str> = path.split('/').collect();
    let (dirs, file_name) = segments.split_at(segments.len().saturating_sub(1));
    let file_name = file_name.first().copied().unwrap_or(path);
    let stem = match file_name.split_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    let stem_lower = stem.to_lowercase();
    let tokens = stem_tokens(stem);
    let dirs: Vec<String> = dirs.iter().map(|d| d.to_lowercase()).collect();

    if ENTRY_STEMS.contains(&stem_lower.as_str())
        || dirs.iter().any(|d| ENTRY_DIRS.contains(&d.as_str()))
    {
        return Category::Entry;
    }

    for (category, names, dir_names) in KEYWORDS {
        let name_hit = names
            .iter()
            .any(|k| keyword_matches(&stem_lower, &tokens, k));
        let dir_hit = dirs.iter().any(|d| dir_names.contains(&d.as_str()));
        if name_hit || dir_hit {
            return *category;
        }
    }

    Category::Other
}

/// Importance score: higher is more important, clamped to 0..=100
pub fn importance(path: &str, category: Category, size_bytes: u64, depth: usize) -> i32 {
    let mut score = BASE_IMPORTANCE;

    score += match category {
        Category::Entry => 30,
        Category::Config => 20,
        Category::Route | Category::Controller | Category::Service => 10,
        Category::Model => 8,
        Category::Component => 5,
        Category::Utility => 3,
        Category::Test => -10,
        Category::Other => 0,
    };

    let file_name = path.rsplit('/').next().unwrap_or(path).to_uppercase();
    if file_name.starts_with("README") {
        score += 15;
    }

    score -= DEPTH_PENALTY * depth.min(i32::MAX as usize) as i32;

    if size_bytes < TINY_FILE_BYTES {
        score -= 15;
    } else if size_bytes > HUGE_FILE_BYTES {
        score -= 10;
    }

    score.clamp(0, 100)
}
