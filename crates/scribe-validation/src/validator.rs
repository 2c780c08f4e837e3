//! Output validator
//!
//! Runs the checklist for a task's kind against the outputs an agent claims
//! to have produced and decides whether the task may complete.

use scribe_core::{Task, TaskKind, ValidationConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::checks::{self, CheckResult, ValidationCheck};

/// Checklist applied to a task kind, in execution order
pub fn checklist_for(kind: TaskKind) -> &'static [ValidationCheck] {
    match kind {
        TaskKind::FileProcessing | TaskKind::ModuleCreation => &[
            ValidationCheck::OutputsExist,
            ValidationCheck::MatchesExpected,
            ValidationCheck::DocumentStructure,
            ValidationCheck::SourceCoverage,
        ],
        TaskKind::Analysis | TaskKind::Summary => &[
            ValidationCheck::OutputsExist,
            ValidationCheck::MatchesExpected,
            ValidationCheck::DocumentStructure,
        ],
    }
}

/// Human-readable checklist delivered with a task
pub fn checklist_text(kind: TaskKind, config: &ValidationConfig) -> Vec<String> {
    let mut items: Vec<String> = checklist_for(kind)
        .iter()
        .map(|check| match check {
            ValidationCheck::OutputsExist => {
                "Every output path you submit exists, relative to the project root".to_string()
            }
            ValidationCheck::MatchesExpected => {
                "Outputs are named to match the expected output patterns".to_string()
            }
            ValidationCheck::DocumentStructure => format!(
                "Each document has at least {} heading(s) and {} characters, with no placeholders",
                config.min_headings, config.min_document_chars
            ),
            ValidationCheck::SourceCoverage => {
                "Each source file is mentioned by name in the documentation".to_string()
            }
            ValidationCheck::CodeQuality => {
                "Code samples carry comments and error handling".to_string()
            }
        })
        .collect();
    items.push(format!(
        "Overall score of at least {}%",
        config.min_score_percent
    ));
    items
}

/// Aggregate result of validating one submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub task_id: String,
    pub passed: bool,
    pub score: f64,
    pub max_score: f64,
    /// `score / max_score` in percent
    pub percentage: f64,
    pub checks: Vec<CheckResult>,
    /// Remediation guidance, empty when the submission passed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl ValidationResult {
    /// Every issue reported by any check
    pub fn issues(&self) -> Vec<String> {
        self.checks
            .iter()
            .flat_map(|c| c.issues.iter().cloned())
            .collect()
    }

    pub fn check(&self, check: ValidationCheck) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.check == check)
    }
}

/// Validates claimed outputs on disk
#[derive(Debug, Clone)]
pub struct Validator {
    root: PathBuf,
    config: ValidationConfig,
}

impl Validator {
    pub fn new(root: impl Into<PathBuf>, config: ValidationConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate `outputs` (paths relative to the root) for `task`
    ///
    /// Deterministic and read-only: the same files on disk always produce
    /// the same result.
    #[instrument(skip(self, task, outputs), fields(task_id = %task.id, outputs = outputs.len()))]
    pub fn validate(&self, task: &Task, outputs: &[String]) -> ValidationResult {
        let resolved = checks::resolve_outputs(&self.root, outputs);

        let mut results: Vec<CheckResult> = checklist_for(task.kind())
            .iter()
            .map(|check| match check {
                ValidationCheck::OutputsExist => checks::outputs_exist(&resolved),
                ValidationCheck::MatchesExpected => {
                    checks::matches_expected(&resolved, &task.expected_outputs)
                }
                ValidationCheck::DocumentStructure => {
                    checks::document_structure(&resolved, &self.config)
                }
                ValidationCheck::SourceCoverage => {
                    checks::source_coverage(&resolved, task.payload.source_files())
                }
                ValidationCheck::CodeQuality => checks::code_quality(&resolved),
            })
            .collect();

        if resolved.iter().any(|o| o.is_usable() && o.is_code()) {
            results.push(checks::code_quality(&resolved));
        }

        let score: f64 = results.iter().map(|c| c.score).sum();
        let max_score: f64 = results.iter().map(|c| c.max_score).sum();
        let percentage = if max_score > 0.0 {
            (score / max_score * 10_000.0).round() / 100.0
        } else {
            0.0
        };
        let blocked = results.iter().any(|c| c.blocking && !c.passed);
        let passed = !blocked && percentage >= self.config.min_score_percent;

        let suggestions = if passed {
            Vec::new()
        } else {
            self.suggestions(task, &results, percentage)
        };

        debug!(passed, percentage, blocked, "Validated outputs");

        ValidationResult {
            task_id: task.id.clone(),
            passed,
            score,
            max_score,
            percentage,
            checks: results,
            suggestions,
        }
    }

    fn suggestions(&self, task: &Task, results: &[CheckResult], percentage: f64) -> Vec<String> {
        let mut suggestions: Vec<String> = results
            .iter()
            .filter(|c| !c.passed)
            .map(|c| match c.check {
                ValidationCheck::OutputsExist => format!(
                    "Write the missing files under {} and resubmit their paths relative to it",
                    self.root.display()
                ),
                ValidationCheck::MatchesExpected => format!(
                    "Name outputs to match: {}",
                    task.expected_outputs
                        .iter()
                        .map(|e| e.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                ValidationCheck::DocumentStructure => format!(
                    "Give every document at least {} heading(s) and {} characters of real content",
                    self.config.min_headings, self.config.min_document_chars
                ),
                ValidationCheck::SourceCoverage => {
                    "Mention each documented source file by name".to_string()
                }
                ValidationCheck::CodeQuality => {
                    "Add explanatory comments and error handling to code outputs".to_string()
                }
            })
            .collect();

        if percentage < self.config.min_score_percent {
            suggestions.push(format!(
                "Score {:.1}% is below the required {:.1}%",
                percentage, self.config.min_score_percent
            ));
        }
        suggestions.push(format!(
            "Reset the task with `scribe reset {}` once the issues are fixed",
            task.id
        ));
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::{Dependency, ExpectedOutput, TaskPayload};
    use tempfile::TempDir;

    fn file_task() -> Task {
        Task::new(
            "fp-0001-src-user-service-rs",
            "Document src/user_service.rs",
            TaskPayload::FileProcessing {
                batch_id: "batch-001".to_string(),
                files: vec!["src/user_service.rs".to_string()],
                chunk: None,
                estimated_tokens: 400,
            },
            Dependency::None,
        )
        .with_expected_outputs(vec![ExpectedOutput::Pattern(
            "docs/**/user_service*.md".to_string(),
        )])
    }

    fn good_doc() -> String {
        format!(
            "# user_service\n\n## Overview\n\n{}\n\n## Errors\n\nReturns an error when the account is missing.\n",
            "The user_service module creates and updates accounts. ".repeat(6)
        )
    }

    #[test]
    fn test_missing_output_fails_below_threshold() {
        let dir = TempDir::new().unwrap();
        let validator = Validator::new(dir.path(), ValidationConfig::default());

        let result = validator.validate(&file_task(), &["docs/src/user_service.md".to_string()]);
        assert!(!result.passed);
        assert!(result.percentage < 70.0);
        assert!(result
            .issues()
            .iter()
            .any(|i| i.contains("docs/src/user_service.md")));
        assert!(!result.suggestions.is_empty());
    }

    #[test]
    fn test_good_output_passes() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("docs/src")).unwrap();
        std::fs::write(dir.path().join("docs/src/user_service.md"), good_doc()).unwrap();

        let validator = Validator::new(dir.path(), ValidationConfig::default());
        let result = validator.validate(&file_task(), &["docs/src/user_service.md".to_string()]);
        assert!(result.passed, "{:?}", result.issues());
        assert_eq!(result.percentage, 100.0);
        assert!(result.suggestions.is_empty());
    }

    #[test]
    fn test_blocking_failure_overrides_score() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/user_service.md"), good_doc()).unwrap();

        let config = ValidationConfig {
            min_score_percent: 10.0,
            ..ValidationConfig::default()
        };
        let validator = Validator::new(dir.path(), config);
        let result = validator.validate(
            &file_task(),
            &[
                "docs/user_service.md".to_string(),
                "docs/not_written.md".to_string(),
            ],
        );
        assert!(result.percentage >= 10.0);
        assert!(!result.passed);
        assert!(result.check(ValidationCheck::OutputsExist).unwrap().blocking);
    }

    #[test]
    fn test_validation_is_repeatable() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/user_service.md"), "# short\n").unwrap();

        let validator = Validator::new(dir.path(), ValidationConfig::default());
        let outputs = vec!["docs/user_service.md".to_string()];
        let first = validator.validate(&file_task(), &outputs);
        let second = validator.validate(&file_task(), &outputs);
        assert_eq!(first, second);
    }

    #[test]
    fn test_code_outputs_add_quality_check() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/user_service.md"), good_doc()).unwrap();
        std::fs::write(dir.path().join("docs/user_service_example.rs"), "fn main() {}\n").unwrap();

        let validator = Validator::new(dir.path(), ValidationConfig::default());
        let result = validator.validate(
            &file_task(),
            &[
                "docs/user_service.md".to_string(),
                "docs/user_service_example.rs".to_string(),
            ],
        );
        let quality = result.check(ValidationCheck::CodeQuality).unwrap();
        assert!(!quality.passed);
        assert_eq!(result.max_score, 120.0);
    }

    #[test]
    fn test_result_serializes_check_names() {
        let dir = TempDir::new().unwrap();
        let validator = Validator::new(dir.path(), ValidationConfig::default());
        let result = validator.validate(&file_task(), &[]);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["passed"], false);
        assert_eq!(json["checks"][0]["check"], "outputs-exist");
        assert_eq!(json["checks"][0]["blocking"], true);
    }

    #[test]
    fn test_checklist_text_mentions_threshold() {
        let items = checklist_text(TaskKind::Summary, &ValidationConfig::default());
        assert_eq!(items.len(), 4);
        assert!(items.last().unwrap().contains("70"));
    }
}
