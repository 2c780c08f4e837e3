//! Individual output checks
//!
//! Each check inspects artifacts already on disk and returns a scored
//! [`CheckResult`]. Checks never mutate anything.

use regex::Regex;
use scribe_core::{normalize_path, ExpectedOutput, Language, ValidationConfig};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};
use std::sync::LazyLock;

static MARKDOWN_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^#{1,6}\s+\S").expect("heading pattern should compile")
});

static SETEXT_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\S.*\n(?:=+|-+)\s*$").expect("setext pattern should compile")
});

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:lorem ipsum|TBD|to be written|placeholder text)\b")
        .expect("placeholder pattern should compile")
});

static COMMENT_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*(?://|#(?:\s|$)|/\*|\*\s|--\s|"""|<!--)"#)
        .expect("comment pattern should compile")
});

static ERROR_HANDLING_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:try|catch|except|finally|raise|throw|throws|Result<|Err\(|Error|error|panic!|rescue|recover)\b|\?;",
    )
    .expect("error handling pattern should compile")
});

/// Kinds of output checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationCheck {
    /// Every claimed output exists under the project root
    OutputsExist,
    /// Claimed outputs cover the task's expected outputs
    MatchesExpected,
    /// Documents have headings and non-trivial length
    DocumentStructure,
    /// Documents mention the source files they describe
    SourceCoverage,
    /// Code outputs carry comments and error handling
    CodeQuality,
}

impl ValidationCheck {
    /// Maximum score this check contributes
    pub fn max_score(&self) -> f64 {
        match self {
            Self::OutputsExist => 40.0,
            Self::MatchesExpected => 20.0,
            Self::DocumentStructure => 25.0,
            Self::SourceCoverage => 15.0,
            Self::CodeQuality => 20.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OutputsExist => "outputs-exist",
            Self::MatchesExpected => "matches-expected",
            Self::DocumentStructure => "document-structure",
            Self::SourceCoverage => "source-coverage",
            Self::CodeQuality => "code-quality",
        }
    }
}

impl std::fmt::Display for ValidationCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Outcome of a single check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: ValidationCheck,
    pub passed: bool,
    /// A failed blocking check fails validation regardless of score
    pub blocking: bool,
    pub score: f64,
    pub max_score: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

impl CheckResult {
    fn scored(check: ValidationCheck, fraction: f64, issues: Vec<String>) -> Self {
        let max_score = check.max_score();
        Self {
            check,
            passed: issues.is_empty(),
            blocking: false,
            score: (fraction.clamp(0.0, 1.0) * max_score * 100.0).round() / 100.0,
            max_score,
            issues,
        }
    }
}

/// A claimed output resolved against the project root
#[derive(Debug, Clone)]
pub struct ResolvedOutput {
    /// Normalized relative path as claimed
    pub path: String,
    /// File content, when the file exists and is readable text
    pub content: Option<String>,
    /// Why the output could not be used
    pub problem: Option<String>,
}

impl ResolvedOutput {
    pub fn is_usable(&self) -> bool {
        self.content.is_some()
    }

    fn extension(&self) -> Option<&str> {
        let name = self.path.rsplit('/').next().unwrap_or(&self.path);
        name.rsplit_once('.').map(|(_, ext)| ext)
    }

    /// Documentation outputs (markdown, text)
    pub fn is_document(&self) -> bool {
        matches!(
            self.extension().map(|e| e.to_lowercase()).as_deref(),
            Some("md" | "markdown" | "mdx" | "txt" | "rst" | "adoc")
        )
    }

    /// Code outputs such as examples or generated stubs
    pub fn is_code(&self) -> bool {
        self.extension()
            .and_then(Language::from_extension)
            .map(|l| l.is_code())
            .unwrap_or(false)
    }
}

/// Whether a relative path stays inside the root it is joined to
fn stays_inside_root(path: &str) -> bool {
    let path = Path::new(path);
    !path.is_absolute()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Whether `full`, with symlinks followed, still lives under `root`
fn resolves_inside_root(root: &Path, full: &Path) -> bool {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    full.canonicalize()
        .map(|target| target.starts_with(&root))
        .unwrap_or(false)
}

/// Resolve claimed paths to files under `root`
pub fn resolve_outputs(root: &Path, claimed: &[String]) -> Vec<ResolvedOutput> {
    let mut seen = std::collections::BTreeSet::new();
    claimed
        .iter()
        .map(|raw| normalize_path(raw.trim()))
        .filter(|p| !p.is_empty() && seen.insert(p.clone()))
        .map(|path| {
            if !stays_inside_root(&path) {
                return ResolvedOutput {
                    problem: Some(format!("Output path escapes the project root: {}", path)),
                    path,
                    content: None,
                };
            }
            let full = root.join(&path);
            let (content, problem) = if !full.is_file() {
                (None, Some(format!("Output file does not exist: {}", path)))
            } else if !resolves_inside_root(root, &full) {
                (
                    None,
                    Some(format!("Output path escapes the project root: {}", path)),
                )
            } else {
                match std::fs::read_to_string(&full) {
                    Ok(text) if text.trim().is_empty() => {
                        (None, Some(format!("Output file is empty: {}", path)))
                    }
                    Ok(text) => (Some(text), None),
                    Err(e) => (None, Some(format!("Output file is unreadable: {}: {}", path, e))),
                }
            };
            ResolvedOutput {
                path,
                content,
                problem,
            }
        })
        .collect()
}

pub fn outputs_exist(outputs: &[ResolvedOutput]) -> CheckResult {
    let check = ValidationCheck::OutputsExist;
    if outputs.is_empty() {
        let mut result =
            CheckResult::scored(check, 0.0, vec!["No output files were submitted".to_string()]);
        result.blocking = true;
        return result;
    }

    let usable = outputs.iter().filter(|o| o.is_usable()).count();
    let issues: Vec<String> = outputs.iter().filter_map(|o| o.problem.clone()).collect();
    let mut result = CheckResult::scored(check, usable as f64 / outputs.len() as f64, issues);
    result.blocking = !result.passed;
    result
}

pub fn matches_expected(outputs: &[ResolvedOutput], expected: &[ExpectedOutput]) -> CheckResult {
    let check = ValidationCheck::MatchesExpected;
    if expected.is_empty() {
        return CheckResult::scored(check, 1.0, Vec::new());
    }

    let usable: Vec<&ResolvedOutput> = outputs.iter().filter(|o| o.is_usable()).collect();
    let missing: Vec<&ExpectedOutput> = expected
        .iter()
        .filter(|descriptor| !usable.iter().any(|o| descriptor.matches(&o.path)))
        .collect();
    let matched = expected.len() - missing.len();

    let issues = missing
        .iter()
        .map(|d| format!("No submitted output matches expected '{}'", d))
        .collect();
    let mut result = CheckResult::scored(check, matched as f64 / expected.len() as f64, issues);
    result.blocking = matched == 0;
    result
}

fn heading_count(text: &str) -> usize {
    MARKDOWN_HEADING.find_iter(text).count() + SETEXT_HEADING.find_iter(text).count()
}

pub fn document_structure(outputs: &[ResolvedOutput], config: &ValidationConfig) -> CheckResult {
    let check = ValidationCheck::DocumentStructure;
    let documents: Vec<(&str, &str)> = outputs
        .iter()
        .filter(|o| o.is_document())
        .filter_map(|o| o.content.as_deref().map(|c| (o.path.as_str(), c)))
        .collect();

    if documents.is_empty() {
        return CheckResult::scored(
            check,
            0.0,
            vec!["No readable documentation outputs to inspect".to_string()],
        );
    }

    let mut issues = Vec::new();
    let mut total = 0.0;
    for (path, text) in &documents {
        let mut doc_score = 0.0;

        let headings = heading_count(text);
        if headings >= config.min_headings {
            doc_score += 0.4;
        } else {
            issues.push(format!(
                "{} has {} heading(s), expected at least {}",
                path, headings, config.min_headings
            ));
        }

        let chars = text.trim().chars().count();
        if chars >= config.min_document_chars {
            doc_score += 0.4;
        } else {
            issues.push(format!(
                "{} is {} characters long, expected at least {}",
                path, chars, config.min_document_chars
            ));
        }

        if PLACEHOLDER.is_match(text) {
            issues.push(format!("{} contains placeholder text", path));
        } else {
            doc_score += 0.2;
        }

        total += doc_score;
    }

    CheckResult::scored(check, total / documents.len() as f64, issues)
}

pub fn source_coverage(outputs: &[ResolvedOutput], sources: &[String]) -> CheckResult {
    let check = ValidationCheck::SourceCoverage;
    if sources.is_empty() {
        return CheckResult::scored(check, 1.0, Vec::new());
    }

    let combined: String = outputs
        .iter()
        .filter_map(|o| o.content.as_deref())
        .collect::<Vec<_>>()
        .join("\n")
        .to_lowercase();

    let missing: Vec<&String> = sources
        .iter()
        .filter(|source| {
            let name = source.rsplit('/').next().unwrap_or(source).to_lowercase();
            let stem = name.split('.').next().unwrap_or(&name).to_string();
            !(combined.contains(&name) || (!stem.is_empty() && combined.contains(&stem)))
        })
        .collect();

    let issues = missing
        .iter()
        .map(|s| format!("Outputs never mention source file {}", s))
        .collect();
    let covered = sources.len() - missing.len();
    CheckResult::scored(check, covered as f64 / sources.len() as f64, issues)
}

pub fn code_quality(outputs: &[ResolvedOutput]) -> CheckResult {
    let check = ValidationCheck::CodeQuality;
    let code: Vec<(&str, &str)> = outputs
        .iter()
        .filter(|o| o.is_code())
        .filter_map(|o| o.content.as_deref().map(|c| (o.path.as_str(), c)))
        .collect();

    if code.is_empty() {
        return CheckResult::scored(check, 1.0, Vec::new());
    }

    let mut issues = Vec::new();
    let mut total = 0.0;
    for (path, text) in &code {
        if COMMENT_MARKER.is_match(text) {
            total += 0.5;
        } else {
            issues.push(format!("{} has no explanatory comments", path));
        }
        if ERROR_HANDLING_MARKER.is_match(text) {
            total += 0.5;
        } else {
            issues.push(format!("{} has no visible error handling", path));
        }
    }

    CheckResult::scored(check, total / code.len() as f64, issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_resolve_rejects_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let outputs = resolve_outputs(
            dir.path(),
            &["../secret.md".to_string(), "/etc/passwd".to_string()],
        );
        assert!(outputs.iter().all(|o| !o.is_usable()));
        assert!(outputs[0].problem.as_ref().unwrap().contains("escapes"));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_symlink_out_of_root() {
        let outside = TempDir::new().unwrap();
        write(outside.path(), "secret.md", "# Secret\n\nnot part of the project\n");

        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.md"),
            dir.path().join("docs/link.md"),
        )
        .unwrap();
        write(dir.path(), "docs/real.md", "# Real\n");
        std::os::unix::fs::symlink(dir.path().join("docs/real.md"), dir.path().join("docs/alias.md"))
            .unwrap();

        let outputs = resolve_outputs(
            dir.path(),
            &["docs/link.md".to_string(), "docs/alias.md".to_string()],
        );
        assert!(!outputs[0].is_usable());
        assert!(outputs[0].problem.as_ref().unwrap().contains("escapes"));
        assert!(outputs[1].is_usable());
    }

    #[test]
    fn test_resolve_dedupes_and_normalizes() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "docs/a.md", "# A\n");
        let outputs = resolve_outputs(
            dir.path(),
            &["./docs/a.md".to_string(), "docs/a.md".to_string()],
        );
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].path, "docs/a.md");
        assert!(outputs[0].is_usable());
    }

    #[test]
    fn test_missing_output_is_blocking() {
        let dir = TempDir::new().unwrap();
        let outputs = resolve_outputs(dir.path(), &["docs/missing.md".to_string()]);
        let result = outputs_exist(&outputs);
        assert!(!result.passed);
        assert!(result.blocking);
        assert_eq!(result.score, 0.0);
        assert!(result.issues[0].contains("docs/missing.md"));
    }

    #[test]
    fn test_partial_expected_match_is_not_blocking() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "docs/a.md", "# A\n");
        let outputs = resolve_outputs(dir.path(), &["docs/a.md".to_string()]);
        let expected = vec![
            ExpectedOutput::Pattern("docs/**/a*.md".to_string()),
            ExpectedOutput::Pattern("docs/**/b*.md".to_string()),
        ];
        let result = matches_expected(&outputs, &expected);
        assert!(!result.passed);
        assert!(!result.blocking);
        assert_eq!(result.score, 10.0);
    }

    #[test]
    fn test_document_structure_scoring() {
        let dir = TempDir::new().unwrap();
        let good = format!("# Title\n\n## Section\n\n{}\n", "Words about the code. ".repeat(20));
        write(dir.path(), "docs/good.md", &good);
        write(dir.path(), "docs/thin.md", "just a line, TBD\n");

        let config = ValidationConfig::default();
        let good_outputs = resolve_outputs(dir.path(), &["docs/good.md".to_string()]);
        assert!(document_structure(&good_outputs, &config).passed);

        let thin_outputs = resolve_outputs(dir.path(), &["docs/thin.md".to_string()]);
        let result = document_structure(&thin_outputs, &config);
        assert!(!result.passed);
        assert_eq!(result.issues.len(), 3);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_source_coverage_by_stem() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "docs/x.md", "The user_service module handles accounts.");
        let outputs = resolve_outputs(dir.path(), &["docs/x.md".to_string()]);
        let result = source_coverage(
            &outputs,
            &["src/user_service.rs".to_string(), "src/orders.rs".to_string()],
        );
        assert_eq!(result.score, 7.5);
        assert!(result.issues[0].contains("src/orders.rs"));
    }

    #[test]
    fn test_code_quality_markers() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "examples/ok.py",
            "# Load the file\ntry:\n    load()\nexcept IOError:\n    pass\n",
        );
        write(dir.path(), "examples/bare.py", "load()\n");

        let ok = resolve_outputs(dir.path(), &["examples/ok.py".to_string()]);
        assert!(code_quality(&ok).passed);

        let bare = resolve_outputs(dir.path(), &["examples/bare.py".to_string()]);
        let result = code_quality(&bare);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.issues.len(), 2);
    }
}
