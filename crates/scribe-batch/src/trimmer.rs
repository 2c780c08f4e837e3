//! Content trimming for files slightly over budget
//!
//! Two passes over the lines of a file: the first keeps lines matching the
//! language's high-value patterns (imports, declarations, structural
//! comments) up to a fraction of the budget, the second fills what is left
//! with ordinary non-blank lines in original order. Kept lines are never
//! reordered and the trim marker is counted against the budget, so trimming
//! the output again with the same budget returns it unchanged.

use regex::Regex;
use scribe_core::{CommentStyle, Language};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

use crate::budget::TokenEstimator;

static RUST_HIGH_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:pub(?:\([^)]*\))?\s+)?(?:async\s+|const\s+|unsafe\s+)*(?:use|mod|fn|struct|enum|trait|impl|type|const|static|macro_rules!)\b|///|//!|#!?\[)",
    )
    .expect("rust pattern should compile")
});

static PYTHON_HIGH_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:import\s|from\s+\S+\s+import\b|(?:async\s+)?def\s|class\s|@\w|__all__|"""|''')"#)
        .expect("python pattern should compile")
});

static SCRIPT_HIGH_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:import\b|export\b|(?:async\s+)?function\b|(?:abstract\s+)?class\b|interface\b|enum\b|type\s+\w+\s*=|(?:const|let|var)\s+\w+\s*=\s*(?:async\s*)?(?:\([^)]*\)|\w+)\s*=>|module\.exports|/\*\*)",
    )
    .expect("script pattern should compile")
});

static GO_HIGH_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:package|import|func|type|const|var)\b")
        .expect("go pattern should compile")
});

static JVM_HIGH_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:package\b|import\b|using\b|namespace\b|@\w|/\*\*|(?:(?:public|private|protected|internal|static|final|abstract|sealed|override|open|data|suspend|partial|async|virtual)\s+)*(?:class|interface|enum|record|struct|fun|func|object|protocol|extension)\b|(?:public|private|protected|internal)\s+[\w<>\[\],.?\s]+\s+\w+\s*\()",
    )
    .expect("jvm pattern should compile")
});

static C_HIGH_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:#\s*(?:include|define|pragma)\b|(?:class|struct|namespace|template|typedef|enum|union)\b)|^[A-Za-z_][\w\s\*&:<>,]*\([^;]*\)\s*(?:const\s*)?\{?\s*$",
    )
    .expect("c pattern should compile")
});

static RUBY_PHP_HIGH_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:require(?:_relative|_once)?\b|include(?:_once)?\b|namespace\b|use\s|module\b|class\b|interface\b|trait\b|def\b|(?:(?:public|private|protected|static|abstract|final)\s+)*function\b|attr_\w+)",
    )
    .expect("ruby/php pattern should compile")
});

static SHELL_HIGH_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:#!|\s*(?:function\s+\w+|\w+\s*\(\)\s*\{|export\s|source\s|\.\s|readonly\s))")
        .expect("shell pattern should compile")
});

static SQL_HIGH_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:create|alter|drop|insert|select|with|grant)\b")
        .expect("sql pattern should compile")
});

static MARKUP_HIGH_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:#{1,6}\s|\s*<(?:html|head|body|script|link|meta|section|main|nav|header|footer|template|h[1-6])\b)",
    )
    .expect("markup pattern should compile")
});

static CSS_HIGH_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:@import|@media|@layer|@font-face|:root|[.#\w\[][^{;]*\{)")
        .expect("css pattern should compile")
});

static DATA_HIGH_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:\s{0,2}"[^"]+"\s*:|[\w.-]+\s*[:=]|\s*\[\[?[\w.-]+\]\]?\s*$)"#)
        .expect("data pattern should compile")
});

static TEXT_HIGH_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Z0-9][A-Z0-9 _-]{2,}$|\S.*:\s*$|={3,}|-{3,})")
        .expect("text pattern should compile")
});

fn high_value_pattern(language: Language) -> &'static Regex {
    match language {
        Language::Rust => &RUST_HIGH_VALUE,
        Language::Python => &PYTHON_HIGH_VALUE,
        Language::JavaScript | Language::TypeScript => &SCRIPT_HIGH_VALUE,
        Language::Go => &GO_HIGH_VALUE,
        Language::Java | Language::Kotlin | Language::CSharp | Language::Swift => &JVM_HIGH_VALUE,
        Language::C | Language::Cpp => &C_HIGH_VALUE,
        Language::Ruby | Language::Php => &RUBY_PHP_HIGH_VALUE,
        Language::Shell => &SHELL_HIGH_VALUE,
        Language::Sql => &SQL_HIGH_VALUE,
        Language::Markdown | Language::Html => &MARKUP_HIGH_VALUE,
        Language::Css => &CSS_HIGH_VALUE,
        Language::Json | Language::Yaml | Language::Toml => &DATA_HIGH_VALUE,
        Language::Text => &TEXT_HIGH_VALUE,
    }
}

fn strategy_wording(language: Language) -> &'static str {
    match language {
        Language::Rust => "kept use/mod declarations, item signatures and doc comments",
        Language::Python => "kept imports, def/class signatures and decorators",
        Language::JavaScript | Language::TypeScript => {
            "kept imports/exports, function and class declarations"
        }
        Language::Go => "kept package/import clauses and func/type declarations",
        Language::Java | Language::Kotlin | Language::CSharp | Language::Swift => {
            "kept package/import lines, type and member declarations"
        }
        Language::C | Language::Cpp => "kept includes, macros and function/type declarations",
        Language::Ruby | Language::Php => "kept requires, module/class and method definitions",
        Language::Shell => "kept shebang, function definitions and exports",
        Language::Sql => "kept DDL and top-level statements",
        Language::Markdown | Language::Html => "kept headings and structural tags",
        Language::Css => "kept at-rules and selectors",
        Language::Json | Language::Yaml | Language::Toml => "kept top-level keys and tables",
        Language::Text => "kept section titles",
    }
}

/// Whether a line is a comment with (almost) nothing in it
fn is_trivial_comment(line: &str, language: Language) -> bool {
    let trimmed = line.trim();
    let prefixes: &[&str] = match language.comment_style() {
        CommentStyle::Slash => &["//", "/*", "*/", "*"],
        CommentStyle::Hash => &["#"],
        CommentStyle::Dash => &["--"],
        CommentStyle::Markup => &["<!--"],
        CommentStyle::Block => &["/*", "*/", "*"],
    };
    match prefixes.iter().find(|p| trimmed.starts_with(**p)) {
        Some(prefix) => {
            let body = &trimmed[prefix.len()..];
            body.chars().filter(|c| c.is_alphanumeric()).count() < 3
        }
        None => false,
    }
}

/// What a trim removed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimReport {
    pub original_chars: usize,
    pub kept_chars: usize,
    pub original_lines: usize,
    pub kept_lines: usize,
    /// `kept_chars / original_chars`
    pub compression_ratio: f64,
    pub strategy: String,
}

/// Trimmed (or untouched) content plus a report when anything was dropped
#[derive(Debug, Clone, PartialEq)]
pub struct TrimOutcome {
    pub content: String,
    pub report: Option<TrimReport>,
}

impl TrimOutcome {
    pub fn was_trimmed(&self) -> bool {
        self.report.is_some()
    }
}

/// Two-pass line-priority trimmer
#[derive(Debug, Clone, Copy)]
pub struct ContentTrimmer {
    estimator: TokenEstimator,
    high_value_fraction: f64,
}

impl ContentTrimmer {
    pub fn new(estimator: TokenEstimator, high_value_fraction: f64) -> Self {
        Self {
            estimator,
            high_value_fraction: high_value_fraction.clamp(0.0, 1.0),
        }
    }

    fn marker(language: Language, kept: usize, total: usize) -> String {
        language.comment(&format!(
            "[trimmed: kept {} of {} lines, {} dropped]",
            kept,
            total,
            total - kept
        ))
    }

    /// Reduce `text` to at most `max_tokens`, marker included
    pub fn trim(&self, text: &str, language: Language, max_tokens: usize) -> TrimOutcome {
        if self.estimator.fits(text, max_tokens) {
            return TrimOutcome {
                content: text.to_string(),
                report: None,
            };
        }

        let lines: Vec<&str> = text.lines().collect();
        let total = lines.len();
        let original_chars = text.chars().count();
        let budget_chars = self.estimator.chars_for(max_tokens);

        // Widest marker this trim could produce, plus its leading newline
        let reserve = Self::marker(language, total, total).chars().count() + 1;
        if budget_chars <= reserve {
            let content: String = text.chars().take(budget_chars).collect();
            let kept_chars = content.chars().count();
            return TrimOutcome {
                report: Some(TrimReport {
                    original_chars,
                    kept_chars,
                    original_lines: total,
                    kept_lines: content.lines().count(),
                    compression_ratio: ratio(kept_chars, original_chars),
                    strategy: "hard truncation, budget smaller than trim marker".to_string(),
                }),
                content,
            };
        }

        let available = budget_chars - reserve;
        let high_value_limit = (available as f64 * self.high_value_fraction) as usize;
        let cost = |line: &str| line.chars().count() + 1;
        let pattern = high_value_pattern(language);

        let mut keep = vec![false; total];
        let mut used = 0usize;

        for (idx, line) in lines.iter().enumerate() {
            if line.trim().is_empty() || !pattern.is_match(line) {
                continue;
            }
            let c = cost(line);
            if used + c <= high_value_limit {
                keep[idx] = true;
                used += c;
            }
        }

        for (idx, line) in lines.iter().enumerate() {
            if keep[idx] || line.trim().is_empty() || is_trivial_comment(line, language) {
                continue;
            }
            let c = cost(line);
            if used + c <= available {
                keep[idx] = true;
                used += c;
            }
        }

        let kept: Vec<&str> = lines
            .iter()
            .zip(&keep)
            .filter_map(|(line, k)| k.then_some(*line))
            .collect();
        let kept_lines = kept.len();

        let mut content = kept.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        content.push_str(&Self::marker(language, kept_lines, total));

        let kept_chars = content.chars().count();
        debug!(
            language = %language,
            original_chars,
            kept_chars,
            kept_lines,
            total_lines = total,
            "Trimmed content"
        );

        TrimOutcome {
            content,
            report: Some(TrimReport {
                original_chars,
                kept_chars,
                original_lines: total,
                kept_lines,
                compression_ratio: ratio(kept_chars, original_chars),
                strategy: strategy_wording(language).to_string(),
            }),
        }
    }
}

fn ratio(kept: usize, original: usize) -> f64 {
    if original == 0 {
        1.0
    } else {
        kept as f64 / original as f64
    }
}
