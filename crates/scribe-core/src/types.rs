//! Core type definitions for scanned source files

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Semantic category of a source file
///
/// Declaration order is the category-defined order used as the secondary
/// sort key after importance.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Entry,
    Config,
    Route,
    Controller,
    Service,
    Model,
    Component,
    Utility,
    Test,
    #[default]
    Other,
}

impl Category {
    /// All categories in classification order
    pub const ALL: [Category; 10] = [
        Category::Entry,
        Category::Config,
        Category::Route,
        Category::Controller,
        Category::Service,
        Category::Model,
        Category::Component,
        Category::Utility,
        Category::Test,
        Category::Other,
    ];

    /// Position in the category-defined order (lower sorts first)
    pub fn order(&self) -> u8 {
        *self as u8
    }

    /// Aspects a documentation agent should focus on for this kind of file
    pub fn focus_areas(&self) -> &'static [&'static str] {
        match self {
            Self::Entry => &[
                "startup sequence and initialization order",
                "top-level wiring of modules",
                "command-line or environment inputs",
            ],
            Self::Config => &[
                "every configurable option and its default",
                "required versus optional settings",
                "environment-specific overrides",
            ],
            Self::Route => &[
                "each endpoint with method and path",
                "request and response shapes",
                "authentication requirements",
            ],
            Self::Controller => &[
                "handled requests and their validation",
                "delegation to services",
                "error responses",
            ],
            Self::Service => &[
                "business rules and invariants",
                "external dependencies and side effects",
                "error handling and retries",
            ],
            Self::Model => &[
                "fields, types and constraints",
                "relationships between entities",
                "serialization format",
            ],
            Self::Component => &[
                "props or inputs and emitted events",
                "internal state",
                "usage examples",
            ],
            Self::Utility => &[
                "function signatures and return values",
                "edge cases",
                "where the helpers are used",
            ],
            Self::Test => &[
                "behaviour covered by the tests",
                "fixtures and test setup",
                "gaps in coverage",
            ],
            Self::Other => &["purpose of the file", "public surface", "notable details"],
        }
    }

    /// One-line processing hint delivered with every work-unit entry
    pub fn processing_hint(&self) -> String {
        format!("Focus on: {}", self.focus_areas().join("; "))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Entry => "entry",
            Self::Config => "config",
            Self::Route => "route",
            Self::Controller => "controller",
            Self::Service => "service",
            Self::Model => "model",
            Self::Component => "component",
            Self::Utility => "utility",
            Self::Test => "test",
            Self::Other => "other",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.to_string() == s.to_lowercase())
            .ok_or_else(|| format!("Invalid category: {}", s))
    }
}

/// Language detected from a file extension or well-known filename
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    Kotlin,
    CSharp,
    C,
    Cpp,
    Ruby,
    Php,
    Swift,
    Shell,
    Sql,
    Html,
    Css,
    Markdown,
    Json,
    Yaml,
    Toml,
    Text,
}

/// Comment syntax used when annotating content for a language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentStyle {
    /// `// ...`
    Slash,
    /// `# ...`
    Hash,
    /// `-- ...`
    Dash,
    /// `<!-- ... -->`
    Markup,
    /// `/* ... */`
    Block,
}

impl Language {
    /// Map a file extension (without the dot) to a language
    pub fn from_extension(ext: &str) -> Option<Self> {
        let lang = match ext.to_lowercase().as_str() {
            "rs" => Self::Rust,
            "py" | "pyi" => Self::Python,
            "js" | "jsx" | "mjs" | "cjs" | "vue" | "svelte" => Self::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Self::TypeScript,
            "go" => Self::Go,
            "java" => Self::Java,
            "kt" | "kts" => Self::Kotlin,
            "cs" => Self::CSharp,
            "c" | "h" => Self::C,
            "cc" | "cpp" | "cxx" | "hpp" | "hh" => Self::Cpp,
            "rb" => Self::Ruby,
            "php" => Self::Php,
            "swift" => Self::Swift,
            "sh" | "bash" | "zsh" => Self::Shell,
            "sql" => Self::Sql,
            "html" | "htm" => Self::Html,
            "css" | "scss" | "sass" | "less" => Self::Css,
            "md" | "markdown" | "mdx" => Self::Markdown,
            "json" => Self::Json,
            "yml" | "yaml" => Self::Yaml,
            "toml" => Self::Toml,
            "txt" | "rst" => Self::Text,
            _ => return None,
        };
        Some(lang)
    }

    /// Detect the language of a path from its extension, falling back to
    /// well-known extensionless names such as README or CHANGELOG
    pub fn from_path(path: &str) -> Option<Self> {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => Self::from_extension(ext),
            _ => {
                let upper = file_name.to_uppercase();
                if upper.starts_with("README") || upper.starts_with("CHANGELOG") {
                    Some(Self::Markdown)
                } else if upper == "DOCKERFILE" || upper == "MAKEFILE" {
                    Some(Self::Shell)
                } else {
                    None
                }
            }
        }
    }

    /// Whether files in this language contain executable code
    pub fn is_code(&self) -> bool {
        !matches!(
            self,
            Self::Markdown | Self::Json | Self::Yaml | Self::Toml | Self::Text | Self::Html
        )
    }

    /// Whether this is a data/configuration format
    pub fn is_config_format(&self) -> bool {
        matches!(self, Self::Json | Self::Yaml | Self::Toml)
    }

    pub fn comment_style(&self) -> CommentStyle {
        match self {
            Self::Python | Self::Ruby | Self::Shell | Self::Yaml | Self::Toml | Self::Text => {
                CommentStyle::Hash
            }
            Self::Sql => CommentStyle::Dash,
            Self::Markdown | Self::Html => CommentStyle::Markup,
            Self::Css | Self::Json => CommentStyle::Block,
            _ => CommentStyle::Slash,
        }
    }

    /// Wrap a single line of text in this language's comment syntax
    pub fn comment(&self, text: &str) -> String {
        match self.comment_style() {
            CommentStyle::Slash => format!("// {}", text),
            CommentStyle::Hash => format!("# {}", text),
            CommentStyle::Dash => format!("-- {}", text),
            CommentStyle::Markup => format!("<!-- {} -->", text),
            CommentStyle::Block => format!("/* {} */", text),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Go => "go",
            Self::Java => "java",
            Self::Kotlin => "kotlin",
            Self::CSharp => "csharp",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Swift => "swift",
            Self::Shell => "shell",
            Self::Sql => "sql",
            Self::Html => "html",
            Self::Css => "css",
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Text => "text",
        };
        write!(f, "{}", name)
    }
}

/// A file discovered by the prioritizer
///
/// Immutable for the life of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path relative to the project root, `/`-separated (unique key)
    pub path: String,
    /// Size on disk in bytes
    pub size_bytes: u64,
    /// Last modification time, when the filesystem reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    pub category: Category,
    pub language: Language,
    /// Higher is more important
    pub importance: i32,
    /// Number of directories between the root and the file
    pub depth: usize,
}

impl SourceFile {
    /// File name without directories
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// File name without its final extension
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name,
        }
    }
}

/// Position of a chunk within a file that was split at structural boundaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// 1-based ordinal of this chunk
    pub ordinal: usize,
    /// Total number of chunks the file was split into
    pub total: usize,
    /// First line of the chunk (1-based, inclusive)
    pub start_line: usize,
    /// Last line of the chunk (1-based, inclusive)
    pub end_line: usize,
    /// Set when no structural boundary was available and the chunk was cut
    /// at the size budget instead
    #[serde(default)]
    pub unsafe_split: bool,
}

impl std::fmt::Display for ChunkInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "chunk {}/{} (lines {}-{}){}",
            self.ordinal,
            self.total,
            self.start_line,
            self.end_line,
            if self.unsafe_split { ", unsafe split" } else { "" }
        )
    }
}
