//! Structural boundary detection and chunking
//!
//! A file too large for one work unit is cut into segments that each start
//! at a top-level declaration (with its attributes, decorators and doc
//! comments attached), and the segments are packed greedily into chunks no
//! larger than the target. Lines are kept with their terminators, so the
//! chunks concatenated in ordinal order reproduce the file exactly.

use regex::Regex;
use scribe_core::{ChunkInfo, CommentStyle, Language};
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::budget::TokenEstimator;

static RUST_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?:pub(?:\([^)]*\))?\s+)?(?:async\s+|const\s+|unsafe\s+|extern\s+"[^"]*"\s+)*(?:fn|struct|enum|trait|impl|mod|type|const|static|union|macro_rules!)[\s<!]"#,
    )
    .expect("rust declaration pattern should compile")
});

static PYTHON_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:async\s+def|def|class)\s").expect("python declaration pattern should compile")
});

static SCRIPT_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:export\s+(?:default\s+)?)?(?:declare\s+)?(?:async\s+function|function\*?|abstract\s+class|class|interface|enum|namespace|type\s+\w+|const\s+\w+|let\s+\w+)\b",
    )
    .expect("script declaration pattern should compile")
});

static GO_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:func|type|var|const)\b").expect("go declaration pattern should compile")
});

static JVM_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s{0,8}(?:(?:(?:public|private|protected|internal|static|final|abstract|sealed|override|open|data|suspend|partial|async|virtual)\s+)*(?:class|interface|enum|record|struct|object|fun|func|protocol|extension)\b|(?:public|private|protected|internal)\s+[\w<>\[\],.?\s]+\s+\w+\s*\([^;]*$)",
    )
    .expect("jvm declaration pattern should compile")
});

static C_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?:class|struct|namespace|template|typedef|enum|union)\b|[A-Za-z_][\w\s\*&:<>,]*\([^;]*\)\s*(?:const\s*)?\{?\s*$)",
    )
    .expect("c declaration pattern should compile")
});

static RUBY_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s{0,2}(?:def|class|module)\b").expect("ruby declaration pattern should compile")
});

static PHP_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s{0,4}(?:(?:public|private|protected|static|abstract|final)\s+)*(?:function|class|interface|trait)\b",
    )
    .expect("php declaration pattern should compile")
});

static SHELL_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:function\s+\w+|\w+\s*\(\)\s*\{?\s*$)")
        .expect("shell declaration pattern should compile")
});

static SQL_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:create|alter|drop|insert|with|select|grant)\b")
        .expect("sql declaration pattern should compile")
});

static MARKDOWN_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#{1,3}\s").expect("markdown heading pattern should compile")
});

fn declaration_pattern(language: Language) -> Option<&'static Regex> {
    let pattern: &'static Regex = match language {
        Language::Rust => &RUST_DECL,
        Language::Python => &PYTHON_DECL,
        Language::JavaScript | Language::TypeScript => &SCRIPT_DECL,
        Language::Go => &GO_DECL,
        Language::Java | Language::Kotlin | Language::CSharp | Language::Swift => &JVM_DECL,
        Language::C | Language::Cpp => &C_DECL,
        Language::Ruby => &RUBY_DECL,
        Language::Php => &PHP_DECL,
        Language::Shell => &SHELL_DECL,
        Language::Sql => &SQL_DECL,
        Language::Markdown => &MARKDOWN_DECL,
        _ => return None,
    };
    Some(pattern)
}

/// Whether a line directly above a declaration belongs to it
fn attaches_to_declaration(line: &str, language: Language) -> bool {
    let trimmed = line.trim_start();
    if trimmed.trim_end().is_empty() || language == Language::Markdown {
        return false;
    }
    let comment = match language.comment_style() {
        CommentStyle::Slash | CommentStyle::Block => {
            trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*')
        }
        CommentStyle::Hash => trimmed.starts_with('#'),
        CommentStyle::Dash => trimmed.starts_with("--"),
        CommentStyle::Markup => trimmed.starts_with("<!--"),
    };
    let attribute = match language {
        Language::Rust => trimmed.starts_with("#["),
        Language::Python
        | Language::JavaScript
        | Language::TypeScript
        | Language::Java
        | Language::Kotlin
        | Language::CSharp
        | Language::Swift
        | Language::Php => trimmed.starts_with('@') || trimmed.starts_with('['),
        _ => false,
    };
    comment || attribute
}

/// One chunk of a file split at structural boundaries
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub info: ChunkInfo,
    pub estimated_tokens: usize,
}

/// Finds safe split points and cuts files into target-sized chunks
#[derive(Debug, Clone, Copy)]
pub struct BoundaryDetector {
    estimator: TokenEstimator,
}

impl BoundaryDetector {
    pub fn new(estimator: TokenEstimator) -> Self {
        Self { estimator }
    }

    /// Line indices (0-based) at which a new segment may start
    ///
    /// Always contains 0 for non-empty text. Declaration starts pull the
    /// contiguous comment and attribute lines above them into their segment.
    pub fn boundaries(&self, text: &str, language: Language) -> Vec<usize> {
        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let mut starts = match declaration_pattern(language) {
            Some(pattern) => declaration_starts(&lines, language, pattern),
            None => Vec::new(),
        };
        if starts.is_empty() {
            starts = paragraph_starts(&lines);
        }

        starts.push(0);
        starts.sort_unstable();
        starts.dedup();
        starts
    }

    /// Split `text` into chunks of at most `target_tokens` each
    ///
    /// Segments larger than the target on their own are cut by line (or by
    /// character for a single huge line) and flagged `unsafe_split`.
    pub fn split(&self, text: &str, language: Language, target_tokens: usize) -> Vec<Chunk> {
        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let max_chars = self.estimator.chars_for(target_tokens).max(1);
        let starts = self.boundaries(text, language);

        let mut pieces: Vec<Piece> = Vec::new();
        let mut current: Option<Piece> = None;

        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(lines.len());
            let segment = Piece::from_lines(&lines, start, end);

            if segment.chars > max_chars {
                if let Some(piece) = current.take() {
                    pieces.push(piece);
                }
                warn!(
                    language = %language,
                    start_line = start + 1,
                    end_line = end,
                    "No structural boundary within budget, splitting unsafely"
                );
                pieces.extend(hard_split(&lines, start, end, max_chars));
                continue;
            }

            current = match current.take() {
                Some(mut piece) if piece.chars + segment.chars <= max_chars => {
                    piece.absorb(segment);
                    Some(piece)
                }
                Some(piece) => {
                    pieces.push(piece);
                    Some(segment)
                }
                None => Some(segment),
            };
        }
        if let Some(piece) = current.take() {
            pieces.push(piece);
        }

        let total = pieces.len();
        debug!(language = %language, segments = starts.len(), chunks = total, "Split file");

        pieces
            .into_iter()
            .enumerate()
            .map(|(idx, piece)| Chunk {
                estimated_tokens: self.estimator.estimate(&piece.content),
                info: ChunkInfo {
                    ordinal: idx + 1,
                    total,
                    start_line: piece.first_line + 1,
                    end_line: piece.last_line + 1,
                    unsafe_split: piece.unsafe_split,
                },
                content: piece.content,
            })
            .collect()
    }
}

fn declaration_starts(lines: &[&str], language: Language, pattern: &Regex) -> Vec<usize> {
    let mut starts = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if !pattern.is_match(line) {
            continue;
        }
        let mut start = idx;
        while start > 0 && attaches_to_declaration(lines[start - 1], language) {
            start -= 1;
        }
        starts.push(start);
    }
    starts
}

/// Unindented lines that follow a blank line
fn paragraph_starts(lines: &[&str]) -> Vec<usize> {
    lines
        .windows(2)
        .enumerate()
        .filter_map(|(idx, pair)| {
            let (prev, line) = (pair[0], pair[1]);
            let unindented = !line.starts_with(char::is_whitespace);
            (prev.trim().is_empty() && unindented).then_some(idx + 1)
        })
        .collect()
}

struct Piece {
    content: String,
    chars: usize,
    first_line: usize,
    last_line: usize,
    unsafe_split: bool,
}

impl Piece {
    fn from_lines(lines: &[&str], start: usize, end: usize) -> Self {
        let content: String = lines[start..end].concat();
        Self {
            chars: content.chars().count(),
            content,
            first_line: start,
            last_line: end.saturating_sub(1),
            unsafe_split: false,
        }
    }

    fn absorb(&mut self, other: Piece) {
        self.content.push_str(&other.content);
        self.chars += other.chars;
        self.last_line = other.last_line;
        self.unsafe_split |= other.unsafe_split;
    }
}

fn hard_split(lines: &[&str], start: usize, end: usize, max_chars: usize) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut current: Option<Piece> = None;

    for idx in start..end {
        let line = lines[idx];
        let len = line.chars().count();

        if len > max_chars {
            if let Some(piece) = current.take() {
                pieces.push(piece);
            }
            let chars: Vec<char> = line.chars().collect();
            for part in chars.chunks(max_chars) {
                pieces.push(Piece {
                    content: part.iter().collect(),
                    chars: part.len(),
                    first_line: idx,
                    last_line: idx,
                    unsafe_split: true,
                });
            }
            continue;
        }

        let mut line_piece = Piece::from_lines(lines, idx, idx + 1);
        line_piece.unsafe_split = true;
        current = match current.take() {
            Some(mut piece) if piece.chars + len <= max_chars => {
                piece.absorb(line_piece);
                Some(piece)
            }
            Some(piece) => {
                pieces.push(piece);
                Some(line_piece)
            }
            None => Some(line_piece),
        };
    }
    if let Some(piece) = current {
        pieces.push(piece);
    }
    pieces
}
