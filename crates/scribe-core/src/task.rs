//! Task records tracked by the dispatcher

use chrono::{DateTime, Utc};
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};

use crate::types::{Category, ChunkInfo};

/// Task lifecycle status
///
/// `pending -> in_progress -> completed`, with `in_progress -> error` and an
/// explicit reset from `error` back to `pending`. `skipped` is set only by an
/// operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Skipped,
    Error,
}

impl TaskStatus {
    /// Terminal statuses are never left again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }

    /// Whether a dependent task may proceed past a task in this status
    pub fn satisfies_dependency(&self) -> bool {
        self.is_terminal()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" | "inprogress" | "in-progress" => Ok(Self::InProgress),
            "completed" | "done" => Ok(Self::Completed),
            "skipped" => Ok(Self::Skipped),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }
}

/// Kind of work a task represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    FileProcessing,
    Analysis,
    ModuleCreation,
    Summary,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileProcessing => write!(f, "file-processing"),
            Self::Analysis => write!(f, "analysis"),
            Self::ModuleCreation => write!(f, "module-creation"),
            Self::Summary => write!(f, "summary"),
        }
    }
}

impl std::str::FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "file-processing" => Ok(Self::FileProcessing),
            "analysis" => Ok(Self::Analysis),
            "module-creation" => Ok(Self::ModuleCreation),
            "summary" => Ok(Self::Summary),
            _ => Err(format!("Invalid task kind: {}", s)),
        }
    }
}

/// Kind-specific task data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TaskPayload {
    /// Document the files of one work unit
    FileProcessing {
        batch_id: String,
        files: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chunk: Option<ChunkInfo>,
        estimated_tokens: usize,
    },
    /// Cross-file architecture analysis
    Analysis { scope: Vec<Category> },
    /// One documentation page per category of files
    ModuleCreation {
        category: Category,
        files: Vec<String>,
    },
    /// Project-level summary and index
    Summary { sections: Vec<String> },
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::FileProcessing { .. } => TaskKind::FileProcessing,
            Self::Analysis { .. } => TaskKind::Analysis,
            Self::ModuleCreation { .. } => TaskKind::ModuleCreation,
            Self::Summary { .. } => TaskKind::Summary,
        }
    }

    /// Source files the task is about, if any
    pub fn source_files(&self) -> &[String] {
        match self {
            Self::FileProcessing { files, .. } | Self::ModuleCreation { files, .. } => files,
            Self::Analysis { .. } | Self::Summary { .. } => &[],
        }
    }
}

/// Symbolic completion condition used as a dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    /// Every task of the given kind is completed (or skipped)
    AllCompleted(TaskKind),
}

impl std::fmt::Display for Milestone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllCompleted(kind) => write!(f, "all {} tasks completed", kind),
        }
    }
}

/// What a task waits for before it becomes eligible
///
/// There is deliberately no `Default`: every task states its dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "on", content = "ref", rename_all = "snake_case")]
pub enum Dependency {
    None,
    Task(String),
    Milestone(Milestone),
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Task(id) => write!(f, "task {}", id),
            Self::Milestone(m) => write!(f, "{}", m),
        }
    }
}

/// Descriptor of an artifact a task is expected to produce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedOutput {
    /// Exact relative path
    Path(String),
    /// Glob pattern over relative paths (`docs/**/user_service*.md`)
    Pattern(String),
}

impl ExpectedOutput {
    /// Check whether a claimed relative path satisfies this descriptor
    pub fn matches(&self, path: &str) -> bool {
        let path = normalize_path(path);
        match self {
            Self::Path(expected) => normalize_path(expected) == path,
            Self::Pattern(pattern) => Pattern::new(pattern)
                .map(|p| {
                    p.matches_with(
                        &path,
                        MatchOptions {
                            case_sensitive: false,
                            require_literal_separator: false,
                            require_literal_leading_dot: false,
                        },
                    )
                })
                .unwrap_or(false),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Path(p) | Self::Pattern(p) => p,
        }
    }
}

impl std::fmt::Display for ExpectedOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Strip `./` prefixes and normalize separators to `/`
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut trimmed = unified.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.to_string()
}

/// Instructions delivered to the agent with a task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInstructions {
    /// Files the agent should read
    pub target_files: Vec<String>,
    /// Where outputs are expected, as shown to the agent
    pub output_patterns: Vec<String>,
    pub focus_areas: Vec<String>,
    /// Quality checklist the validator will apply
    pub checklist: Vec<String>,
}

/// A durable unit of tracked work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier derived from the plan
    pub id: String,
    pub title: String,
    pub description: String,
    pub payload: TaskPayload,
    #[serde(default)]
    pub status: TaskStatus,
    /// Higher runs first when several tasks are eligible
    pub priority: i32,
    pub dependency: Dependency,
    pub expected_outputs: Vec<ExpectedOutput>,
    #[serde(default)]
    pub instructions: TaskInstructions,
    /// Rough time estimate for the agent
    pub estimated_minutes: u32,
    /// Creation order, used as the priority tie-break
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts: u32,
    /// Outputs accepted by the validator
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        payload: TaskPayload,
        dependency: Dependency,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            payload,
            status: TaskStatus::Pending,
            priority: 0,
            dependency,
            expected_outputs: Vec::new(),
            instructions: TaskInstructions::default(),
            estimated_minutes: 0,
            sequence: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            attempts: 0,
            outputs: Vec::new(),
            notes: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.payload.kind()
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_expected_outputs(mut self, outputs: Vec<ExpectedOutput>) -> Self {
        self.expected_outputs = outputs;
        self
    }

    pub fn with_instructions(mut self, instructions: TaskInstructions) -> Self {
        self.instructions = instructions;
        self
    }

    pub fn with_estimate(mut self, minutes: u32) -> Self {
        self.estimated_minutes = minutes;
        self
    }
}
