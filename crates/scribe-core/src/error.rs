//! Unified error types for Scribe

use thiserror::Error;

use crate::task::TaskStatus;

/// Unified error type for all Scribe operations
#[derive(Error, Debug)]
pub enum ScribeError {
    // Scan errors
    #[error("Scan error at {path}: {message}")]
    Scan { path: String, message: String },

    #[error("Project root is not readable: {path}: {message}")]
    RootUnreadable { path: String, message: String },

    // Budget errors
    #[error("Budget exceeded for {path}: {cost} tokens against a maximum of {max}")]
    BudgetExceeded { path: String, cost: usize, max: usize },

    // Task state errors
    #[error("Invalid state for task {task_id}: expected {expected}, found {actual}")]
    InvalidState {
        task_id: String,
        expected: TaskStatus,
        actual: TaskStatus,
    },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task list not initialized: {0}")]
    NotInitialized(String),

    // Registry errors
    #[error("Dependency cycle detected: {0}")]
    DependencyCycle(String),

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Service {0} has an unexpected type")]
    ServiceType(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl ScribeError {
    /// Shorthand for a non-fatal scan failure on a single path
    pub fn scan(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Scan {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// A task operation refused up front, with no state mutated
    ///
    /// Covers both a task in the wrong state and a task id that does not
    /// exist; callers that only care about "request rejected" match here.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. } | Self::TaskNotFound(_))
    }
}

/// Result type alias using ScribeError
pub type Result<T> = std::result::Result<T, ScribeError>;
