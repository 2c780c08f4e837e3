//! Non-fatal conditions recorded during scanning and batching

use scribe_core::ScribeError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// File or directory could not be read
    Unreadable,
    /// Content could not be fit even after trimming or chunking
    BudgetExceeded,
    /// File left out because the batch limit was reached
    Deferred,
    /// File has no content worth a batch slot
    Empty,
}

/// A skipped or degraded file, kept on the manifest instead of aborting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchWarning {
    pub kind: WarningKind,
    pub path: String,
    pub message: String,
}

impl BatchWarning {
    pub fn new(kind: WarningKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Downgrade a per-file error into a warning
    pub fn from_error(err: &ScribeError) -> Self {
        match err {
            ScribeError::Scan { path, message } => {
                Self::new(WarningKind::Unreadable, path.clone(), message.clone())
            }
            ScribeError::BudgetExceeded { path, .. } => {
                Self::new(WarningKind::BudgetExceeded, path.clone(), err.to_string())
            }
            other => Self::new(WarningKind::Unreadable, "", other.to_string()),
        }
    }
}

impl std::fmt::Display for BatchWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            WarningKind::Unreadable => "unreadable",
            WarningKind::BudgetExceeded => "budget exceeded",
            WarningKind::Deferred => "deferred",
            WarningKind::Empty => "empty",
        };
        write!(f, "[{}] {}: {}", kind, self.path, self.message)
    }
}
