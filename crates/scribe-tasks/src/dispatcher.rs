//! Task dispatcher
//!
//! State machine over the task store:
//!
//! ```text
//! pending -> in_progress -> completed
//!                 |
//!                 v
//!               error -> (reset) -> pending
//! pending | error -> (skip) -> skipped
//! ```
//!
//! Every transition runs inside one store mutation, so concurrent callers
//! can never be handed the same task.

use chrono::{DateTime, Utc};
use scribe_core::{
    normalize_path, Dependency, Milestone, Result, ScribeError, Task, TaskStatus,
};
use scribe_validation::{ValidationResult, Validator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::progress::ProgressSnapshot;
use crate::store::{TaskList, TaskStore};

/// Why no task could be handed out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// Remaining work depends on tasks currently in progress
    AwaitingSubmission,
    /// Remaining work depends on tasks that failed validation
    ErroredTasks,
    /// Dependencies that can never be met as things stand
    Dependencies,
}

/// A pending task and what it waits for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitingTask {
    pub id: String,
    pub dependency: Dependency,
    pub unmet: String,
}

/// Diagnostic returned instead of a task when nothing is eligible
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedReport {
    pub reason: BlockReason,
    pub diagnostic: String,
    pub in_progress: Vec<String>,
    pub errored: Vec<String>,
    pub waiting: Vec<WaitingTask>,
}

/// Summary returned once every task is completed or skipped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionSummary {
    pub project: String,
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    /// Outputs accepted across all tasks
    pub outputs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Result of asking for the next task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NextTask {
    Assigned(Task),
    Blocked(BlockedReport),
    Complete(CompletionSummary),
}

/// Completion claim sent by the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub task_id: String,
    /// Produced files, relative to the project root
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Submission {
    pub fn new(task_id: impl Into<String>, outputs: Vec<String>) -> Self {
        Self {
            task_id: task_id.into(),
            outputs,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// What happened to a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Accepted {
        task: Task,
        validation: ValidationResult,
        /// What the caller should do next
        next: String,
    },
    Rejected {
        task: Task,
        validation: ValidationResult,
        remediation: Vec<String>,
    },
}

impl SubmissionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn task(&self) -> &Task {
        match self {
            Self::Accepted { task, .. } | Self::Rejected { task, .. } => task,
        }
    }

    pub fn validation(&self) -> &ValidationResult {
        match self {
            Self::Accepted { validation, .. } | Self::Rejected { validation, .. } => validation,
        }
    }
}

/// Answer to a status query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub project: String,
    pub progress: ProgressSnapshot,
    /// Most recently started task still in progress
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<Task>,
    pub in_progress: Vec<String>,
    pub errored: Vec<String>,
}

/// Why `dependency` is not yet satisfied, `None` when it is
///
/// Skipped tasks satisfy dependencies. A milestone over a kind with no tasks
/// is satisfied. A reference to a task that does not exist never is.
pub fn unmet_dependency(dependency: &Dependency, tasks: &[Task]) -> Option<String> {
    match dependency {
        Dependency::None => None,
        Dependency::Task(id) => match tasks.iter().find(|t| &t.id == id) {
            None => Some(format!("depends on unknown task {}", id)),
            Some(t) if t.status.satisfies_dependency() => None,
            Some(t) => Some(format!("waiting for task {} ({})", id, t.status)),
        },
        Dependency::Milestone(milestone) => {
            let Milestone::AllCompleted(kind) = milestone;
            let of_kind: Vec<&Task> = tasks.iter().filter(|t| t.kind() == *kind).collect();
            let unfinished = of_kind
                .iter()
                .filter(|t| !t.status.satisfies_dependency())
                .count();
            (unfinished > 0).then(|| {
                format!(
                    "waiting for {} ({} of {} unfinished)",
                    milestone,
                    unfinished,
                    of_kind.len()
                )
            })
        }
    }
}

fn ids_with_status(list: &TaskList, status: TaskStatus) -> Vec<String> {
    list.tasks
        .iter()
        .filter(|t| t.status == status)
        .map(|t| t.id.clone())
        .collect()
}

/// Outcome when no pending task is eligible
fn idle_outcome(list: &TaskList) -> NextTask {
    if list.tasks.iter().all(|t| t.status.is_terminal()) {
        return NextTask::Complete(CompletionSummary {
            project: list.project.clone(),
            total: list.total,
            completed: list.progress.completed,
            skipped: list.progress.skipped,
            outputs: list.tasks.iter().flat_map(|t| t.outputs.clone()).collect(),
            finished_at: list.tasks.iter().filter_map(|t| t.completed_at).max(),
        });
    }

    let in_progress = ids_with_status(list, TaskStatus::InProgress);
    let errored = ids_with_status(list, TaskStatus::Error);
    let waiting: Vec<WaitingTask> = list
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending)
        .filter_map(|t| {
            unmet_dependency(&t.dependency, &list.tasks).map(|unmet| WaitingTask {
                id: t.id.clone(),
                dependency: t.dependency.clone(),
                unmet,
            })
        })
        .collect();

    let (reason, diagnostic) = if !in_progress.is_empty() {
        (
            BlockReason::AwaitingSubmission,
            format!(
                "{} task(s) in progress ({}); submit them to unblock {} waiting task(s)",
                in_progress.len(),
                in_progress.join(", "),
                waiting.len()
            ),
        )
    } else if !errored.is_empty() {
        (
            BlockReason::ErroredTasks,
            format!(
                "{} task(s) failed validation ({}); reset or skip them to continue",
                errored.len(),
                errored.join(", ")
            ),
        )
    } else {
        let details: Vec<String> = waiting
            .iter()
            .map(|w| format!("{}: {}", w.id, w.unmet))
            .collect();
        (
            BlockReason::Dependencies,
            format!("no task can become eligible; {}", details.join("; ")),
        )
    };

    NextTask::Blocked(BlockedReport {
        reason,
        diagnostic,
        in_progress,
        errored,
        waiting,
    })
}

/// Hands out tasks and gates their completion on validation
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<TaskStore>,
    validator: Arc<Validator>,
}

impl Dispatcher {
    pub fn new(store: Arc<TaskStore>, validator: Arc<Validator>) -> Self {
        Self { store, validator }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub async fn get_task(&self, id: &str) -> Result<Task> {
        self.store.get(id).await
    }

    /// Claim the highest-priority eligible task
    ///
    /// Ties on priority go to the task created first. When nothing is
    /// eligible the answer is `Blocked` or `Complete`, never an error, and
    /// the stored list is not rewritten.
    #[instrument(skip(self))]
    pub async fn get_next_task(&self) -> Result<NextTask> {
        let next = self
            .store
            .mutate(|list| {
                let chosen = list
                    .tasks
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.status == TaskStatus::Pending)
                    .filter(|(_, t)| unmet_dependency(&t.dependency, &list.tasks).is_none())
                    .max_by(|(ia, a), (ib, b)| {
                        a.priority
                            .cmp(&b.priority)
                            .then_with(|| b.sequence.cmp(&a.sequence))
                            .then_with(|| ib.cmp(ia))
                    })
                    .map(|(idx, _)| idx);

                let Some(idx) = chosen else {
                    return Ok(idle_outcome(list));
                };

                let task = &mut list.tasks[idx];
                task.status = TaskStatus::InProgress;
                task.started_at = Some(Utc::now());
                task.completed_at = None;
                task.attempts += 1;
                Ok(NextTask::Assigned(task.clone()))
            })
            .await?;

        match &next {
            NextTask::Assigned(task) => {
                info!(task_id = %task.id, kind = %task.kind(), attempt = task.attempts, "Assigned task")
            }
            NextTask::Blocked(report) => {
                debug!(reason = ?report.reason, "No eligible task: {}", report.diagnostic)
            }
            NextTask::Complete(summary) => info!(total = summary.total, "All tasks finished"),
        }
        Ok(next)
    }

    /// Validate a completion claim and finish or fail the task
    ///
    /// The task must be in progress both when the claim arrives and when the
    /// result is recorded; otherwise `InvalidState` is returned and nothing
    /// changes.
    #[instrument(skip(self, submission), fields(task_id = %submission.task_id, outputs = submission.outputs.len()))]
    pub async fn submit_completion(&self, submission: Submission) -> Result<SubmissionOutcome> {
        let task = self.store.get(&submission.task_id).await?;
        ensure_status(&task, TaskStatus::InProgress)?;

        let mut outputs: Vec<String> = Vec::new();
        for output in &submission.outputs {
            let normalized = normalize_path(output);
            if !outputs.contains(&normalized) {
                outputs.push(normalized);
            }
        }

        let validation = self.run_validation(task, outputs.clone()).await?;
        let passed = validation.passed;
        let issues = validation.issues();
        let notes = submission.notes.clone();

        let task = self
            .store
            .mutate(|list| {
                let task = list.require_mut(&submission.task_id)?;
                ensure_status(task, TaskStatus::InProgress)?;

                if let Some(notes) = notes {
                    task.notes.push(notes);
                }
                if passed {
                    task.status = TaskStatus::Completed;
                    task.completed_at = Some(Utc::now());
                    task.outputs = outputs;
                } else {
                    task.status = TaskStatus::Error;
                    let attempt = task.attempts;
                    task.errors
                        .extend(issues.iter().map(|i| format!("attempt {}: {}", attempt, i)));
                }
                Ok(task.clone())
            })
            .await?;

        if passed {
            let progress = self.store.progress().await;
            let next = if progress.is_complete() {
                "All tasks are finished".to_string()
            } else {
                format!(
                    "Call `scribe next` for the next task ({} remaining, {:.1}% done)",
                    progress.remaining, progress.percentage
                )
            };
            info!(score = validation.percentage, "Task completed");
            Ok(SubmissionOutcome::Accepted {
                task,
                validation,
                next,
            })
        } else {
            warn!(
                score = validation.percentage,
                issues = issues.len(),
                "Task failed validation"
            );
            let remediation = validation.suggestions.clone();
            Ok(SubmissionOutcome::Rejected {
                task,
                validation,
                remediation,
            })
        }
    }

    /// Validate claimed outputs without touching task state
    #[instrument(skip(self, outputs))]
    pub async fn validate_outputs(&self, task_id: &str, outputs: &[String]) -> Result<ValidationResult> {
        let task = self.store.get(task_id).await?;
        let outputs = outputs.iter().map(|o| normalize_path(o)).collect();
        self.run_validation(task, outputs).await
    }

    /// Move a failed task back to pending so it can be dispatched again
    #[instrument(skip(self))]
    pub async fn reset_task(&self, task_id: &str) -> Result<Task> {
        let task = self
            .store
            .mutate(|list| {
                let task = list.require_mut(task_id)?;
                ensure_status(task, TaskStatus::Error)?;
                task.status = TaskStatus::Pending;
                task.started_at = None;
                task.notes
                    .push(format!("reset after {} attempt(s)", task.attempts));
                Ok(task.clone())
            })
            .await?;
        info!("Task reset to pending");
        Ok(task)
    }

    /// Mark a pending or failed task as skipped
    ///
    /// Skipped tasks satisfy the dependencies of later tasks.
    #[instrument(skip(self, reason))]
    pub async fn skip_task(&self, task_id: &str, reason: &str) -> Result<Task> {
        let task = self
            .store
            .mutate(|list| {
                let task = list.require_mut(task_id)?;
                if !matches!(task.status, TaskStatus::Pending | TaskStatus::Error) {
                    return Err(ScribeError::InvalidState {
                        task_id: task.id.clone(),
                        expected: TaskStatus::Pending,
                        actual: task.status,
                    });
                }
                task.status = TaskStatus::Skipped;
                task.completed_at = Some(Utc::now());
                task.notes.push(format!("skipped: {}", reason));
                Ok(task.clone())
            })
            .await?;
        info!(reason, "Task skipped");
        Ok(task)
    }

    pub async fn status(&self) -> Result<StatusReport> {
        let list = self.store.refresh().await?;
        let current = list
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
            .max_by_key(|t| t.started_at)
            .cloned();

        Ok(StatusReport {
            in_progress: ids_with_status(&list, TaskStatus::InProgress),
            errored: ids_with_status(&list, TaskStatus::Error),
            project: list.project,
            progress: list.progress,
            current,
        })
    }

    /// Validation reads files, so it runs off the async workers
    async fn run_validation(&self, task: Task, outputs: Vec<String>) -> Result<ValidationResult> {
        let validator = Arc::clone(&self.validator);
        tokio::task::spawn_blocking(move || validator.validate(&task, &outputs))
            .await
            .map_err(|e| ScribeError::Other(format!("validation did not finish: {}", e)))
    }
}

fn ensure_status(task: &Task, expected: TaskStatus) -> Result<()> {
    if task.status == expected {
        Ok(())
    } else {
        Err(ScribeError::InvalidState {
            task_id: task.id.clone(),
            expected,
            actual: task.status,
        })
    }
}
