//! Progress snapshots over a task list

use chrono::{DateTime, Utc};
use scribe_core::{Task, TaskKind, TaskStatus};
use serde::{Deserialize, Serialize};

/// Coarse phase of a documentation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    #[default]
    NotStarted,
    FileProcessing,
    Analysis,
    ModuleCreation,
    Summary,
    Complete,
}

impl From<TaskKind> for Phase {
    fn from(kind: TaskKind) -> Self {
        match kind {
            TaskKind::FileProcessing => Self::FileProcessing,
            TaskKind::Analysis => Self::Analysis,
            TaskKind::ModuleCreation => Self::ModuleCreation,
            TaskKind::Summary => Self::Summary,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not-started"),
            Self::FileProcessing => write!(f, "file-processing"),
            Self::Analysis => write!(f, "analysis"),
            Self::ModuleCreation => write!(f, "module-creation"),
            Self::Summary => write!(f, "summary"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Aggregate view recomputed after every store mutation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub skipped: usize,
    pub errored: usize,
    /// Tasks not yet completed or skipped
    pub remaining: usize,
    /// Share of tasks in a terminal status, in percent
    pub percentage: f64,
    pub phase: Phase,
    /// Estimated minutes of work left
    pub estimated_remaining_minutes: u64,
    pub computed_at: DateTime<Utc>,
}

impl ProgressSnapshot {
    pub fn compute(tasks: &[Task]) -> Self {
        let mut snapshot = Self {
            total: tasks.len(),
            computed_at: Utc::now(),
            ..Self::default()
        };

        for task in tasks {
            match task.status {
                TaskStatus::Pending => snapshot.pending += 1,
                TaskStatus::InProgress => snapshot.in_progress += 1,
                TaskStatus::Completed => snapshot.completed += 1,
                TaskStatus::Skipped => snapshot.skipped += 1,
                TaskStatus::Error => snapshot.errored += 1,
            }
        }

        let finished = snapshot.completed + snapshot.skipped;
        snapshot.remaining = snapshot.total - finished;
        snapshot.percentage = if snapshot.total == 0 {
            0.0
        } else {
            (finished as f64 / snapshot.total as f64 * 10_000.0).round() / 100.0
        };
        snapshot.phase = phase_of(tasks);
        snapshot.estimated_remaining_minutes = remaining_minutes(tasks, snapshot.remaining);
        snapshot
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.remaining == 0
    }
}

fn phase_of(tasks: &[Task]) -> Phase {
    if tasks.is_empty() {
        return Phase::NotStarted;
    }
    if tasks.iter().all(|t| t.status.is_terminal()) {
        return Phase::Complete;
    }
    if tasks
        .iter()
        .all(|t| t.status == TaskStatus::Pending && t.started_at.is_none())
    {
        return Phase::NotStarted;
    }

    // Earliest kind with unfinished work
    tasks
        .iter()
        .filter(|t| !t.status.is_terminal())
        .map(|t| t.kind())
        .min()
        .map(Phase::from)
        .unwrap_or(Phase::Complete)
}

fn remaining_minutes(tasks: &[Task], remaining: usize) -> u64 {
    let durations: Vec<i64> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .filter_map(|t| match (t.started_at, t.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds().max(0)),
            _ => None,
        })
        .collect();

    if durations.is_empty() {
        return tasks
            .iter()
            .filter(|t| !t.status.is_terminal())
            .map(|t| u64::from(t.estimated_minutes))
            .sum();
    }

    let average_secs = durations.iter().sum::<i64>() as f64 / durations.len() as f64;
    (average_secs * remaining as f64 / 60.0).ceil() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use scribe_core::{Dependency, TaskPayload};

    fn task(id: &str, payload: TaskPayload, status: TaskStatus) -> Task {
        let mut task = Task::new(id, id, payload, Dependency::None).with_estimate(10);
        task.status = status;
        task
    }

    fn file_task(id: &str, status: TaskStatus) -> Task {
        task(
            id,
            TaskPayload::FileProcessing {
                batch_id: "batch-001".to_string(),
                files: vec![],
                chunk: None,
                estimated_tokens: 100,
            },
            status,
        )
    }

    fn summary_task(status: TaskStatus) -> Task {
        task("summary-project", TaskPayload::Summary { sections: vec![] }, status)
    }

    #[test]
    fn test_fresh_list_is_not_started() {
        let tasks = vec![file_task("a", TaskStatus::Pending), summary_task(TaskStatus::Pending)];
        let snapshot = ProgressSnapshot::compute(&tasks);
        assert_eq!(snapshot.phase, Phase::NotStarted);
        assert_eq!(snapshot.percentage, 0.0);
        assert_eq!(snapshot.estimated_remaining_minutes, 20);
    }

    #[test]
    fn test_phase_follows_earliest_unfinished_kind() {
        let tasks = vec![
            file_task("a", TaskStatus::Completed),
            file_task("b", TaskStatus::InProgress),
            summary_task(TaskStatus::Pending),
        ];
        assert_eq!(ProgressSnapshot::compute(&tasks).phase, Phase::FileProcessing);

        let tasks = vec![
            file_task("a", TaskStatus::Completed),
            file_task("b", TaskStatus::Skipped),
            summary_task(TaskStatus::Pending),
        ];
        let snapshot = ProgressSnapshot::compute(&tasks);
        assert_eq!(snapshot.phase, Phase::Summary);
        assert!((snapshot.percentage - 66.67).abs() < 0.01);
    }

    #[test]
    fn test_complete_when_all_terminal() {
        let tasks = vec![file_task("a", TaskStatus::Completed), summary_task(TaskStatus::Skipped)];
        let snapshot = ProgressSnapshot::compute(&tasks);
        assert_eq!(snapshot.phase, Phase::Complete);
        assert!(snapshot.is_complete());
        assert_eq!(snapshot.estimated_remaining_minutes, 0);
    }

    #[test]
    fn test_estimate_uses_observed_durations() {
        let mut done = file_task("a", TaskStatus::Completed);
        let start = Utc::now() - Duration::minutes(30);
        done.started_at = Some(start);
        done.completed_at = Some(start + Duration::minutes(6));

        let tasks = vec![
            done,
            file_task("b", TaskStatus::Pending),
            file_task("c", TaskStatus::Error),
        ];
        let snapshot = ProgressSnapshot::compute(&tasks);
        assert_eq!(snapshot.remaining, 2);
        assert_eq!(snapshot.errored, 1);
        assert_eq!(snapshot.estimated_remaining_minutes, 12);
    }
}
