//! scribe-tasks: task generation, state and dispatch.
//!
//! A batch plan becomes a task list; the dispatcher hands tasks to an agent
//! one at a time and accepts completions only after the validator passes
//! the claimed outputs.
//!
//! # Modules
//!
//! - [`generator`]: file-processing tasks per work unit, plus follow-ons
//! - [`store`]: the persisted task list and its atomic mutation primitive
//! - [`storage`]: JSON file (advisory-locked) and in-memory persistence backends
//! - [`progress`]: counters, phase label and remaining-time estimate
//! - [`dispatcher`]: `get_next_task` / `submit_completion` state machine

pub mod dispatcher;
pub mod generator;
pub mod progress;
pub mod storage;
pub mod store;

pub use dispatcher::{
    unmet_dependency, BlockReason, BlockedReport, CompletionSummary, Dispatcher, NextTask,
    StatusReport, Submission, SubmissionOutcome, WaitingTask,
};
pub use generator::{TaskGenerator, ANALYSIS_TASK_ID, SUMMARY_TASK_ID};
pub use progress::{Phase, ProgressSnapshot};
pub use storage::{JsonFileStorage, MemoryStorage, StorageLock, TaskPersistence};
pub use store::{TaskList, TaskStore};
