//! # scribe-core
//!
//! Core types for the Scribe documentation pipeline.
//!
//! Scribe turns a source tree into budget-sized work units, derives a task
//! list from them and hands tasks to an agent one at a time, validating every
//! claimed output before a task counts as done.
//!
//! ## Core Paradigm
//!
//! - One token estimator drives every size decision
//! - Tasks state their dependencies explicitly (task id or milestone)
//! - The dispatcher is the only writer of task status
//! - Outputs are checked on disk, never trusted from the claim

mod config;
mod error;
pub mod registry;
mod task;
mod types;

pub use config::{
    BudgetConfig, OutputConfig, ScanConfig, ScribeConfig, ValidationConfig, STATE_DIR,
};
pub use error::{Result, ScribeError};
pub use registry::ServiceRegistry;
pub use task::*;
pub use types::*;
