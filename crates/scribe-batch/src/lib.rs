//! Scribe Batch - from a source tree to budget-sized work units
//!
//! This crate scans and ranks project files, estimates their token cost,
//! and packs them into work units using combined, single or chunked
//! strategies. Oversized files are trimmed or split at structural
//! boundaries so no unit exceeds the configured maximum.

pub mod boundary;
pub mod budget;
pub mod builder;
pub mod plan_io;
pub mod prioritizer;
pub mod trimmer;
pub mod warning;

pub use boundary::{BoundaryDetector, Chunk};
pub use budget::TokenEstimator;
pub use builder::{
    BatchBuilder, BatchManifest, BatchPlan, BatchStrategy, BatchSummary, WorkUnit, WorkUnitEntry,
};
pub use plan_io::PlanStore;
pub use prioritizer::{classify, importance, sort_by_priority, FilePrioritizer, ScanReport};
pub use trimmer::{ContentTrimmer, TrimOutcome, TrimReport};
pub use warning::{BatchWarning, WarningKind};
