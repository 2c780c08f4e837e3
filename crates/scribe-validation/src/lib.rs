//! # scribe-validation
//!
//! Output validation for Scribe tasks.
//!
//! This crate provides:
//! - Per-kind checklists run against claimed outputs on disk
//! - Scored check results with blocking failures
//! - Remediation suggestions for rejected submissions

mod checks;
mod validator;

pub use checks::{CheckResult, ValidationCheck};
pub use validator::{checklist_for, checklist_text, ValidationResult, Validator};
