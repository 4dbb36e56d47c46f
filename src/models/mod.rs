//! Data models for validation runs
//!
//! This module contains the report structures shared by the runner, the
//! formatter, and results storage.

mod report;

pub use report::{CheckResult, StageResult, Status, SuiteReport};
