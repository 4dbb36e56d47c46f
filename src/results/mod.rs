//! Results storage module
//!
//! Persists suite reports so earlier runs can be listed and exported.

mod storage;

pub use storage::{generate_run_id, EnvironmentInfo, ExportFormat, ResultsStorage, RunInfo, StoredRun};
