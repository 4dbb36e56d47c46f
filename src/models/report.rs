//! Validation report models
//!
//! Results of checks, stages, and whole suites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a check or stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Fail,
    Skip,
    Error,
}

impl Status {
    pub fn symbol(&self) -> &'static str {
        match self {
            Status::Pass => "✓",
            Status::Fail => "✗",
            Status::Skip => "○",
            Status::Error => "!",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Status::Pass)
    }

    /// Pass and Skip do not fail a run
    pub fn is_failure(&self) -> bool {
        matches!(self, Status::Fail | Status::Error)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pass => write!(f, "PASS"),
            Status::Fail => write!(f, "FAIL"),
            Status::Skip => write!(f, "SKIP"),
            Status::Error => write!(f, "ERROR"),
        }
    }
}

/// Result of one validation check
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckResult {
    pub description: String,
    pub kind: String,
    pub status: Status,
    pub attempts: u32,
    pub duration_ms: u64,

    /// Last value the target produced
    pub observed: Option<String>,
    pub message: Option<String>,
}

impl CheckResult {
    pub fn pass(
        description: impl Into<String>,
        kind: impl Into<String>,
        attempts: u32,
        duration_ms: u64,
        observed: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            kind: kind.into(),
            status: Status::Pass,
            attempts,
            duration_ms,
            observed: Some(observed.into()),
            message: None,
        }
    }

    pub fn fail(
        description: impl Into<String>,
        kind: impl Into<String>,
        attempts: u32,
        duration_ms: u64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            kind: kind.into(),
            status: Status::Fail,
            attempts,
            duration_ms,
            observed: None,
            message: Some(message.into()),
        }
    }

    pub fn skip(description: impl Into<String>, kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            kind: kind.into(),
            status: Status::Skip,
            attempts: 0,
            duration_ms: 0,
            observed: None,
            message: Some(reason.into()),
        }
    }

    pub fn error(description: impl Into<String>, kind: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            kind: kind.into(),
            status: Status::Error,
            attempts: 0,
            duration_ms: 0,
            observed: None,
            message: Some(error.into()),
        }
    }

    pub fn with_observed(mut self, observed: Option<String>) -> Self {
        self.observed = observed;
        self
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} ({} attempt(s), {}ms)",
            self.status.symbol(),
            self.kind,
            self.description,
            self.attempts,
            self.duration_ms
        )?;
        if let Some(msg) = &self.message {
            write!(f, " - {msg}")?;
        }
        Ok(())
    }
}

/// Result of one stage
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageResult {
    pub name: String,
    pub status: Status,
    pub duration_ms: u64,
    pub message: Option<String>,
}

impl StageResult {
    pub fn pass(name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            status: Status::Pass,
            duration_ms,
            message: None,
        }
    }

    pub fn fail(name: impl Into<String>, duration_ms: u64, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: Status::Fail,
            duration_ms,
            message: Some(message.into()),
        }
    }

    pub fn skip(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: Status::Skip,
            duration_ms: 0,
            message: None,
        }
    }

    pub fn error(name: impl Into<String>, duration_ms: u64, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: Status::Error,
            duration_ms,
            message: Some(message.into()),
        }
    }
}

impl fmt::Display for StageResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} stage {} [{}ms]",
            self.status.symbol(),
            self.name,
            self.duration_ms
        )?;
        if let Some(msg) = &self.message {
            write!(f, " - {msg}")?;
        }
        Ok(())
    }
}

/// Report of one suite run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuiteReport {
    pub suite: String,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub stages: Vec<StageResult>,
    pub checks: Vec<CheckResult>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub total_duration_ms: u64,

    /// Error that ended the run, if any
    pub error: Option<String>,
}

impl SuiteReport {
    pub fn new(
        suite: impl Into<String>,
        run_id: impl Into<String>,
        started_at: DateTime<Utc>,
        stages: Vec<StageResult>,
        checks: Vec<CheckResult>,
        error: Option<String>,
    ) -> Self {
        let completed_at = Utc::now();
        let count = |status: Status| checks.iter().filter(|c| c.status == status).count();

        Self {
            suite: suite.into(),
            run_id: run_id.into(),
            started_at,
            completed_at,
            total: checks.len(),
            passed: count(Status::Pass),
            failed: count(Status::Fail),
            skipped: count(Status::Skip),
            errors: count(Status::Error),
            total_duration_ms: (completed_at - started_at).num_milliseconds().max(0) as u64,
            stages,
            checks,
            error,
        }
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.passed as f64 / self.total as f64) * 100.0
        }
    }

    /// No failed stage, no failed check, no run error
    pub fn is_success(&self) -> bool {
        self.error.is_none()
            && !self.stages.iter().any(|s| s.status.is_failure())
            && !self.checks.iter().any(|c| c.status.is_failure())
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Suite {} (run {})", self.suite, self.run_id)?;
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        for stage in &self.stages {
            writeln!(f, "  {stage}")?;
        }
        for check in &self.checks {
            writeln!(f, "    {check}")?;
        }
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(
            f,
            "Checks: {} | Pass: {} | Fail: {} | Skip: {} | Error: {}",
            self.total, self.passed, self.failed, self.skipped, self.errors
        )?;
        if let Some(error) = &self.error {
            writeln!(f, "Error: {error}")?;
        }
        writeln!(
            f,
            "Result: {} | Duration: {}ms",
            if self.is_success() { "PASS" } else { "FAIL" },
            self.total_duration_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_result_creation() {
        let result = CheckResult::pass("Check mongodb port", "port", 4, 90_000, "Open 27017");
        assert!(result.status.is_success());
        assert_eq!(result.attempts, 4);
        assert_eq!(result.observed.as_deref(), Some("Open 27017"));
    }

    #[test]
    fn test_suite_report_counts() {
        let checks = vec![
            CheckResult::pass("ssh", "command", 1, 10, "Hello, World"),
            CheckResult::fail("mount", "mount", 15, 420_000, "unsuccessful after 15 retries"),
            CheckResult::skip("container", "container", "previous check failed"),
        ];
        let stages = vec![
            StageResult::pass("deploy", 1000),
            StageResult::fail("validate", 500, "check failed"),
            StageResult::pass("cleanup", 800),
        ];

        let report = SuiteReport::new("mongodb", "run-1", Utc::now(), stages, checks, None);
        assert_eq!(report.total, 3);
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert!(!report.is_success());
    }

    #[test]
    fn test_skips_do_not_fail() {
        let report = SuiteReport::new(
            "grpc",
            "run-2",
            Utc::now(),
            vec![StageResult::skip("deploy"), StageResult::pass("validate", 5)],
            vec![CheckResult::pass("grpc", "grpc", 1, 5, "0")],
            None,
        );
        assert!(report.is_success());
        assert_eq!(report.pass_rate(), 100.0);
    }

    #[test]
    fn test_display() {
        let report = SuiteReport::new("rest", "run-3", Utc::now(), vec![], vec![], Some("deploy failed".into()));
        let text = report.to_string();
        assert!(text.contains("Suite rest"));
        assert!(text.contains("Error: deploy failed"));
        assert!(text.contains("Result: FAIL"));
    }
}
