//! Results storage and retrieval
//!
//! Every suite run is kept as one JSON file under
//! `<base>/<suite>/<run_id>.json`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::models::SuiteReport;

/// Stored suite run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredRun {
    pub report: SuiteReport,

    /// Environment info
    pub environment: EnvironmentInfo,
}

/// Environment information
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    /// Operating system
    pub os: String,

    /// Architecture
    pub arch: String,

    /// Provisioning CLI used for the run
    pub terraform_binary: String,

    /// Tool version
    pub tool_version: String,
}

impl EnvironmentInfo {
    pub fn new(terraform_binary: impl Into<String>) -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            terraform_binary: terraform_binary.into(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl StoredRun {
    pub fn new(report: SuiteReport, environment: EnvironmentInfo) -> Self {
        Self {
            report,
            environment,
        }
    }
}

/// Generate unique run ID
pub fn generate_run_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let random: u32 = rand::rng().random_range(0..10000);
    format!("{timestamp}_{random:04}")
}

/// Results storage manager
pub struct ResultsStorage {
    /// Base directory for results
    base_dir: PathBuf,
}

impl ResultsStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Create with default directory
    pub fn default_dir() -> Self {
        let base_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("infra-validate")
            .join("results");
        Self::new(base_dir)
    }

    /// Configured directory, or the default one
    pub fn from_config(results_dir: Option<&Path>) -> Self {
        match results_dir {
            Some(dir) => Self::new(dir),
            None => Self::default_dir(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn suite_dir(&self, suite: &str) -> PathBuf {
        self.base_dir.join(suite.to_lowercase())
    }

    fn run_path(&self, suite: &str, run_id: &str) -> PathBuf {
        self.suite_dir(suite).join(format!("{run_id}.json"))
    }

    pub fn save(&self, run: &StoredRun) -> Result<PathBuf> {
        let suite_dir = self.suite_dir(&run.report.suite);
        fs::create_dir_all(&suite_dir)
            .with_context(|| format!("Failed to create {}", suite_dir.display()))?;

        let path = self.run_path(&run.report.suite, &run.report.run_id);
        let file = File::create(&path).context("Failed to create results file")?;
        let writer = BufWriter::new(file);

        serde_json::to_writer_pretty(writer, run).context("Failed to write results")?;

        info!("Saved results to {}", path.display());
        Ok(path)
    }

    pub fn load(&self, suite: &str, run_id: &str) -> Result<StoredRun> {
        let path = self.run_path(suite, run_id);
        let run = self
            .load_from_path(&path)
            .with_context(|| format!("No run {run_id} for suite {suite}"))?;

        debug!("Loaded results from {}", path.display());
        Ok(run)
    }

    /// Load all runs for a suite, newest first
    pub fn load_suite(&self, suite: &str) -> Result<Vec<StoredRun>> {
        let suite_dir = self.suite_dir(suite);
        if !suite_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(&suite_dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().map(|e| e == "json").unwrap_or(false) {
                match self.load_from_path(&path) {
                    Ok(run) => runs.push(run),
                    Err(e) => {
                        debug!("Failed to load {}: {}", path.display(), e);
                    }
                }
            }
        }

        runs.sort_by(|a, b| b.report.started_at.cmp(&a.report.started_at));
        Ok(runs)
    }

    pub fn load_from_path(&self, path: &Path) -> Result<StoredRun> {
        let file = File::open(path).context("Failed to open results file")?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).context("Failed to parse results")
    }

    /// List all suites with results
    pub fn list_suites(&self) -> Result<Vec<String>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut suites = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    suites.push(name.to_string());
                }
            }
        }

        suites.sort();
        Ok(suites)
    }

    /// Brief info on every run of a suite, newest first
    pub fn list_runs(&self, suite: &str) -> Result<Vec<RunInfo>> {
        Ok(self
            .load_suite(suite)?
            .into_iter()
            .map(|run| RunInfo {
                passed: run.report.is_success(),
                pass_rate: run.report.pass_rate(),
                id: run.report.run_id,
                suite: run.report.suite,
                started_at: run.report.started_at,
            })
            .collect())
    }

    pub fn latest(&self, suite: &str) -> Result<Option<StoredRun>> {
        let runs = self.load_suite(suite)?;
        Ok(runs.into_iter().next())
    }

    /// Export run to a file
    pub fn export(&self, run: &StoredRun, path: &Path, format: ExportFormat) -> Result<()> {
        match format {
            ExportFormat::Json => {
                let file = File::create(path)?;
                let writer = BufWriter::new(file);
                serde_json::to_writer_pretty(writer, run)?;
            }
            ExportFormat::Csv => {
                let mut writer = csv::Writer::from_path(path)?;

                writer.write_record([
                    "suite",
                    "run_id",
                    "description",
                    "kind",
                    "status",
                    "attempts",
                    "duration_ms",
                    "observed",
                    "message",
                ])?;

                for check in &run.report.checks {
                    writer.write_record([
                        run.report.suite.clone(),
                        run.report.run_id.clone(),
                        check.description.clone(),
                        check.kind.clone(),
                        check.status.to_string(),
                        check.attempts.to_string(),
                        check.duration_ms.to_string(),
                        check.observed.clone().unwrap_or_default(),
                        check.message.clone().unwrap_or_default(),
                    ])?;
                }
                writer.flush()?;
            }
        }

        info!("Exported results to {}", path.display());
        Ok(())
    }
}

/// Brief run information
#[derive(Clone, Debug)]
pub struct RunInfo {
    pub id: String,
    pub suite: String,
    pub started_at: DateTime<Utc>,
    pub passed: bool,
    pub pass_rate: f64,
}

/// Export format
#[derive(Clone, Copy, Debug)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }

    pub fn from_extension(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CheckResult, StageResult};
    use chrono::Duration;
    use tempfile::tempdir;

    fn report(suite: &str, run_id: &str, minutes_ago: i64) -> SuiteReport {
        SuiteReport::new(
            suite,
            run_id,
            Utc::now() - Duration::minutes(minutes_ago),
            vec![StageResult::pass("deploy", 10)],
            vec![
                CheckResult::pass("port open", "port", 4, 120, "Open 27017"),
                CheckResult::fail("bucket mounted", "mount", 3, 90, "3 attempts"),
            ],
            None,
        )
    }

    #[test]
    fn test_generate_run_id() {
        let id = generate_run_id();
        assert_eq!(id.len(), "20261019_120000_0000".len());
        assert!(id.chars().all(|c| c.is_ascii_digit() || c == '_'));
    }

    #[test]
    fn test_save_and_list() {
        let dir = tempdir().unwrap();
        let storage = ResultsStorage::new(dir.path());

        let env = EnvironmentInfo::new("terraform");
        storage.save(&StoredRun::new(report("MongoDB", "old", 10), env.clone())).unwrap();
        storage.save(&StoredRun::new(report("MongoDB", "new", 1), env)).unwrap();

        assert_eq!(storage.list_suites().unwrap(), vec!["mongodb".to_string()]);

        let runs = storage.list_runs("mongodb").unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, "new");
        assert!(!runs[0].passed);
        assert!((runs[0].pass_rate - 50.0).abs() < f64::EPSILON);

        let latest = storage.latest("MongoDB").unwrap().unwrap();
        assert_eq!(latest.report.run_id, "new");
        assert_eq!(storage.load("mongodb", "old").unwrap().report.checks.len(), 2);
        assert!(storage.load("mongodb", "missing").is_err());
    }

    #[test]
    fn test_csv_export() {
        let dir = tempdir().unwrap();
        let storage = ResultsStorage::new(dir.path());
        let run = StoredRun::new(report("grpc", "r1", 0), EnvironmentInfo::new("tofu"));

        let path = dir.path().join("export.csv");
        storage.export(&run, &path, ExportFormat::Csv).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("suite,run_id,description"));
        assert!(lines[1].contains("Open 27017"));
        assert!(lines[2].contains("FAIL"));
    }

    #[test]
    fn test_export_format() {
        assert!(matches!(ExportFormat::parse("JSON"), Some(ExportFormat::Json)));
        assert!(matches!(
            ExportFormat::from_extension(Path::new("out.csv")),
            Some(ExportFormat::Csv)
        ));
        assert!(ExportFormat::parse("unknown").is_none());
    }
}
