//! Output formatters for suite reports
//!
//! Provides table, JSON, CSV, and summary output formats.

use std::io::Write;
use std::str::FromStr;

use crate::models::{CheckResult, Status, SuiteReport};

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Ok(OutputFormat::JsonPretty),
            "csv" => Ok(OutputFormat::Csv),
            "summary" => Ok(OutputFormat::Summary),
            other => Err(format!(
                "unknown output format '{other}' (expected table, json, json-pretty, csv or summary)"
            )),
        }
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    fn status_label(&self, status: Status) -> String {
        let label = format!("{} {}", status.symbol(), status);
        if !self.colorize {
            return label;
        }
        let color = match status {
            Status::Pass => "32",
            Status::Fail | Status::Error => "31",
            Status::Skip => "33",
        };
        format!("\x1b[{color}m{label}\x1b[0m")
    }

    /// Format a single check result
    pub fn format_check(&self, check: &CheckResult) -> String {
        match self.format {
            OutputFormat::Table => self.format_check_table(check),
            OutputFormat::Json => serde_json::to_string(check).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(check).unwrap_or_default(),
            OutputFormat::Csv => format_check_csv("", check),
            OutputFormat::Summary => format!(
                "{} {} ({} attempt(s), {}ms)",
                check.status.symbol(),
                check.description,
                check.attempts,
                check.duration_ms
            ),
        }
    }

    fn format_check_table(&self, check: &CheckResult) -> String {
        let mut line = format!(
            "{:40} {:9} {} [{:>3} tries, {:>7}ms]",
            truncate(&check.description, 40),
            check.kind,
            self.status_label(check.status),
            check.attempts,
            check.duration_ms
        );
        if check.status.is_failure() {
            if let Some(message) = &check.message {
                line.push_str(&format!("\n    {message}"));
            }
        }
        line
    }

    /// Format one suite report
    pub fn format_report(&self, report: &SuiteReport) -> String {
        match self.format {
            OutputFormat::Table => self.format_report_table(report),
            OutputFormat::Json => serde_json::to_string(report).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Csv => {
                let mut output = String::from(CSV_HEADER);
                for check in &report.checks {
                    output.push_str(&format_check_csv(&report.suite, check));
                    output.push('\n');
                }
                output
            }
            OutputFormat::Summary => self.format_report_brief(report),
        }
    }

    fn format_report_table(&self, report: &SuiteReport) -> String {
        let mut output = String::new();

        output.push_str("\n╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!("║  Suite {:38} run {:15} ║\n", truncate(&report.suite, 38), report.run_id));
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        for stage in &report.stages {
            output.push_str(&format!(
                "  stage {:10} {} [{}ms]\n",
                stage.name,
                self.status_label(stage.status),
                stage.duration_ms
            ));
        }
        if !report.checks.is_empty() {
            output.push_str("  ──────────────────────────────────────────────────────────\n");
        }
        for check in &report.checks {
            output.push_str(&format!("  {}\n", self.format_check_table(check)));
        }

        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        output.push_str(&format!(
            "  Total: {:2} | Pass: {:2} | Fail: {:2} | Skip: {:2} | Error: {:2}\n",
            report.total, report.passed, report.failed, report.skipped, report.errors
        ));
        output.push_str(&format!(
            "  Pass Rate: {:5.1}% | Duration: {}ms\n",
            report.pass_rate(),
            report.total_duration_ms
        ));
        if let Some(error) = &report.error {
            output.push_str(&format!("  Error: {error}\n"));
        }
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        output
    }

    fn format_report_brief(&self, report: &SuiteReport) -> String {
        let verdict = if report.is_success() {
            Status::Pass
        } else {
            Status::Fail
        };
        format!(
            "{} {}: {}/{} checks passed ({:.1}%) in {}ms",
            self.status_label(verdict),
            report.suite,
            report.passed,
            report.total,
            report.pass_rate(),
            report.total_duration_ms
        )
    }

    /// Format every report, with an overview when there is more than one
    pub fn format_reports(&self, reports: &[SuiteReport]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string(reports).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(reports).unwrap_or_default(),
            OutputFormat::Csv => {
                let mut output = String::from(CSV_HEADER);
                for report in reports {
                    for check in &report.checks {
                        output.push_str(&format_check_csv(&report.suite, check));
                        output.push('\n');
                    }
                }
                output
            }
            OutputFormat::Summary => reports
                .iter()
                .map(|r| self.format_report_brief(r))
                .collect::<Vec<_>>()
                .join("\n"),
            OutputFormat::Table => {
                let mut output: String = reports.iter().map(|r| self.format_report_table(r)).collect();
                if reports.len() > 1 {
                    output.push_str(&self.format_overview(reports));
                }
                output
            }
        }
    }

    fn format_overview(&self, reports: &[SuiteReport]) -> String {
        let mut output = String::new();

        output.push_str("\n┌─────────────────────────┬───────┬───────┬───────┬──────────┬───────────────┐\n");
        output.push_str("│ Suite                   │ Pass  │ Fail  │ Total │ Result   │ Duration      │\n");
        output.push_str("├─────────────────────────┼───────┼───────┼───────┼──────────┼───────────────┤\n");

        for report in reports {
            let result = if report.is_success() { "PASS" } else { "FAIL" };
            let result = if self.colorize {
                let color = if report.is_success() { "32" } else { "31" };
                format!("\x1b[{color}m{result:>8}\x1b[0m")
            } else {
                format!("{result:>8}")
            };

            output.push_str(&format!(
                "│ {:23} │ {:5} │ {:5} │ {:5} │ {} │ {:>10}ms │\n",
                truncate(&report.suite, 23),
                report.passed,
                report.failed + report.errors,
                report.total,
                result,
                report.total_duration_ms
            ));
        }

        output.push_str("└─────────────────────────┴───────┴───────┴───────┴──────────┴───────────────┘\n");
        output
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

const CSV_HEADER: &str = "suite,description,kind,status,attempts,duration_ms,message\n";

fn format_check_csv(suite: &str, check: &CheckResult) -> String {
    format!(
        "{},\"{}\",{},{},{},{},\"{}\"",
        suite,
        check.description.replace('"', "\"\""),
        check.kind,
        check.status,
        check.attempts,
        check.duration_ms,
        check.message.as_deref().unwrap_or("").replace('"', "\"\"")
    )
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

/// Write reports to a file, uncolored
pub fn write_reports_to_file(
    path: &std::path::Path,
    reports: &[SuiteReport],
    format: OutputFormat,
) -> anyhow::Result<()> {
    let formatter = ResultFormatter::new(format).no_color();
    let content = formatter.format_reports(reports);

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StageResult;
    use chrono::Utc;

    fn report(suite: &str) -> SuiteReport {
        SuiteReport::new(
            suite,
            "20261019_120000_0001",
            Utc::now(),
            vec![StageResult::pass("deploy", 10), StageResult::pass("validate", 20)],
            vec![
                CheckResult::pass("Port 27017 is open", "port", 4, 120, "Open 27017"),
                CheckResult::fail("Bucket \"data\" mounted", "mount", 15, 900, "gave up"),
            ],
            None,
        )
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert_eq!("TABLE".parse::<OutputFormat>(), Ok(OutputFormat::Table));
        assert!("unknown".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_table_shows_failure_message() {
        let output = ResultFormatter::new(OutputFormat::Table)
            .no_color()
            .format_report(&report("mongodb"));
        assert!(output.contains("Suite mongodb"));
        assert!(output.contains("✓ PASS"));
        assert!(output.contains("✗ FAIL"));
        assert!(output.contains("gave up"));
        assert!(!output.contains("\x1b["));
    }

    #[test]
    fn test_csv_escapes_quotes() {
        let output = ResultFormatter::new(OutputFormat::Csv).format_report(&report("mongodb"));
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].contains("\"Bucket \"\"data\"\" mounted\""));
    }

    #[test]
    fn test_summary_and_overview() {
        let reports = vec![report("mongodb"), report("grpc")];
        let summary = ResultFormatter::new(OutputFormat::Summary)
            .no_color()
            .format_reports(&reports);
        assert_eq!(summary.lines().count(), 2);
        assert!(summary.contains("mongodb: 1/2 checks passed (50.0%)"));

        let table = ResultFormatter::new(OutputFormat::Table)
            .no_color()
            .format_reports(&reports);
        assert!(table.contains("│ Suite"));
    }

    #[test]
    fn test_json_round_trips_report() {
        let json = ResultFormatter::new(OutputFormat::Json).format_report(&report("grpc"));
        let parsed: SuiteReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.suite, "grpc");
        assert_eq!(parsed.failed, 1);
    }
}
