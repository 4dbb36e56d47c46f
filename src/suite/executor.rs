//! Runs many suites
//!
//! Suites marked `parallel` run concurrently up to `max_concurrent`. The
//! others share unique resource names or quota-limited accounts, so they run
//! one at a time after the parallel batch.

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::{SuiteDefinition, SuiteRunner};
use crate::models::SuiteReport;

pub struct SuiteExecutor {
    runner: SuiteRunner,
    max_concurrent: usize,
}

impl SuiteExecutor {
    pub fn new(runner: SuiteRunner) -> Self {
        let max_concurrent = runner.config().max_concurrent;
        Self {
            runner,
            max_concurrent,
        }
    }

    /// Override the parallel limit from the config
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// Parallel suites first, then serial suites; reports keep file order within each group
    pub async fn run_all(&self, suites: &[SuiteDefinition]) -> Vec<SuiteReport> {
        let (parallel, serial): (Vec<&SuiteDefinition>, Vec<&SuiteDefinition>) =
            suites.iter().partition(|suite| suite.parallel);

        info!(
            "Running {} suite(s): {} parallel (max {} concurrent), {} serial",
            suites.len(),
            parallel.len(),
            self.max_concurrent.max(1),
            serial.len()
        );

        let semaphore = Semaphore::new(self.max_concurrent.max(1));
        let mut reports: Vec<SuiteReport> = join_all(parallel.into_iter().map(|suite| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await;
                debug!("Starting parallel suite {}", suite.name);
                self.runner.run(suite).await
            }
        }))
        .await;

        for suite in serial {
            reports.push(self.runner.run(suite).await);
        }

        let passed = reports.iter().filter(|r| r.is_success()).count();
        info!("{}/{} suite(s) passed", passed, reports.len());
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::stage::{StageSet, CLEANUP, DEPLOY, VALIDATE};
    use tempfile::tempdir;

    fn suite(name: &str, parallel: bool, dir: &std::path::Path) -> SuiteDefinition {
        serde_yaml::from_str(&format!(
            "name: {name}\nparallel: {parallel}\nterraform:\n  terraform_dir: {}\nchecks:\n  - description: noop\n    kind: tcp\n    host: 127.0.0.1\n    port: 1\n",
            dir.display()
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_serial_suites_run_after_parallel_batch() {
        let dir = tempdir().unwrap();
        let suites = vec![
            suite("serial-a", false, dir.path()),
            suite("parallel-a", true, dir.path()),
            suite("serial-b", false, dir.path()),
            suite("parallel-b", true, dir.path()),
        ];

        let config = AppConfig {
            working_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let runner = SuiteRunner::new(config)
            .unwrap()
            .with_stages(StageSet::new().skip(DEPLOY).skip(VALIDATE).skip(CLEANUP));
        let executor = SuiteExecutor::new(runner).with_max_concurrent(2);

        let reports = executor.run_all(&suites).await;
        let names: Vec<&str> = reports.iter().map(|r| r.suite.as_str()).collect();

        assert_eq!(names.len(), 4);
        assert_eq!(names, vec!["parallel-a", "parallel-b", "serial-a", "serial-b"]);
        assert!(reports.iter().all(|r| r.is_success()));
    }
}
