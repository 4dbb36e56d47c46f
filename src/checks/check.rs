//! A single validation check

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::{CheckContext, CheckKind};
use crate::models::CheckResult;
use crate::retry::{do_with_retry_expecting, RetryError, RetryPolicy};
use crate::utils::Timer;

/// Description, query, expected answer and retry budget
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub description: String,

    #[serde(flatten)]
    pub kind: CheckKind,

    /// Overrides the suite's retry policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,

    /// Named sub-stage, skipped with `SKIP_<stage>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

impl ValidationCheck {
    pub fn new(description: impl Into<String>, kind: CheckKind) -> Self {
        Self {
            description: description.into(),
            kind,
            retry: None,
            stage: None,
        }
    }

    pub fn policy(&self, default: &RetryPolicy) -> RetryPolicy {
        self.retry.unwrap_or(*default)
    }

    /// Poll until the expected answer comes back or the budget runs out
    pub async fn run(&self, ctx: &CheckContext, default_policy: &RetryPolicy) -> CheckResult {
        let policy = self.policy(default_policy);
        let expected = self.kind.expected();
        let timer = Timer::start(self.description.as_str());

        let result = do_with_retry_expecting(&self.description, &policy, &expected, || {
            self.kind.query(ctx)
        })
        .await;

        match result {
            Ok(attempted) => {
                info!(
                    "✓ {} ({} attempt(s))",
                    self.description, attempted.attempts
                );
                CheckResult::pass(
                    &self.description,
                    self.kind.name(),
                    attempted.attempts,
                    timer.elapsed_ms(),
                    attempted.value,
                )
            }
            Err(err) => {
                error!("✗ {}", err);
                let observed = err.last_error().observed().map(str::to_string);
                let mut result = match &err {
                    RetryError::Exhausted { .. } => CheckResult::fail(
                        &self.description,
                        self.kind.name(),
                        err.attempts(),
                        timer.elapsed_ms(),
                        err.to_string(),
                    ),
                    RetryError::Fatal { .. } => {
                        CheckResult::error(&self.description, self.kind.name(), err.to_string())
                    }
                };
                result.attempts = err.attempts();
                result.duration_ms = timer.elapsed_ms();
                result.with_observed(observed)
            }
        }
    }
}
