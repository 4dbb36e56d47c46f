//! Retry loop
//!
//! Unreachable targets and wrong answers consume the same budget; the
//! failure report keeps separate counts of each.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::{AttemptError, RetryError, RetryPolicy};

/// Value produced by a successful retry loop
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,

    /// Number of invocations, including the successful one
    pub attempts: u32,

    /// Wall time spent in the loop
    pub elapsed: Duration,
}

/// Invoke `query` until it returns `Ok` or the budget is exhausted
pub async fn do_with_retry<T, F, Fut>(
    description: &str,
    policy: &RetryPolicy,
    mut query: F,
) -> Result<Attempted<T>, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let max_retries = policy.max_retries.max(1);
    let start = Instant::now();
    let mut unreachable = 0;
    let mut answered_wrong = 0;
    let mut attempt = 0;

    loop {
        attempt += 1;
        info!("{} (attempt {}/{})", description, attempt, max_retries);

        let error = match query().await {
            Ok(value) => {
                debug!("{} succeeded after {} attempt(s)", description, attempt);
                return Ok(Attempted {
                    value,
                    attempts: attempt,
                    elapsed: start.elapsed(),
                });
            }
            Err(e) => e,
        };

        if !error.is_retryable() {
            warn!("{} aborted: {}", description, error);
            return Err(RetryError::Fatal {
                description: description.to_string(),
                attempt,
                error,
            });
        }

        if error.is_unreachable() {
            unreachable += 1;
        } else {
            answered_wrong += 1;
        }

        if attempt >= max_retries {
            return Err(RetryError::Exhausted {
                description: description.to_string(),
                attempts: attempt,
                unreachable,
                answered_wrong,
                last_error: error,
            });
        }

        warn!(
            "{} returned an error: {}. Sleeping for {:?} and will try again.",
            description, error, policy.interval
        );
        sleep(policy.interval).await;
    }
}

/// Invoke `query` until its trimmed output equals `expected`
pub async fn do_with_retry_expecting<F, Fut>(
    description: &str,
    policy: &RetryPolicy,
    expected: &str,
    mut query: F,
) -> Result<Attempted<String>, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, AttemptError>>,
{
    let expected = expected.trim();

    do_with_retry(description, policy, || {
        let observed = query();
        async move {
            let observed = observed.await?;
            let observed = observed.trim();
            if observed == expected {
                Ok(observed.to_string())
            } else {
                Err(AttemptError::mismatch(expected, observed))
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn policy(max_retries: u32, secs: u64) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_secs(secs))
    }

    #[tokio::test(start_paused = true)]
    async fn test_port_opens_on_fourth_attempt() {
        let mut calls = 0u32;
        let start = Instant::now();

        let result = do_with_retry_expecting("Check mongodb port", &policy(15, 30), "Open 27017", || {
            calls += 1;
            let n = calls;
            async move {
                if n < 4 {
                    Ok("Close 27017\n".to_string())
                } else {
                    Ok("Open 27017\n".to_string())
                }
            }
        })
        .await;

        let attempted = assert_ok!(result);
        assert_eq!(attempted.value, "Open 27017");
        assert_eq!(attempted.attempts, 4);
        assert_eq!(calls, 4);
        assert_eq!(start.elapsed(), Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_error_exhausts_budget() {
        let mut calls = 0u32;
        let start = Instant::now();

        let result: Result<Attempted<String>, _> = do_with_retry("SSH to private host", &policy(5, 1), || {
            calls += 1;
            async { Err(AttemptError::Unreachable("port 22: Connection refused".to_string())) }
        })
        .await;

        let err = assert_err!(result);
        assert_eq!(calls, 5);
        assert!(start.elapsed() >= Duration::from_secs(4));
        match err {
            RetryError::Exhausted {
                attempts,
                unreachable,
                answered_wrong,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 5);
                assert_eq!(unreachable, 5);
                assert_eq!(answered_wrong, 0);
                assert!(last_error.to_string().contains("Connection refused"));
            }
            other => panic!("Expected exhausted budget, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_matching_reports_last_value() {
        let mut calls = 0u32;

        let result = do_with_retry_expecting("Check container", &policy(3, 10), "scraper-mongodb", || {
            calls += 1;
            let n = calls;
            async move { Ok(format!("other-{n}")) }
        })
        .await;

        let err = assert_err!(result);
        assert_eq!(calls, 3);
        assert_eq!(err.attempts(), 3);
        assert_eq!(err.last_error().observed(), Some("other-3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_and_mismatch_share_budget() {
        let mut calls = 0u32;

        let result = do_with_retry_expecting("Check mount", &policy(4, 1), "s3fs fuse.s3fs /mys3bucket", || {
            calls += 1;
            let n = calls;
            async move {
                if n % 2 == 1 {
                    Err(AttemptError::Unreachable("timed out".to_string()))
                } else {
                    Ok("overlay overlay /".to_string())
                }
            }
        })
        .await;

        match assert_err!(result) {
            RetryError::Exhausted {
                unreachable,
                answered_wrong,
                ..
            } => {
                assert_eq!(unreachable, 2);
                assert_eq!(answered_wrong, 2);
            }
            other => panic!("Expected exhausted budget, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_succeeding_query_is_idempotent() {
        for _ in 0..2 {
            let mut calls = 0u32;
            let start = Instant::now();
            let result = do_with_retry_expecting("Echo", &policy(15, 30), "Hello, World", || {
                calls += 1;
                async { Ok("Hello, World".to_string()) }
            })
            .await;

            assert_eq!(assert_ok!(result).attempts, 1);
            assert_eq!(calls, 1);
            assert_eq!(start.elapsed(), Duration::ZERO);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_stops_immediately() {
        let mut calls = 0u32;

        let result: Result<Attempted<()>, _> = do_with_retry("Bad query", &policy(10, 5), || {
            calls += 1;
            async { Err(AttemptError::Fatal("ssh binary not found".to_string())) }
        })
        .await;

        assert!(matches!(assert_err!(result), RetryError::Fatal { attempt: 1, .. }));
        assert_eq!(calls, 1);
    }
}
