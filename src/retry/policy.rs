//! Retry budget and interval

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// How many times a check is attempted and how long to wait in between
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawRetryPolicy")]
pub struct RetryPolicy {
    /// Maximum number of attempts (at least 1)
    pub max_retries: u32,

    /// Fixed wait between two attempts
    #[serde(with = "duration_secs")]
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 15,
            interval: Duration::from_secs(30),
        }
    }
}

/// Policy as written in a file, before the budget is clamped
#[derive(Deserialize)]
#[serde(default)]
struct RawRetryPolicy {
    max_retries: u32,
    #[serde(with = "duration_secs")]
    interval: Duration,
}

impl Default for RawRetryPolicy {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            interval: policy.interval,
        }
    }
}

impl From<RawRetryPolicy> for RetryPolicy {
    fn from(raw: RawRetryPolicy) -> Self {
        RetryPolicy::new(raw.max_retries, raw.interval)
    }
}

impl RetryPolicy {
    /// Create a policy; a zero budget is raised to a single attempt
    pub fn new(max_retries: u32, interval: Duration) -> Self {
        if max_retries == 0 {
            warn!("Retry budget of 0 raised to 1 attempt");
        }
        Self {
            max_retries: max_retries.max(1),
            interval,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Upper bound on the time spent sleeping when every attempt fails
    pub fn total_wait(&self) -> Duration {
        self.interval * self.max_retries.saturating_sub(1)
    }
}

/// Durations in config files are plain seconds (fractions allowed)
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom(format!(
                "duration must be a non-negative number of seconds, got {secs}"
            )));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_budget_is_one_attempt() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.max_retries, 1);
        assert_eq!(policy.total_wait(), Duration::ZERO);
    }

    #[test]
    fn test_total_wait() {
        let policy = RetryPolicy::new(5, Duration::from_secs(2));
        assert_eq!(policy.total_wait(), Duration::from_secs(8));
    }

    #[test]
    fn test_policy_from_yaml() {
        let policy: RetryPolicy = serde_yaml::from_str("max_retries: 3\ninterval: 0.5\n").unwrap();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.interval, Duration::from_millis(500));
    }

    #[test]
    fn test_partial_policy_uses_defaults() {
        let policy: RetryPolicy = serde_yaml::from_str("max_retries: 3\n").unwrap();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.interval, Duration::from_secs(30));
    }

    #[test]
    fn test_zero_budget_from_yaml() {
        let policy: RetryPolicy = serde_yaml::from_str("max_retries: 0\ninterval: 2\n").unwrap();
        assert_eq!(policy.max_retries, 1);
        assert_eq!(policy.interval, Duration::from_secs(2));

        let policy: RetryPolicy = serde_json::from_str(r#"{"max_retries": 0}"#).unwrap();
        assert_eq!(policy, RetryPolicy::new(1, Duration::from_secs(30)));
    }

    #[test]
    fn test_negative_interval_rejected() {
        let result: Result<RetryPolicy, _> = serde_yaml::from_str("max_retries: 3\ninterval: -1\n");
        assert!(result.is_err());
    }
}
