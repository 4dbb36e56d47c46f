//! Attempt and retry errors

use thiserror::Error;

/// Outcome of a single failed attempt
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum AttemptError {
    /// The target (or the hop in front of it) could not be reached
    #[error("Unreachable: {0}")]
    Unreachable(String),

    /// The target answered, but the command exited non-zero
    #[error("Command exited with code {exit_code}: {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    /// The target answered with something other than the expected value
    #[error("Expected '{expected}' but got '{actual}'")]
    Mismatch { expected: String, actual: String },

    /// Retrying cannot help (bad input, missing binary, ...)
    #[error("Fatal: {0}")]
    Fatal(String),
}

impl AttemptError {
    pub fn mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        AttemptError::Mismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, AttemptError::Fatal(_))
    }

    /// True when the attempt never got an answer from the target
    pub fn is_unreachable(&self) -> bool {
        matches!(self, AttemptError::Unreachable(_))
    }

    /// Last value the target produced, if it answered at all
    pub fn observed(&self) -> Option<&str> {
        match self {
            AttemptError::Mismatch { actual, .. } => Some(actual),
            AttemptError::CommandFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// Failure of a whole retry loop
#[derive(Error, Clone, Debug)]
pub enum RetryError {
    #[error("'{description}' unsuccessful after {attempts} retries ({unreachable} unreachable, {answered_wrong} answered wrong): {last_error}")]
    Exhausted {
        description: String,
        attempts: u32,
        unreachable: u32,
        answered_wrong: u32,
        last_error: AttemptError,
    },

    #[error("'{description}' failed on attempt {attempt} with a non-retryable error: {error}")]
    Fatal {
        description: String,
        attempt: u32,
        error: AttemptError,
    },
}

impl RetryError {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Fatal { attempt, .. } => *attempt,
        }
    }

    pub fn last_error(&self) -> &AttemptError {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
            RetryError::Fatal { error, .. } => error,
        }
    }
}
