//! Infrastructure configuration errors

use thiserror::Error;

/// Invalid infrastructure configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("Unknown instance type '{0}'")]
    UnknownInstance(String),

    #[error("Missing {0}")]
    Missing(String),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
