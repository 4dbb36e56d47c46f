//! Provisioning errors

use thiserror::Error;

use crate::retry::RetryError;

#[derive(Error, Debug)]
pub enum TerraformError {
    #[error("terraform {command} failed: {source}")]
    Command {
        command: String,
        #[source]
        source: RetryError,
    },

    #[error("Failed to prepare variables: {0}")]
    Vars(String),

    #[error("Output '{name}' is invalid: {reason}")]
    Output { name: String, reason: String },
}
