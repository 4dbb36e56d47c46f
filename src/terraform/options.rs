//! Provisioning options

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::{duration_secs, RetryPolicy};

/// Errors that are known to be transient, keyed by regex
const DEFAULT_RETRYABLE_ERRORS: &[(&str, &str)] = &[
    (
        r"(?s).*Error installing provider.*",
        "Failed to download provider plugin",
    ),
    (
        r".*read: connection reset by peer.*",
        "Connection reset by peer",
    ),
    (r".*TLS handshake timeout.*", "TLS handshake timeout"),
    (
        r".*RequestError: send request failed.*",
        "Failed to send request to the cloud API",
    ),
    (r"port 22: Connection refused", "SSH Connection refused"),
    (r"port 22: Connection timed out", "SSH Connection timed out"),
];

/// Options for one provisioning working directory
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TerraformOptions {
    /// Directory holding the root module
    pub terraform_dir: PathBuf,

    /// CLI to invoke
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Input variables, written to a `.tfvars.json` file per command
    #[serde(default)]
    pub vars: Map<String, Value>,

    /// Extra `-var-file` arguments
    #[serde(default)]
    pub var_files: Vec<PathBuf>,

    /// Extra environment for the CLI process
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Regex -> description of errors worth retrying
    #[serde(default = "default_retryable_errors")]
    pub retryable_errors: BTreeMap<String, String>,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_time_between_retries", with = "duration_secs")]
    pub time_between_retries: Duration,

    /// Run `plan` between `init` and `apply` when deploying
    #[serde(default = "default_plan")]
    pub plan: bool,
}

fn default_binary() -> String {
    "terraform".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_time_between_retries() -> Duration {
    Duration::from_secs(5)
}

fn default_plan() -> bool {
    true
}

fn default_retryable_errors() -> BTreeMap<String, String> {
    DEFAULT_RETRYABLE_ERRORS
        .iter()
        .map(|(pattern, description)| (pattern.to_string(), description.to_string()))
        .collect()
}

impl TerraformOptions {
    pub fn new(terraform_dir: impl Into<PathBuf>) -> Self {
        Self {
            terraform_dir: terraform_dir.into(),
            binary: default_binary(),
            vars: Map::new(),
            var_files: Vec::new(),
            env: BTreeMap::new(),
            retryable_errors: default_retryable_errors(),
            max_retries: default_max_retries(),
            time_between_retries: default_time_between_retries(),
            plan: default_plan(),
        }
    }

    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    #[cfg(test)]
    pub fn var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Merge variables, later keys win
    pub fn merge_vars(mut self, vars: Map<String, Value>) -> Self {
        self.vars.extend(vars);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.time_between_retries)
    }

    /// Description of the first retryable pattern found in `output`
    ///
    /// Invalid patterns are skipped; [`TerraformOptions::validate`] reports them.
    pub fn match_retryable(&self, output: &str) -> Option<&str> {
        self.retryable_errors
            .iter()
            .find(|(pattern, _)| {
                Regex::new(pattern)
                    .map(|re| re.is_match(output))
                    .unwrap_or(false)
            })
            .map(|(_, description)| description.as_str())
    }

    /// Check every retryable pattern compiles
    pub fn validate(&self) -> Result<(), String> {
        for pattern in self.retryable_errors.keys() {
            Regex::new(pattern).map_err(|e| format!("Invalid retryable pattern '{pattern}': {e}"))?;
        }
        if self.binary.trim().is_empty() {
            return Err("Provisioning binary must not be empty".to_string());
        }
        Ok(())
    }
}
