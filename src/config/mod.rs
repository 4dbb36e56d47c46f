//! Configuration module
//!
//! Settings come from a config file, then `INFRA_VALIDATE_*` variables,
//! then command-line flags, each overriding the one before.

mod env;
mod file;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::ssh::SshConfig;

pub use env::{print_env_help, AccountContext, EnvConfig, EnvError};
pub use file::{is_yaml_file, ConfigFile};

/// How the private host is reached from the bastion
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HopKind {
    #[default]
    Proxy,
    Nested,
}

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Retry policy for checks that do not set their own
    pub retry: RetryPolicy,

    /// HTTP and gRPC request timeout in seconds
    pub http_timeout_secs: u64,

    /// Parallel suites at once
    pub max_concurrent: usize,

    /// Directory holding `.test-data/`
    pub working_dir: PathBuf,

    /// Where run reports are stored; platform data dir when unset
    pub results_dir: Option<PathBuf>,

    /// Provisioning CLI (`terraform`, `terragrunt`, `tofu`)
    pub terraform_binary: String,

    pub ssh: SshConfig,
    pub hop: HopKind,

    /// Default output format
    pub format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            http_timeout_secs: 30,
            max_concurrent: 4,
            working_dir: PathBuf::from("."),
            results_dir: None,
            terraform_binary: "terraform".to_string(),
            ssh: SshConfig::default(),
            hop: HopKind::Proxy,
            format: "table".to_string(),
        }
    }
}

impl AppConfig {
    /// Apply `INFRA_VALIDATE_*` overrides
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(max_retries) = env.max_retries {
            self.retry = self.retry.with_max_retries(max_retries);
        }
        if let Some(secs) = env.interval_secs.filter(|s| s.is_finite() && *s >= 0.0) {
            self.retry = self.retry.with_interval(Duration::from_secs_f64(secs));
        }
        if let Some(max_concurrent) = env.max_concurrent {
            self.max_concurrent = max_concurrent;
        }
        if let Some(dir) = &env.working_dir {
            self.working_dir = PathBuf::from(dir);
        }
        if let Some(binary) = &env.terraform_binary {
            self.terraform_binary = binary.clone();
        }
        if let Some(user) = &env.ssh_user {
            self.ssh.username = user.clone();
        }
        if let Some(format) = &env.format {
            self.format = format.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.retry.max_retries, 15);
        assert_eq!(config.retry.interval, Duration::from_secs(30));
        assert_eq!(config.ssh.username, "ec2-user");
        assert_eq!(config.hop, HopKind::Proxy);
    }

    #[test]
    fn test_apply_env() {
        let mut config = AppConfig::default();
        config.apply_env(&EnvConfig {
            max_retries: Some(0),
            interval_secs: Some(1.5),
            terraform_binary: Some("tofu".into()),
            ssh_user: Some("ubuntu".into()),
            ..Default::default()
        });

        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.interval, Duration::from_millis(1500));
        assert_eq!(config.terraform_binary, "tofu");
        assert_eq!(config.ssh.username, "ubuntu");
        assert_eq!(config.max_concurrent, 4);
    }

    #[test]
    fn test_partial_yaml() {
        let config: AppConfig = serde_yaml::from_str("hop: nested\nretry:\n  max_retries: 5\n").unwrap();
        assert_eq!(config.hop, HopKind::Nested);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.http_timeout_secs, 30);
    }
}
