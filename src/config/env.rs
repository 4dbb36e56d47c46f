//! Environment variable configuration
//!
//! Two sources: `INFRA_VALIDATE_*` overrides for the tool itself, and the
//! cloud account context every suite runs against.

use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

/// Environment variable prefix
const ENV_PREFIX: &str = "INFRA_VALIDATE";

pub const AWS_PROFILE_NAME: &str = "AWS_PROFILE_NAME";
pub const AWS_ACCOUNT_ID: &str = "AWS_ACCOUNT_ID";
pub const AWS_REGION_NAME: &str = "AWS_REGION_NAME";
pub const DOMAIN_NAME: &str = "DOMAIN_NAME";
pub const DOMAIN_SUFFIX: &str = "DOMAIN_SUFFIX";
pub const VPC_ID: &str = "VPC_ID";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvError {
    #[error("Missing environment variable(s): {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Cloud account a suite is deployed into
///
/// Read once at suite start and passed by reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountContext {
    pub account_name: String,
    pub account_id: String,
    pub region: String,
    pub domain_name: Option<String>,
    pub domain_suffix: Option<String>,
    pub vpc_id: Option<String>,
}

impl AccountContext {
    #[cfg(test)]
    pub fn new(
        account_name: impl Into<String>,
        account_id: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            account_name: account_name.into(),
            account_id: account_id.into(),
            region: region.into(),
            domain_name: None,
            domain_suffix: None,
            vpc_id: None,
        }
    }

    pub fn from_env() -> Result<Self, EnvError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; every missing required key is reported
    pub fn from_lookup<F>(lookup: F) -> Result<Self, EnvError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let required = [AWS_PROFILE_NAME, AWS_ACCOUNT_ID, AWS_REGION_NAME];
        let missing: Vec<String> = required
            .iter()
            .filter(|key| get(**key).is_none())
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(EnvError::Missing(missing));
        }

        let account_id = get(AWS_ACCOUNT_ID).unwrap_or_default();
        if !account_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(EnvError::Invalid {
                name: AWS_ACCOUNT_ID.to_string(),
                reason: format!("'{account_id}' is not numeric"),
            });
        }

        Ok(Self {
            account_name: get(AWS_PROFILE_NAME).unwrap_or_default(),
            account_id,
            region: get(AWS_REGION_NAME).unwrap_or_default(),
            domain_name: get(DOMAIN_NAME),
            domain_suffix: get(DOMAIN_SUFFIX),
            vpc_id: get(VPC_ID),
        })
    }

    /// `<DOMAIN_NAME>.<DOMAIN_SUFFIX>`
    pub fn domain(&self) -> Result<String, EnvError> {
        match (&self.domain_name, &self.domain_suffix) {
            (Some(name), Some(suffix)) => Ok(format!("{name}.{suffix}")),
            (name, suffix) => Err(EnvError::Missing(
                [(DOMAIN_NAME, name.is_none()), (DOMAIN_SUFFIX, suffix.is_none())]
                    .iter()
                    .filter(|(_, missing)| *missing)
                    .map(|(key, _)| key.to_string())
                    .collect(),
            )),
        }
    }

    pub fn require_vpc_id(&self) -> Result<&str, EnvError> {
        self.vpc_id
            .as_deref()
            .ok_or_else(|| EnvError::Missing(vec![VPC_ID.to_string()]))
    }

    pub fn print_summary(&self) {
        let unset = || "(unset)".to_string();
        println!("Account Context:");
        println!("  Account: {} ({})", self.account_name, self.account_id);
        println!("  Region:  {}", self.region);
        println!("  Domain:  {}", self.domain().unwrap_or_else(|_| unset()));
        println!("  VPC:     {}", self.vpc_id.clone().unwrap_or_else(unset));
    }
}

/// Tool overrides from `INFRA_VALIDATE_*`
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Config file from INFRA_VALIDATE_CONFIG
    pub config_file: Option<String>,
    /// Retry budget from INFRA_VALIDATE_MAX_RETRIES
    pub max_retries: Option<u32>,
    /// Interval seconds from INFRA_VALIDATE_INTERVAL
    pub interval_secs: Option<f64>,
    /// Concurrency from INFRA_VALIDATE_MAX_CONCURRENT
    pub max_concurrent: Option<usize>,
    /// INFRA_VALIDATE_WORKING_DIR
    pub working_dir: Option<String>,
    /// INFRA_VALIDATE_TERRAFORM_BINARY
    pub terraform_binary: Option<String>,
    /// INFRA_VALIDATE_SSH_USER
    pub ssh_user: Option<String>,
    /// INFRA_VALIDATE_FORMAT
    pub format: Option<String>,
}

impl EnvConfig {
    pub fn load() -> Self {
        Self {
            config_file: get_env("CONFIG"),
            max_retries: get_env_parse("MAX_RETRIES"),
            interval_secs: get_env_parse("INTERVAL"),
            max_concurrent: get_env_parse("MAX_CONCURRENT"),
            working_dir: get_env("WORKING_DIR"),
            terraform_binary: get_env("TERRAFORM_BINARY"),
            ssh_user: get_env("SSH_USER"),
            format: get_env("FORMAT"),
        }
    }

    pub fn has_any(&self) -> bool {
        self.config_file.is_some()
            || self.max_retries.is_some()
            || self.interval_secs.is_some()
            || self.max_concurrent.is_some()
            || self.working_dir.is_some()
            || self.terraform_binary.is_some()
            || self.ssh_user.is_some()
            || self.format.is_some()
    }

    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {}_CONFIG:           {:?}", ENV_PREFIX, self.config_file);
        println!("  {}_MAX_RETRIES:      {:?}", ENV_PREFIX, self.max_retries);
        println!("  {}_INTERVAL:         {:?}", ENV_PREFIX, self.interval_secs);
        println!("  {}_MAX_CONCURRENT:   {:?}", ENV_PREFIX, self.max_concurrent);
        println!("  {}_WORKING_DIR:      {:?}", ENV_PREFIX, self.working_dir);
        println!("  {}_TERRAFORM_BINARY: {:?}", ENV_PREFIX, self.terraform_binary);
        println!("  {}_SSH_USER:         {:?}", ENV_PREFIX, self.ssh_user);
        println!("  {}_FORMAT:           {:?}", ENV_PREFIX, self.format);
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Builder for setting environment variables in tests
#[cfg(test)]
#[derive(Default)]
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

#[cfg(test)]
impl EnvBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `INFRA_VALIDATE_<name>`
    pub fn prefixed(mut self, name: &str, value: impl ToString) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_{name}"), value.to_string()));
        self
    }

    /// Set a raw variable
    pub fn var(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.vars.push((key.into(), value.to_string()));
        self
    }

    pub fn apply(self) {
        for (key, value) in self.vars {
            env::set_var(key, value);
        }
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        self.apply();

        EnvGuard { previous }
    }
}

/// Guard that restores environment variables on drop
#[cfg(test)]
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

#[cfg(test)]
impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

pub fn print_env_help() {
    println!("Account context (read once per run):");
    println!();
    println!("  {AWS_PROFILE_NAME}      Account name, used in resource names and tags (required)");
    println!("  {AWS_ACCOUNT_ID}        Numeric account id (required)");
    println!("  {AWS_REGION_NAME}       Region to deploy into (required)");
    println!("  {DOMAIN_NAME}           Domain name for endpoint checks");
    println!("  {DOMAIN_SUFFIX}         Domain suffix, e.g. com");
    println!("  {VPC_ID}                VPC to place microservices in");
    println!();
    println!("Stage control:");
    println!();
    println!("  SKIP_<stage>          Skip a stage, e.g. SKIP_deploy=true");
    println!();
    println!("Tool overrides:");
    println!();
    println!("  {ENV_PREFIX}_CONFIG            Path to configuration file");
    println!("  {ENV_PREFIX}_MAX_RETRIES       Default retry budget per check");
    println!("  {ENV_PREFIX}_INTERVAL          Default seconds between attempts");
    println!("  {ENV_PREFIX}_MAX_CONCURRENT    Parallel suites at once");
    println!("  {ENV_PREFIX}_WORKING_DIR       Directory holding .test-data/");
    println!("  {ENV_PREFIX}_TERRAFORM_BINARY  terraform, terragrunt or tofu");
    println!("  {ENV_PREFIX}_SSH_USER          Login user on bastion and private hosts");
    println!("  {ENV_PREFIX}_FORMAT            Output format (table, json, csv, summary)");
    println!("  {ENV_PREFIX}_LOG               Log filter, e.g. infra_validate=debug");
    println!();
    println!("Example:");
    println!("  export {AWS_PROFILE_NAME}=dev {AWS_ACCOUNT_ID}=123456789012 {AWS_REGION_NAME}=us-east-1");
    println!("  SKIP_cleanup=true infra-validate run suites/mongodb.yaml");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_account_context_from_lookup() {
        let ctx = AccountContext::from_lookup(lookup(&[
            (AWS_PROFILE_NAME, "dev"),
            (AWS_ACCOUNT_ID, "123456789012"),
            (AWS_REGION_NAME, "us-east-1"),
            (DOMAIN_NAME, "example"),
            (DOMAIN_SUFFIX, "com"),
        ]))
        .unwrap();

        assert_eq!(ctx.account_name, "dev");
        assert_eq!(ctx.domain().unwrap(), "example.com");
        assert!(ctx.require_vpc_id().is_err());
    }

    #[test]
    fn test_missing_variables_all_reported() {
        let err = AccountContext::from_lookup(lookup(&[(AWS_ACCOUNT_ID, "123"), (AWS_REGION_NAME, " ")])).unwrap_err();
        assert_eq!(
            err,
            EnvError::Missing(vec![AWS_PROFILE_NAME.to_string(), AWS_REGION_NAME.to_string()])
        );
    }

    #[test]
    fn test_non_numeric_account_id() {
        let err = AccountContext::from_lookup(lookup(&[
            (AWS_PROFILE_NAME, "dev"),
            (AWS_ACCOUNT_ID, "abc"),
            (AWS_REGION_NAME, "us-east-1"),
        ]))
        .unwrap_err();
        assert!(matches!(err, EnvError::Invalid { .. }));
    }

    #[test]
    fn test_domain_missing_suffix() {
        let ctx = AccountContext::new("dev", "1", "us-east-1");
        assert_eq!(
            ctx.domain().unwrap_err(),
            EnvError::Missing(vec![DOMAIN_NAME.to_string(), DOMAIN_SUFFIX.to_string()])
        );

        let ctx = AccountContext {
            domain_name: Some("example".to_string()),
            ..ctx
        };
        assert_eq!(
            ctx.domain().unwrap_err(),
            EnvError::Missing(vec![DOMAIN_SUFFIX.to_string()])
        );
    }

    #[test]
    fn test_env_builder() {
        let _guard = EnvBuilder::new()
            .prefixed("MAX_RETRIES", 7)
            .prefixed("INTERVAL", "2.5")
            .prefixed("TERRAFORM_BINARY", "tofu")
            .apply_scoped();

        let config = EnvConfig::load();
        assert_eq!(config.max_retries, Some(7));
        assert_eq!(config.interval_secs, Some(2.5));
        assert_eq!(config.terraform_binary.as_deref(), Some("tofu"));
        assert!(config.has_any());
    }

    #[test]
    fn test_env_config_default() {
        assert!(!EnvConfig::default().has_any());
    }
}
