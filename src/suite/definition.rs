//! Suite definition files

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::checks::{CheckKind, ValidationCheck};
use crate::config::is_yaml_file;
use crate::infra::{DataStorage, Microservice, Protocol, TrafficRule};
use crate::retry::RetryPolicy;
use crate::terraform::TerraformOptions;

/// Standard gRPC health service, called when a target sets no path
const GRPC_HEALTH_PATH: &str = "/grpc.health.v1.Health/Check";

/// Typed module input the suite deploys
///
/// Written as a single-key map (`microservice: {...}`) in both YAML and JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfraSection {
    Microservice(Microservice),
    DataStorage(DataStorage),
}

/// Names of the provisioning outputs the runner reads
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputNames {
    pub bastion_ip: String,
    pub private_ip: String,
    pub public_key: String,
    pub private_key: String,
    pub endpoint_dns: String,
}

impl Default for OutputNames {
    fn default() -> Self {
        Self {
            bastion_ip: "bastion_public_ip".to_string(),
            private_ip: "private_ip".to_string(),
            public_key: "public_key".to_string(),
            private_key: "private_key".to_string(),
            endpoint_dns: "dns_name".to_string(),
        }
    }
}

/// One validation suite: what to deploy and what to check
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuiteDefinition {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Safe to run alongside other parallel suites
    #[serde(default)]
    pub parallel: bool,

    /// Project name used in tags when the infra section has none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    pub terraform: TerraformOptions,

    #[serde(
        default,
        with = "serde_yaml::with::singleton_map",
        skip_serializing_if = "Option::is_none"
    )]
    pub infra: Option<InfraSection>,

    #[serde(default)]
    pub outputs: OutputNames,

    /// Default policy of the suite's checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,

    /// Stages skipped on every run of this suite
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip: Vec<String>,

    /// Check every load balancer listener of the microservice
    #[serde(default)]
    pub endpoint_tests: bool,

    #[serde(default)]
    pub checks: Vec<ValidationCheck>,
}

impl SuiteDefinition {
    /// Load a suite from a YAML or JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read suite file: {}", path.display()))?;

        let suite: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML suite: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON suite: {}", path.display()))?
        };

        suite
            .validate()
            .with_context(|| format!("Invalid suite file: {}", path.display()))?;
        Ok(suite)
    }

    /// Load every file, failing on the first bad one
    pub fn load_all<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Self>> {
        paths.iter().map(Self::load).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Suite name must not be empty");
        }
        self.terraform
            .validate()
            .map_err(|e| anyhow::anyhow!("Suite {}: {}", self.name, e))?;

        match &self.infra {
            Some(InfraSection::Microservice(microservice)) => microservice.validate()?,
            Some(InfraSection::DataStorage(storage)) => storage.validate()?,
            None => {}
        }

        if self.endpoint_tests && !matches!(self.infra, Some(InfraSection::Microservice(_))) {
            anyhow::bail!("Suite {}: endpoint_tests needs a microservice infra section", self.name);
        }
        if self.checks.is_empty() && !self.endpoint_tests {
            anyhow::bail!("Suite {} has no checks", self.name);
        }
        Ok(())
    }

    pub fn default_policy(&self, fallback: &RetryPolicy) -> RetryPolicy {
        self.retry.unwrap_or(*fallback)
    }

    /// True when a check has to run through the bastion
    pub fn needs_bastion(&self) -> bool {
        self.checks.iter().any(|check| check.kind.is_remote())
    }

    /// Project and service used to tag resources
    pub fn tag_names(&self) -> (String, String) {
        match &self.infra {
            Some(InfraSection::Microservice(m)) => (m.project.clone(), m.service.clone()),
            Some(InfraSection::DataStorage(s)) => (
                self.project.clone().unwrap_or_else(|| self.name.clone()),
                s.name.clone(),
            ),
            None => (
                self.project.clone().unwrap_or_else(|| self.name.clone()),
                self.name.clone(),
            ),
        }
    }

    /// One check per traffic rule, aimed at the load balancer on `dns`
    pub fn endpoint_checks(&self, dns: &str) -> Vec<ValidationCheck> {
        let Some(InfraSection::Microservice(microservice)) = &self.infra else {
            return Vec::new();
        };
        if !self.endpoint_tests {
            return Vec::new();
        }

        microservice
            .traffics
            .iter()
            .map(|rule| endpoint_check(rule, dns))
            .collect()
    }
}

fn endpoint_check(rule: &TrafficRule, dns: &str) -> ValidationCheck {
    let port = rule.listener.effective_port();
    let url = rule.listener_url(dns);

    if rule.target.is_grpc() {
        let path = rule
            .target
            .health_check_path
            .clone()
            .unwrap_or_else(|| GRPC_HEALTH_PATH.to_string());
        let status = rule
            .target
            .status_code
            .clone()
            .unwrap_or_else(|| "0".to_string());
        return ValidationCheck::new(
            format!("gRPC listener {port} answers"),
            CheckKind::Grpc {
                url,
                path,
                request: String::new(),
                status,
            },
        );
    }

    if rule.listener.protocol == Protocol::Tcp {
        return ValidationCheck::new(
            format!("TCP listener {port} accepts connections"),
            CheckKind::Tcp {
                host: dns.to_string(),
                port,
                timeout_secs: 5,
            },
        );
    }

    let path = rule.target.health_check_path.as_deref().unwrap_or("");
    let status = rule
        .target
        .status_code
        .as_deref()
        .and_then(|s| s.parse().ok())
        .unwrap_or(200);
    ValidationCheck::new(
        format!("{} listener {port} answers", rule.listener.protocol.scheme().to_uppercase()),
        CheckKind::Http {
            url: format!("{url}{path}"),
            method: "GET".to_string(),
            status,
            contains: None,
            body: None,
            headers: Default::default(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MONGODB_SUITE: &str = r#"
name: mongodb
terraform:
  terraform_dir: modules/data-storage/mongodb
infra:
  data_storage:
    name: mongodb
    ami_id: ami-09d3b3274b6c5d4aa
    user_data_path: mongodb.sh
    network_dir: modules/vpc
retry:
  max_retries: 15
  interval: 30
checks:
  - description: MongoDB port is open
    kind: port
    port: 27017
  - description: Bucket is mounted
    kind: mount
    path: /mnt/data
    retry: {max_retries: 3, interval: 5}
"#;

    const GRPC_SUITE: &str = r#"
name: grpc
parallel: true
terraform:
  terraform_dir: modules/microservice
endpoint_tests: true
infra:
  microservice:
    project: ms
    service: grpc
    instance_types: [t3.small]
    container:
      name: unique
      docker:
        registry: {name: grpc}
        repository: java-example-hostname
    traffics:
      - listener: {port: 443, protocol: https}
        target: {port: 50051, protocol: http, protocol_version: grpc, status_code: "0"}
      - listener: {port: 81, protocol: http}
        target: {port: 8080, protocol: http, status_code: "200", health_check_path: /health}
"#;

    #[test]
    fn test_parse_data_storage_suite() {
        let suite: SuiteDefinition = serde_yaml::from_str(MONGODB_SUITE).unwrap();
        suite.validate().unwrap();

        assert!(!suite.parallel);
        assert!(suite.needs_bastion());
        assert!(matches!(suite.infra, Some(InfraSection::DataStorage(_))));
        assert_eq!(suite.checks.len(), 2);
        assert_eq!(suite.checks[1].retry.map(|p| p.max_retries), Some(3));
        assert_eq!(suite.outputs.bastion_ip, "bastion_public_ip");
        assert_eq!(suite.tag_names(), ("mongodb".to_string(), "mongodb".to_string()));
    }

    #[test]
    fn test_endpoint_checks_follow_traffic_rules() {
        let suite: SuiteDefinition = serde_yaml::from_str(GRPC_SUITE).unwrap();
        suite.validate().unwrap();
        assert!(!suite.needs_bastion());

        let checks = suite.endpoint_checks("lb.example.com");
        assert_eq!(checks.len(), 2);

        match &checks[0].kind {
            CheckKind::Grpc { url, path, status, .. } => {
                assert_eq!(url, "https://lb.example.com");
                assert_eq!(path, GRPC_HEALTH_PATH);
                assert_eq!(status, "0");
            }
            other => panic!("expected a grpc check, got {other:?}"),
        }
        match &checks[1].kind {
            CheckKind::Http { url, status, .. } => {
                assert_eq!(url, "http://lb.example.com:81/health");
                assert_eq!(*status, 200);
            }
            other => panic!("expected an http check, got {other:?}"),
        }
    }

    #[test]
    fn test_suite_without_checks_rejected() {
        let yaml = "name: empty\nterraform:\n  terraform_dir: modules/x\n";
        let suite: SuiteDefinition = serde_yaml::from_str(yaml).unwrap();
        assert!(suite.validate().is_err());
    }

    #[test]
    fn test_endpoint_tests_need_microservice() {
        let yaml = MONGODB_SUITE.replace("name: mongodb\nterraform", "name: mongodb\nendpoint_tests: true\nterraform");
        let suite: SuiteDefinition = serde_yaml::from_str(&yaml).unwrap();
        assert!(suite.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let yaml = dir.path().join("grpc.yaml");
        std::fs::write(&yaml, GRPC_SUITE).unwrap();

        let json = dir.path().join("grpc.json");
        let suite = SuiteDefinition::load(&yaml).unwrap();
        std::fs::write(&json, serde_json::to_string(&suite).unwrap()).unwrap();

        let suites = SuiteDefinition::load_all(&[yaml, json]).unwrap();
        assert_eq!(suites.len(), 2);
        assert!(suites.iter().all(|s| s.parallel && s.name == "grpc"));
        assert_eq!(suites[0].infra, suites[1].infra);
    }

    #[test]
    fn test_infra_section_written_as_map() {
        let suite: SuiteDefinition = serde_yaml::from_str(MONGODB_SUITE).unwrap();

        let yaml = serde_yaml::to_string(&suite).unwrap();
        assert!(yaml.contains("infra:\n  data_storage:\n"));
        let reparsed: SuiteDefinition = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(reparsed.infra, suite.infra);

        let json = serde_json::to_value(&suite).unwrap();
        assert_eq!(json["infra"]["data_storage"]["name"], "mongodb");

        let bare = "name: bare\nterraform:\n  terraform_dir: modules/x\nchecks: []\n";
        let suite: SuiteDefinition = serde_yaml::from_str(bare).unwrap();
        assert!(suite.infra.is_none());
    }
}
