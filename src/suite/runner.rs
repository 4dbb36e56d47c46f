//! Runs one suite end to end

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use regex::Regex;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

use super::{InfraSection, SuiteDefinition};
use crate::checks::{CheckContext, ValidationCheck};
use crate::config::{AccountContext, AppConfig, HopKind};
use crate::http::HttpClient;
use crate::infra::{common_tags, random_id, VpcNetwork};
use crate::models::{CheckResult, Status, SuiteReport};
use crate::results::generate_run_id;
use crate::retry::RetryPolicy;
use crate::ssh::{BastionExecutor, HopMode, IdentityFile, KeyPair, SshClient};
use crate::stage::{with_deployment, StageSet, StageStore, CLEANUP, DEPLOY};
use crate::terraform::{Terraform, TerraformOptions};

/// Stage store key of the provisioning options
const OPTIONS_KEY: &str = "terraform_options";

/// Length of the id appended to generated resource names
const TEST_ID_LEN: usize = 6;

/// Runs suites against one configuration
#[derive(Clone, Debug)]
pub struct SuiteRunner {
    config: AppConfig,
    http: HttpClient,
    stages: StageSet,
    account: Option<AccountContext>,
}

impl SuiteRunner {
    pub fn new(config: AppConfig) -> Result<Self> {
        let http = HttpClient::with_timeout(config.http_timeout_secs)?
            .default_header("user-agent", concat!("infra-validate/", env!("CARGO_PKG_VERSION")))?;
        Ok(Self {
            config,
            http,
            stages: StageSet::new(),
            account: None,
        })
    }

    /// Stages skipped on top of `SKIP_<stage>` and the suite's own list
    pub fn with_stages(mut self, stages: StageSet) -> Self {
        self.stages = stages;
        self
    }

    /// Account used for typed infra; read from the environment when unset
    pub fn with_account(mut self, account: AccountContext) -> Self {
        self.account = Some(account);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Deploy, validate and tear down one suite
    pub async fn run(&self, suite: &SuiteDefinition) -> SuiteReport {
        let run_id = generate_run_id();
        let started_at = Utc::now();
        info!("Running suite {} (run {})", suite.name, run_id);

        let stages = suite
            .skip
            .iter()
            .fold(StageSet::from_env().merge(&self.stages), |set, stage| {
                set.skip(stage.as_str())
            });
        let skipped: Vec<&str> = stages.skipped().collect();
        if !skipped.is_empty() {
            info!("Suite {} skips {}", suite.name, skipped.join(", "));
        }
        let store = StageStore::new(&self.config.working_dir, &suite.name);

        let options = match self.resolve_options(suite, &stages, &store).await {
            Ok(options) => options,
            Err(e) => {
                warn!("Suite {} could not start: {:#}", suite.name, e);
                return SuiteReport::new(&suite.name, run_id, started_at, Vec::new(), Vec::new(), Some(format!("{e:#}")));
            }
        };

        let terraform = Terraform::new(options).with_name(&suite.name);
        let results = Mutex::new(Vec::new());
        let run = with_deployment(&terraform, &stages, || {
            self.validate(suite, &terraform, &stages, &results)
        })
        .await;

        let cleaned = run
            .stages
            .iter()
            .any(|stage| stage.name == CLEANUP && stage.status == Status::Pass);
        if cleaned {
            if let Err(e) = store.clear() {
                warn!("Failed to clear stage data of {}: {:#}", suite.name, e);
            }
        }

        let checks = results.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        let error = run.outcome.err().map(|e| format!("{e:#}"));
        SuiteReport::new(&suite.name, run_id, started_at, run.stages, checks, error)
    }

    /// Provisioning options of this run
    ///
    /// A run that skips `deploy` reuses the options saved by the run that
    /// deployed, so generated names still match.
    async fn resolve_options(
        &self,
        suite: &SuiteDefinition,
        stages: &StageSet,
        store: &StageStore,
    ) -> Result<TerraformOptions> {
        if stages.is_skipped(DEPLOY) {
            if let Some(options) = store.load_optional::<TerraformOptions>(OPTIONS_KEY)? {
                info!("Reusing options saved in {}", store.dir().display());
                return Ok(options);
            }
            if suite.infra.is_some() {
                anyhow::bail!(
                    "No saved options for suite {} in {}; run the deploy stage first",
                    suite.name,
                    store.dir().display()
                );
            }
        }

        let mut options = suite.terraform.clone();
        if options.binary == "terraform" {
            options.binary = self.config.terraform_binary.clone();
        }

        if let Some(infra) = &suite.infra {
            let account = match &self.account {
                Some(account) => account.clone(),
                None => AccountContext::from_env()?,
            };
            let test_id = random_id(TEST_ID_LEN);
            let (project, service) = suite.tag_names();
            let tags = common_tags(&account, &project, &service, &test_id);

            let vars = match infra {
                InfraSection::Microservice(microservice) => {
                    info!("Suite {} deploys {}", suite.name, microservice.name("", &test_id));
                    microservice.to_vars(&account, "", &test_id, &tags)?
                }
                InfraSection::DataStorage(storage) => {
                    let network_dir = storage
                        .network_dir
                        .as_deref()
                        .context("data_storage needs network_dir to read the VPC outputs")?;
                    let network = network_outputs(network_dir, &options.binary).await?;
                    info!(
                        "Suite {} deploys {}",
                        suite.name,
                        storage.storage_name(&project, &account, &test_id)
                    );
                    storage.to_vars(&project, &account, &network, &test_id, &tags)?
                }
            };
            info!("Suite {} uses test id {}", suite.name, test_id);
            options = options.merge_vars(vars);
        }

        if !stages.is_skipped(DEPLOY) {
            store.save(OPTIONS_KEY, &options)?;
        }
        Ok(options)
    }

    /// The validate stage: fails on the first failing check
    async fn validate(
        &self,
        suite: &SuiteDefinition,
        terraform: &Terraform,
        stages: &StageSet,
        results: &Mutex<Vec<CheckResult>>,
    ) -> Result<()> {
        let outputs = if suite_references_outputs(suite) || suite.endpoint_tests {
            terraform.output_all().await?
        } else {
            Map::new()
        };

        let mut checks = suite
            .checks
            .iter()
            .map(|check| interpolate_outputs(check, &outputs))
            .collect::<Result<Vec<_>>>()?;
        if suite.endpoint_tests {
            let dns = output_string(&outputs, &suite.outputs.endpoint_dns)?;
            checks.extend(suite.endpoint_checks(&dns));
        }

        let mut ctx = CheckContext::new(self.http.clone()).with_terraform(terraform.clone());
        // Keeps the temp key file alive until the checks are done
        let mut _identity = None;
        if suite.needs_bastion() {
            let (executor, identity) = self.bastion_executor(suite, terraform).await?;
            ctx = ctx.with_executor(executor);
            _identity = Some(identity);
        }

        let policy = suite.default_policy(&self.config.retry);
        let checks = run_checks(&checks, &ctx, &policy, stages).await;
        let failed = checks.iter().find(|c| c.status.is_failure()).map(|c| c.description.clone());

        match results.lock() {
            Ok(mut guard) => *guard = checks,
            Err(poisoned) => *poisoned.into_inner() = checks,
        }

        match failed {
            Some(description) => Err(anyhow!("Check '{}' failed", description)),
            None => Ok(()),
        }
    }

    async fn bastion_executor(
        &self,
        suite: &SuiteDefinition,
        terraform: &Terraform,
    ) -> Result<(BastionExecutor, IdentityFile)> {
        let names = &suite.outputs;
        let bastion_ip = terraform.output(&names.bastion_ip).await?;
        let private_ip = terraform.output(&names.private_ip).await?;
        let key_pair = KeyPair {
            public_key: terraform.output(&names.public_key).await?,
            private_key: terraform.output(&names.private_key).await?,
        };
        let identity = IdentityFile::from_key_pair(&key_pair)?;

        let client = SshClient::new(self.config.ssh.clone()).with_identity(identity.path());
        let bastion = client.host(bastion_ip);
        let target = client.host(private_ip);
        let mut executor = BastionExecutor::new(client, bastion, target);

        if self.config.hop == HopKind::Nested {
            let remote_identity = executor.upload_identity().await?;
            executor = executor.with_mode(HopMode::Nested { remote_identity });
        }

        Ok((executor, identity))
    }
}

/// Run checks in order; after the first failure the rest are skipped
///
/// Checks tagged with a skipped sub-stage are reported as skipped and do not
/// stop the run.
pub async fn run_checks(
    checks: &[ValidationCheck],
    ctx: &CheckContext,
    policy: &RetryPolicy,
    stages: &StageSet,
) -> Vec<CheckResult> {
    let mut results = Vec::with_capacity(checks.len());
    let mut failed = false;

    for check in checks {
        if let Some(stage) = check.stage.as_deref().filter(|stage| stages.is_skipped(stage)) {
            results.push(CheckResult::skip(
                &check.description,
                check.kind.name(),
                format!("Stage '{stage}' skipped"),
            ));
            continue;
        }
        if failed {
            results.push(CheckResult::skip(
                &check.description,
                check.kind.name(),
                "Skipped after an earlier failure",
            ));
            continue;
        }

        let result = check.run(ctx, policy).await;
        failed = result.status.is_failure();
        results.push(result);
    }

    results
}

/// VPC outputs of the network module in `dir`
async fn network_outputs(dir: &Path, binary: &str) -> Result<VpcNetwork> {
    let network = Terraform::new(TerraformOptions::new(dir).binary(binary));
    Ok(VpcNetwork {
        vpc_id: network.output("vpc_id").await?,
        vpc_cidr_block: network.output("vpc_cidr_block").await?,
        private_subnets: network.output_list("private_subnets").await?,
        public_subnets: network.output_list("public_subnets").await?,
        security_group_ids: vec![network.output("default_security_group_id").await?],
    })
}

fn output_pattern() -> Result<Regex> {
    Regex::new(r"\$\{output\.([A-Za-z0-9_-]+)\}").context("Invalid output pattern")
}

fn suite_references_outputs(suite: &SuiteDefinition) -> bool {
    serde_json::to_string(&suite.checks)
        .map(|s| s.contains("${output."))
        .unwrap_or(false)
}

fn output_string(outputs: &Map<String, Value>, name: &str) -> Result<String> {
    match outputs.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Null) | None => Err(anyhow!("Output '{}' is missing or null", name)),
        Some(other) => Ok(other.to_string()),
    }
}

/// Replace `${output.<name>}` in every string of the check
fn interpolate_outputs(check: &ValidationCheck, outputs: &Map<String, Value>) -> Result<ValidationCheck> {
    let pattern = output_pattern()?;
    let mut value = serde_json::to_value(check).context("Failed to serialize check")?;
    interpolate_value(&mut value, &pattern, outputs)?;
    serde_json::from_value(value).context("Check is invalid after output substitution")
}

fn interpolate_value(value: &mut Value, pattern: &Regex, outputs: &Map<String, Value>) -> Result<()> {
    match value {
        Value::String(s) if s.contains("${output.") => {
            let mut missing = None;
            let replaced = pattern
                .replace_all(s.as_str(), |caps: &regex::Captures| {
                    output_string(outputs, &caps[1]).unwrap_or_else(|e| {
                        missing = Some(e);
                        String::new()
                    })
                })
                .into_owned();
            if let Some(e) = missing {
                return Err(e);
            }
            *s = replaced;
        }
        Value::Array(items) => {
            for item in items {
                interpolate_value(item, pattern, outputs)?;
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                interpolate_value(item, pattern, outputs)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::CheckKind;
    use crate::stage::VALIDATE;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::net::TcpListener;

    fn tcp_check(description: &str, port: u16) -> ValidationCheck {
        ValidationCheck::new(
            description,
            CheckKind::Tcp {
                host: "127.0.0.1".into(),
                port,
                timeout_secs: 1,
            },
        )
    }

    fn staged(mut check: ValidationCheck, stage: &str) -> ValidationCheck {
        check.stage = Some(stage.to_string());
        check
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_checks_after_failure_are_skipped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed = closed_port().await;

        let checks = vec![
            tcp_check("open port", open),
            tcp_check("closed port", closed),
            tcp_check("never run", open),
        ];
        let ctx = CheckContext::new(HttpClient::with_timeout(5).unwrap());
        let policy = RetryPolicy::new(1, Duration::ZERO);

        let results = run_checks(&checks, &ctx, &policy, &StageSet::new()).await;
        let statuses: Vec<Status> = results.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![Status::Pass, Status::Fail, Status::Skip]);
        assert_eq!(results[2].attempts, 0);
    }

    #[tokio::test]
    async fn test_checks_in_skipped_substage() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed = closed_port().await;

        let checks = vec![
            staged(tcp_check("ssh reachable", closed), "validate_ssh"),
            tcp_check("load balancer", open),
            staged(tcp_check("mongodb port", open), "validate_mongodb"),
        ];
        let ctx = CheckContext::new(HttpClient::with_timeout(5).unwrap());
        let policy = RetryPolicy::new(1, Duration::ZERO);
        let stages = StageSet::from_vars([("SKIP_validate_ssh", "true")]);

        let results = run_checks(&checks, &ctx, &policy, &stages).await;
        let statuses: Vec<Status> = results.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![Status::Skip, Status::Pass, Status::Pass]);
        assert_eq!(results[0].message.as_deref(), Some("Stage 'validate_ssh' skipped"));

        let check: ValidationCheck = serde_yaml::from_str(
            "description: ssh\nstage: validate_ssh\nkind: command\ncommand: echo ok\nexpect: ok\n",
        )
        .unwrap();
        assert_eq!(check.stage.as_deref(), Some("validate_ssh"));
    }

    #[test]
    fn test_interpolate_outputs() {
        let mut check = tcp_check("endpoint", 443);
        check.kind = CheckKind::Tcp {
            host: "${output.dns_name}".into(),
            port: 443,
            timeout_secs: 5,
        };
        let outputs = json!({"dns_name": "lb.example.com"});
        let outputs = outputs.as_object().unwrap();

        let resolved = interpolate_outputs(&check, outputs).unwrap();
        match resolved.kind {
            CheckKind::Tcp { host, .. } => assert_eq!(host, "lb.example.com"),
            other => panic!("unexpected kind {other:?}"),
        }

        let err = interpolate_outputs(&check, &Map::new()).unwrap_err();
        assert!(err.to_string().contains("dns_name"));
    }

    #[tokio::test]
    async fn test_run_with_every_stage_skipped() {
        let dir = tempdir().unwrap();
        let suite: SuiteDefinition = serde_yaml::from_str(&format!(
            "name: local\nterraform:\n  terraform_dir: {}\nchecks:\n  - description: noop\n    kind: tcp\n    host: 127.0.0.1\n    port: 1\n",
            dir.path().display()
        ))
        .unwrap();

        let config = AppConfig {
            working_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let runner = SuiteRunner::new(config)
            .unwrap()
            .with_stages(StageSet::new().skip(DEPLOY).skip(VALIDATE).skip(CLEANUP));

        let report = runner.run(&suite).await;
        assert_eq!(report.suite, "local");
        assert_eq!(report.stages.len(), 3);
        assert!(report.stages.iter().all(|s| s.status == Status::Skip));
        assert!(report.checks.is_empty());
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_skipped_deploy_without_saved_options_fails() {
        let dir = tempdir().unwrap();
        let yaml = format!(
            r#"
name: grpc
terraform:
  terraform_dir: {}
endpoint_tests: true
infra:
  microservice:
    project: ms
    service: grpc
    instance_types: [t3.small]
    container:
      name: unique
      docker: {{repository: hostname}}
    traffics:
      - listener: {{port: 443, protocol: https}}
        target: {{port: 50051, protocol: http, protocol_version: grpc}}
"#,
            dir.path().display()
        );
        let suite: SuiteDefinition = serde_yaml::from_str(&yaml).unwrap();

        let config = AppConfig {
            working_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let runner = SuiteRunner::new(config)
            .unwrap()
            .with_stages(StageSet::new().skip(DEPLOY));

        let report = runner.run(&suite).await;
        assert!(report.stages.is_empty());
        assert!(!report.is_success());
        assert!(report.error.unwrap().contains("deploy stage first"));
    }
}
