//! Provisioning CLI runner

use anyhow::Result;
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{Provisioner, TerraformError, TerraformOptions};
use crate::retry::{do_with_retry, AttemptError};

/// Runs provisioning commands for one set of options
#[derive(Clone, Debug)]
pub struct Terraform {
    options: TerraformOptions,
    name: String,
}

impl Terraform {
    pub fn new(options: TerraformOptions) -> Self {
        let name = options.terraform_dir.display().to_string();
        Self { options, name }
    }

    /// Override the name used in logs
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// `init`
    pub async fn init(&self) -> Result<String, TerraformError> {
        self.run_command("init", &["init", "-upgrade=false", "-input=false"], false)
            .await
    }

    /// `plan`
    pub async fn plan(&self) -> Result<String, TerraformError> {
        self.run_command("plan", &["plan", "-input=false", "-lock=false"], true)
            .await
    }

    /// `apply`
    pub async fn apply(&self) -> Result<String, TerraformError> {
        self.run_command(
            "apply",
            &["apply", "-input=false", "-auto-approve", "-lock=false"],
            true,
        )
        .await
    }

    /// `init` followed by `apply`
    pub async fn init_and_apply(&self) -> Result<String, TerraformError> {
        self.init().await?;
        self.apply().await
    }

    /// `destroy`
    pub async fn destroy(&self) -> Result<String, TerraformError> {
        self.run_command(
            "destroy",
            &["destroy", "-input=false", "-auto-approve", "-lock=false"],
            true,
        )
        .await
    }

    /// Single output as a string
    pub async fn output(&self, name: &str) -> Result<String, TerraformError> {
        let value = self.output_json(name).await?;
        value_to_string(name, &value)
    }

    /// Single output as a list of strings
    pub async fn output_list(&self, name: &str) -> Result<Vec<String>, TerraformError> {
        let value = self.output_json(name).await?;
        value_to_list(name, &value)
    }

    /// Single output as raw JSON
    pub async fn output_json(&self, name: &str) -> Result<Value, TerraformError> {
        let stdout = self
            .run_command("output", &["output", "-json", name], false)
            .await?;
        parse_output(name, &stdout)
    }

    /// Every output of the root module, by name
    pub async fn output_all(&self) -> Result<serde_json::Map<String, Value>, TerraformError> {
        let stdout = self
            .run_command("output", &["output", "-json"], false)
            .await?;
        parse_all_outputs(&stdout)
    }

    /// Write variables to a temp `.tfvars.json`, if there are any
    fn write_var_file(&self) -> Result<Option<NamedTempFile>, TerraformError> {
        if self.options.vars.is_empty() {
            return Ok(None);
        }

        let mut file = tempfile::Builder::new()
            .prefix("infra-validate-")
            .suffix(".tfvars.json")
            .tempfile()
            .map_err(|e| TerraformError::Vars(e.to_string()))?;

        serde_json::to_writer_pretty(&mut file, &self.options.vars)
            .map_err(|e| TerraformError::Vars(e.to_string()))?;
        file.flush()
            .map_err(|e| TerraformError::Vars(e.to_string()))?;

        Ok(Some(file))
    }

    /// Arguments for one invocation
    pub(crate) fn build_args(
        &self,
        base: &[&str],
        with_vars: bool,
        var_file: Option<&Path>,
    ) -> Vec<String> {
        let mut args: Vec<String> = base.iter().map(|a| a.to_string()).collect();
        args.push("-no-color".to_string());

        if with_vars {
            for path in &self.options.var_files {
                args.push(format!("-var-file={}", path.display()));
            }
            if let Some(path) = var_file {
                args.push(format!("-var-file={}", path.display()));
            }
        }

        args
    }

    async fn run_command(
        &self,
        command: &str,
        base: &[&str],
        with_vars: bool,
    ) -> Result<String, TerraformError> {
        let var_file = if with_vars {
            self.write_var_file()?
        } else {
            None
        };
        let args = self.build_args(base, with_vars, var_file.as_ref().map(|f| f.path()));

        let description = format!("Running {} {} in {}", self.options.binary, command, self.name);
        let policy = self.options.retry_policy();

        do_with_retry(&description, &policy, || self.run_once(&args))
            .await
            .map(|attempted| attempted.value)
            .map_err(|source| TerraformError::Command {
                command: command.to_string(),
                source,
            })
    }

    async fn run_once(&self, args: &[String]) -> Result<String, AttemptError> {
        debug!(
            "{} {} (dir: {})",
            self.options.binary,
            args.join(" "),
            self.options.terraform_dir.display()
        );

        let output = Command::new(&self.options.binary)
            .args(args)
            .current_dir(&self.options.terraform_dir)
            .envs(&self.options.env)
            .env("TF_INPUT", "0")
            .env("TF_IN_AUTOMATION", "1")
            .output()
            .await
            .map_err(|e| AttemptError::Fatal(format!("Failed to execute {}: {e}", self.options.binary)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            return Ok(stdout);
        }

        let combined = format!("{stdout}\n{stderr}");
        match self.options.match_retryable(&combined) {
            Some(description) => {
                warn!("{} hit a retryable error: {}", self.options.binary, description);
                Err(AttemptError::CommandFailed {
                    exit_code: output.status.code().unwrap_or(-1),
                    stderr: stderr.trim().to_string(),
                })
            }
            None => Err(AttemptError::Fatal(stderr.trim().to_string())),
        }
    }
}

impl Provisioner for Terraform {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deploy(&self) -> Result<()> {
        info!("Deploying {}", self.name);
        if self.options.plan {
            self.init().await?;
            self.plan().await?;
            self.apply().await?;
        } else {
            self.init_and_apply().await?;
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        info!("Destroying {}", self.name);
        Terraform::destroy(self).await?;
        Ok(())
    }
}

fn parse_output(name: &str, stdout: &str) -> Result<Value, TerraformError> {
    serde_json::from_str(stdout.trim()).map_err(|e| TerraformError::Output {
        name: name.to_string(),
        reason: format!("not valid JSON: {e}"),
    })
}

fn parse_all_outputs(stdout: &str) -> Result<serde_json::Map<String, Value>, TerraformError> {
    let value = parse_output("*", stdout)?;
    let Value::Object(outputs) = value else {
        return Err(TerraformError::Output {
            name: "*".to_string(),
            reason: "expected an object of outputs".to_string(),
        });
    };

    Ok(outputs
        .into_iter()
        .map(|(name, output)| {
            let value = match output {
                Value::Object(mut meta) => meta.remove("value").unwrap_or(Value::Null),
                other => other,
            };
            (name, value)
        })
        .collect())
}

fn value_to_string(name: &str, value: &Value) -> Result<String, TerraformError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Err(TerraformError::Output {
            name: name.to_string(),
            reason: "output is null".to_string(),
        }),
        other => Ok(other.to_string()),
    }
}

fn value_to_list(name: &str, value: &Value) -> Result<Vec<String>, TerraformError> {
    match value {
        Value::Array(items) => items.iter().map(|item| value_to_string(name, item)).collect(),
        other => Err(TerraformError::Output {
            name: name.to_string(),
            reason: format!("expected a list, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_build_args_with_vars() {
        let mut options = TerraformOptions::new("modules/data-storage/mongodb").var("bastion", true);
        options.var_files.push("terraform_override.tfvars".into());
        let terraform = Terraform::new(options);

        let args = terraform.build_args(
            &["apply", "-input=false", "-auto-approve"],
            true,
            Some(Path::new("/tmp/vars.tfvars.json")),
        );

        assert_eq!(args[0], "apply");
        assert!(args.contains(&"-no-color".to_string()));
        assert!(args.contains(&"-var-file=terraform_override.tfvars".to_string()));
        assert_eq!(args.last(), Some(&"-var-file=/tmp/vars.tfvars.json".to_string()));
    }

    #[test]
    fn test_build_args_without_vars() {
        let mut options = TerraformOptions::new(".");
        options.var_files.push("x.tfvars".into());
        let terraform = Terraform::new(options);
        let args = terraform.build_args(&["output", "-json", "vpc_id"], false, None);
        assert_eq!(args, vec!["output", "-json", "vpc_id", "-no-color"]);
    }

    #[test]
    fn test_var_file_contents() {
        let options = TerraformOptions::new(".")
            .var("common_tags", json!({"Account": "dev", "Region": "us-east-1"}))
            .var("private_subnets", json!(["subnet-a", "subnet-b"]));
        let terraform = Terraform::new(options);

        let file = terraform.write_var_file().unwrap().unwrap();
        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
        assert_eq!(written["common_tags"]["Region"], json!("us-east-1"));
        assert_eq!(written["private_subnets"][1], json!("subnet-b"));

        let empty = Terraform::new(TerraformOptions::new("."));
        assert!(empty.write_var_file().unwrap().is_none());
    }

    #[test]
    fn test_output_conversions() {
        assert_eq!(value_to_string("ip", &json!("10.0.0.5")).unwrap(), "10.0.0.5");
        assert_eq!(value_to_string("port", &json!(27017)).unwrap(), "27017");
        assert!(value_to_string("missing", &Value::Null).is_err());

        let list = value_to_list("ips", &json!(["54.1.1.1", "54.1.1.2"])).unwrap();
        assert_eq!(list, vec!["54.1.1.1", "54.1.1.2"]);
        assert!(value_to_list("ip", &json!("54.1.1.1")).is_err());
    }

    #[test]
    fn test_parse_all_outputs() {
        let stdout = r#"{
            "vpc_id": {"sensitive": false, "type": "string", "value": "vpc-013a411b59dd8a08e"},
            "public_subnets": {"sensitive": false, "type": ["list", "string"], "value": ["subnet-1"]}
        }"#;

        let outputs = parse_all_outputs(stdout).unwrap();
        assert_eq!(outputs["vpc_id"], json!("vpc-013a411b59dd8a08e"));
        assert_eq!(outputs["public_subnets"], json!(["subnet-1"]));
        assert!(parse_all_outputs("not json").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_retryable_failure_is_fatal() {
        let mut options = TerraformOptions::new(std::env::temp_dir()).binary("false");
        options.time_between_retries = Duration::from_millis(1);
        let terraform = Terraform::new(options);

        match terraform.init().await {
            Err(TerraformError::Command { command, source }) => {
                assert_eq!(command, "init");
                assert_eq!(source.attempts(), 1);
            }
            other => panic!("Expected command failure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_binary_is_fatal() {
        let terraform = Terraform::new(
            TerraformOptions::new(std::env::temp_dir()).binary("/nonexistent/terraform-bin"),
        );
        let err = terraform.plan().await.unwrap_err();
        assert!(err.to_string().contains("non-retryable"));
    }

    /// Shell stand-in for the CLI that logs each subcommand and answers `output`
    #[cfg(unix)]
    fn fake_binary(dir: &Path) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-terraform");
        std::fs::write(
            &script,
            r#"#!/bin/sh
echo "$1" >> calls.log
if [ "$1" = "output" ]; then
  case "$3" in
    s3_bucket_arn) echo '"arn:aws:s3:::dev-us-east-1-scraper-mongodb"' ;;
    mongodb_port) echo '27017' ;;
    *) echo 'null' ;;
  esac
fi
"#,
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_deploy_plans_before_apply() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_binary(dir.path());
        let calls = dir.path().join("calls.log");

        let terraform = Terraform::new(
            TerraformOptions::new(dir.path()).binary(binary.to_string_lossy()),
        );
        Provisioner::deploy(&terraform).await.unwrap();
        assert_eq!(std::fs::read_to_string(&calls).unwrap(), "init\nplan\napply\n");

        std::fs::remove_file(&calls).unwrap();
        let mut options = TerraformOptions::new(dir.path()).binary(binary.to_string_lossy());
        options.plan = false;
        Provisioner::deploy(&Terraform::new(options)).await.unwrap();
        assert_eq!(std::fs::read_to_string(&calls).unwrap(), "init\napply\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_from_cli() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_binary(dir.path());
        let terraform = Terraform::new(
            TerraformOptions::new(dir.path()).binary(binary.to_string_lossy()),
        );

        assert_eq!(terraform.output("mongodb_port").await.unwrap(), "27017");
        assert!(matches!(
            terraform.output("missing").await,
            Err(TerraformError::Output { .. })
        ));
    }
}
