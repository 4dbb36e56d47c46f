//! Bastion-hop command execution
//!
//! Reaching the bastion and reaching the private host behind it share one
//! error channel: either hop failing is `AttemptError::Unreachable`.

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::client::{shell_quote, SshClient, SshHost, SshOutput};
use crate::retry::AttemptError;

/// How the second hop is made
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HopMode {
    /// Tunnel the private session through the bastion (`ProxyCommand ... -W`)
    Proxy,

    /// Run a second `ssh` on the bastion using a key already copied there
    Nested { remote_identity: String },
}

/// Executes commands on a private host through a public bastion
#[derive(Clone, Debug)]
pub struct BastionExecutor {
    client: SshClient,
    bastion: SshHost,
    target: SshHost,
    mode: HopMode,
}

impl BastionExecutor {
    pub fn new(client: SshClient, bastion: SshHost, target: SshHost) -> Self {
        Self {
            client,
            bastion,
            target,
            mode: HopMode::Proxy,
        }
    }

    pub fn with_mode(mut self, mode: HopMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn target(&self) -> &SshHost {
        &self.target
    }

    /// Arguments for running `command` on the target
    pub(crate) fn build_args(&self, command: &str) -> Vec<String> {
        match &self.mode {
            HopMode::Proxy => {
                let mut proxy = vec![self.client.config().ssh_binary.clone()];
                proxy.extend(self.client.common_options());
                proxy.push("-p".to_string());
                proxy.push(self.bastion.port.to_string());
                proxy.push("-W".to_string());
                proxy.push("%h:%p".to_string());
                proxy.push(self.bastion.destination());

                let proxy_command = proxy
                    .iter()
                    .map(|arg| {
                        if arg == "%h:%p" {
                            arg.clone()
                        } else {
                            shell_quote(arg)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" ");

                let mut args = self.client.common_options();
                args.push("-o".to_string());
                args.push(format!("ProxyCommand={proxy_command}"));
                args.push("-p".to_string());
                args.push(self.target.port.to_string());
                args.push(self.target.destination());
                args.push(command.to_string());
                args
            }
            HopMode::Nested { remote_identity } => {
                let inner = [
                    "ssh".to_string(),
                    "-o".to_string(),
                    "StrictHostKeyChecking=no".to_string(),
                    "-o".to_string(),
                    "UserKnownHostsFile=/dev/null".to_string(),
                    "-o".to_string(),
                    format!("ConnectTimeout={}", self.client.config().timeout_secs),
                    "-o".to_string(),
                    "BatchMode=yes".to_string(),
                    "-o".to_string(),
                    "LogLevel=ERROR".to_string(),
                    "-i".to_string(),
                    remote_identity.clone(),
                    "-p".to_string(),
                    self.target.port.to_string(),
                    self.target.destination(),
                    command.to_string(),
                ]
                .iter()
                .map(|arg| shell_quote(arg))
                .collect::<Vec<_>>()
                .join(" ");

                let mut args = self.client.build_ssh_args(&self.bastion);
                args.push(inner);
                args
            }
        }
    }

    /// Run `command` on the private host and return its stdout
    pub async fn exec(&self, command: &str) -> Result<String, AttemptError> {
        let label = format!(
            "{} via {}",
            self.target.hostname, self.bastion.hostname
        );

        let output = self
            .client
            .run_ssh(&label, self.build_args(command))
            .await
            .map_err(|e| AttemptError::Fatal(format!("{e:#}")))?;

        classify(output)
    }

    /// Run `command` on the bastion itself
    pub async fn exec_on_bastion(&self, command: &str) -> Result<String, AttemptError> {
        let output = self
            .client
            .exec(&self.bastion, command)
            .await
            .map_err(|e| AttemptError::Fatal(format!("{e:#}")))?;

        classify(output)
    }

    /// Copy the client's private key to the bastion home directory
    ///
    /// Returns the remote key path, usable with [`HopMode::Nested`].
    pub async fn upload_identity(&self) -> Result<String> {
        let identity = self
            .client
            .identity()
            .context("SSH client has no identity to upload")?;

        let file_name = identity
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "identity.pem".to_string());
        let remote_path = format!("/home/{}/{}", self.bastion.username, file_name);

        info!(
            "Uploading identity to bastion {}:{}",
            self.bastion.hostname, remote_path
        );
        self.client
            .scp_to(&self.bastion, identity, &remote_path)
            .await?;

        let chmod = format!("chmod 400 {}", shell_quote(&remote_path));
        self.exec_on_bastion(&chmod)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to restrict remote key: {e}"))?;

        debug!("Identity uploaded to {}", remote_path);
        Ok(remote_path)
    }
}

fn classify(output: SshOutput) -> Result<String, AttemptError> {
    if output.is_success() {
        Ok(output.stdout)
    } else if output.is_connection_failure() {
        let stderr = output.stderr.trim();
        Err(AttemptError::Unreachable(if stderr.is_empty() {
            "ssh exited with status 255".to_string()
        } else {
            stderr.to_string()
        }))
    } else {
        Err(AttemptError::CommandFailed {
            exit_code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::SshConfig;

    fn executor() -> BastionExecutor {
        let client = SshClient::new(SshConfig::default()).with_identity("/tmp/scraper.pem");
        let bastion = client.host("54.10.0.1");
        let target = client.host("10.0.2.20");
        BastionExecutor::new(client, bastion, target)
    }

    #[test]
    fn test_proxy_args() {
        let args = executor().build_args("echo -n 'Hello, World'");

        let proxy = args
            .iter()
            .find(|a| a.starts_with("ProxyCommand="))
            .expect("proxy command");
        assert!(proxy.contains("'-p' '22' '-W' %h:%p 'ec2-user@54.10.0.1'"));
        assert!(proxy.contains("'ec2-user@54.10.0.1'"));
        assert!(proxy.contains("'/tmp/scraper.pem'"));

        let n = args.len();
        assert_eq!(args[n - 2], "ec2-user@10.0.2.20");
        assert_eq!(args[n - 1], "echo -n 'Hello, World'");
    }

    #[test]
    fn test_nested_args() {
        let exec = executor().with_mode(HopMode::Nested {
            remote_identity: "/home/ec2-user/scraper.pem".to_string(),
        });
        let args = exec.build_args("sudo docker ps");

        assert!(args.contains(&"ec2-user@54.10.0.1".to_string()));
        let inner = args.last().unwrap();
        assert!(inner.starts_with("'ssh'"));
        assert!(inner.contains("'/home/ec2-user/scraper.pem'"));
        assert!(inner.contains("'ec2-user@10.0.2.20'"));
        assert!(inner.ends_with("'sudo docker ps'"));
    }

    #[test]
    fn test_classify_output() {
        let ok = SshOutput {
            stdout: "Hello, World".to_string(),
            stderr: String::new(),
            exit_code: 0,
        };
        assert_eq!(classify(ok).unwrap(), "Hello, World");

        let refused = SshOutput {
            stdout: String::new(),
            stderr: "ssh: connect to host 10.0.2.20 port 22: Connection refused\n".to_string(),
            exit_code: 255,
        };
        assert!(matches!(classify(refused), Err(AttemptError::Unreachable(msg)) if msg.contains("Connection refused")));

        let failed = SshOutput {
            stdout: String::new(),
            stderr: "df: /mys3bucket: No such file or directory".to_string(),
            exit_code: 1,
        };
        assert!(matches!(
            classify(failed),
            Err(AttemptError::CommandFailed { exit_code: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_ssh_binary_is_fatal() {
        let mut config = SshConfig::default();
        config.ssh_binary = "/nonexistent/infra-validate-ssh".to_string();
        let client = SshClient::new(config);
        let exec = BastionExecutor::new(client.clone(), client.host("a"), client.host("b"));

        let result = exec.exec("true").await;
        assert!(matches!(result, Err(AttemptError::Fatal(_))));
    }
}
