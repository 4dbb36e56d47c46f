//! SSH client
//!
//! Thin wrapper over the system `ssh` and `scp` binaries.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// SSH client configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SshConfig {
    /// SSH username
    pub username: String,

    /// SSH port
    pub port: u16,

    /// Connection timeout in seconds
    pub timeout_secs: u64,

    /// Strict host key checking
    pub strict_host_key_checking: bool,

    /// Path of the `ssh` binary
    #[serde(default = "default_ssh_binary")]
    pub ssh_binary: String,

    /// Path of the `scp` binary
    #[serde(default = "default_scp_binary")]
    pub scp_binary: String,
}

fn default_ssh_binary() -> String {
    "ssh".to_string()
}

fn default_scp_binary() -> String {
    "scp".to_string()
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            username: "ec2-user".to_string(),
            port: 22,
            timeout_secs: 30,
            strict_host_key_checking: false,
            ssh_binary: default_ssh_binary(),
            scp_binary: default_scp_binary(),
        }
    }
}

/// A host reachable over SSH
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshHost {
    pub hostname: String,
    pub username: String,
    pub port: u16,
}

impl SshHost {
    pub fn new(hostname: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            username: username.into(),
            port: 22,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// `user@host` destination
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.hostname)
    }
}

/// SSH client for one identity
#[derive(Clone, Debug)]
pub struct SshClient {
    config: SshConfig,
    identity: Option<PathBuf>,
}

impl SshClient {
    /// Create a new SSH client
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            identity: None,
        }
    }

    /// Authenticate with this private key
    pub fn with_identity(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity = Some(path.into());
        self
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    pub fn identity(&self) -> Option<&Path> {
        self.identity.as_deref()
    }

    /// Host with this client's default user and port
    pub fn host(&self, hostname: impl Into<String>) -> SshHost {
        SshHost::new(hostname, self.config.username.clone()).with_port(self.config.port)
    }

    /// Options shared by `ssh` and `scp`
    pub(crate) fn common_options(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            format!(
                "StrictHostKeyChecking={}",
                if self.config.strict_host_key_checking {
                    "yes"
                } else {
                    "no"
                }
            ),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.timeout_secs),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
        ];

        if let Some(ref key_path) = self.identity {
            args.push("-i".to_string());
            args.push(key_path.to_string_lossy().to_string());
        }

        args
    }

    /// Build SSH command arguments, without the remote command
    pub(crate) fn build_ssh_args(&self, host: &SshHost) -> Vec<String> {
        let mut args = self.common_options();
        args.push("-p".to_string());
        args.push(host.port.to_string());
        args.push(host.destination());
        args
    }

    /// Execute a command over SSH
    pub async fn exec(&self, host: &SshHost, command: &str) -> Result<SshOutput> {
        let mut args = self.build_ssh_args(host);
        args.push(command.to_string());
        self.run_ssh(&host.hostname, args).await
    }

    /// Run `ssh` with fully built arguments
    pub(crate) async fn run_ssh(&self, label: &str, args: Vec<String>) -> Result<SshOutput> {
        debug!("Executing SSH command on {}: {:?}", label, args.last());

        let output = Command::new(&self.config.ssh_binary)
            .args(&args)
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", self.config.ssh_binary))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        Ok(SshOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    /// Build SCP arguments for an upload
    pub(crate) fn build_scp_args(&self, host: &SshHost, local_path: &Path, remote_path: &str) -> Vec<String> {
        let mut args = self.common_options();
        args.push("-P".to_string());
        args.push(host.port.to_string());
        args.push(local_path.to_string_lossy().to_string());
        args.push(format!("{}:{}", host.destination(), remote_path));
        args
    }

    /// Copy file to remote host via SCP
    pub async fn scp_to(&self, host: &SshHost, local_path: &Path, remote_path: &str) -> Result<()> {
        debug!(
            "SCP {} -> {}:{}",
            local_path.display(),
            host.destination(),
            remote_path
        );

        let output = Command::new(&self.config.scp_binary)
            .args(self.build_scp_args(host, local_path, remote_path))
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", self.config.scp_binary))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("SCP failed: {stderr}")
        }
    }
}

/// SSH command output
#[derive(Clone, Debug)]
pub struct SshOutput {
    /// Standard output
    pub stdout: String,

    /// Standard error
    pub stderr: String,

    /// Exit code
    pub exit_code: i32,
}

impl SshOutput {
    /// Check if command was successful
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// ssh itself failed (connection, auth, proxy), as opposed to the remote command
    pub fn is_connection_failure(&self) -> bool {
        self.exit_code == 255
    }
}

/// Quote a string for a POSIX shell
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssh_config_defaults() {
        let config = SshConfig::default();

        assert_eq!(config.username, "ec2-user");
        assert_eq!(config.port, 22);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.ssh_binary, "ssh");
    }

    #[test]
    fn test_ssh_client_args() {
        let client = SshClient::new(SshConfig::default()).with_identity("/tmp/key.pem");
        let args = client.build_ssh_args(&client.host("10.0.1.15"));

        assert!(args.contains(&"-p".to_string()));
        assert!(args.contains(&"22".to_string()));
        assert!(args.contains(&"/tmp/key.pem".to_string()));
        assert_eq!(args.last(), Some(&"ec2-user@10.0.1.15".to_string()));
    }

    #[test]
    fn test_scp_args() {
        let client = SshClient::new(SshConfig::default());
        let args = client.build_scp_args(
            &client.host("54.1.2.3"),
            Path::new("key.pem"),
            "/home/ec2-user",
        );

        assert!(args.contains(&"-P".to_string()));
        assert_eq!(args.last(), Some(&"ec2-user@54.1.2.3:/home/ec2-user".to_string()));
    }

    #[test]
    fn test_ssh_output() {
        let output = SshOutput {
            stdout: "Hello, World".to_string(),
            stderr: String::new(),
            exit_code: 0,
        };
        assert!(output.is_success());

        let refused = SshOutput {
            stdout: String::new(),
            stderr: "port 22: Connection refused".to_string(),
            exit_code: 255,
        };
        assert!(refused.is_connection_failure());
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("echo -n 'hi'"), r"'echo -n '\''hi'\'''");
        assert_eq!(shell_quote("plain"), "'plain'");
    }
}
