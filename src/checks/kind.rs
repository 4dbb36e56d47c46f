//! Check kinds and how each one is queried

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

use super::CheckContext;
use crate::http::{GrpcRequest, HttpRequest};
use crate::retry::AttemptError;
use crate::ssh::BastionExecutor;
use crate::terraform::{Terraform, TerraformError};

/// Longest body excerpt kept in a mismatch report
const BODY_EXCERPT_LEN: usize = 200;

/// What a check queries and what it expects back
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckKind {
    /// Remote command on the private host, compared on trimmed stdout
    Command { command: String, expect: String },

    /// Remote `/dev/tcp` connect; `host` defaults to the private host itself
    Port {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<String>,
        port: u16,
    },

    /// s3fs mount on the private host
    Mount { path: String },

    /// Running docker container on the private host
    Container {
        name: String,
        #[serde(default = "default_true")]
        sudo: bool,
    },

    /// TCP connect from this machine
    Tcp {
        host: String,
        port: u16,
        #[serde(default = "default_tcp_timeout")]
        timeout_secs: u64,
    },

    /// HTTP request, expected status plus optional body substring
    Http {
        url: String,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default = "default_http_status")]
        status: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contains: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        headers: HashMap<String, String>,
    },

    /// Unary gRPC call, expected `grpc-status`
    Grpc {
        url: String,
        path: String,
        #[serde(default)]
        request: String,
        #[serde(default = "default_grpc_status")]
        status: String,
    },

    /// Root module output, compared on its string value
    Output { name: String, expect: String },
}

fn default_true() -> bool {
    true
}

fn default_tcp_timeout() -> u64 {
    5
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_http_status() -> u16 {
    200
}

fn default_grpc_status() -> String {
    "0".to_string()
}

impl CheckKind {
    pub fn name(&self) -> &'static str {
        match self {
            CheckKind::Command { .. } => "command",
            CheckKind::Port { .. } => "port",
            CheckKind::Mount { .. } => "mount",
            CheckKind::Container { .. } => "container",
            CheckKind::Tcp { .. } => "tcp",
            CheckKind::Http { .. } => "http",
            CheckKind::Grpc { .. } => "grpc",
            CheckKind::Output { .. } => "output",
        }
    }

    /// Runs on the private host through the bastion
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            CheckKind::Command { .. }
                | CheckKind::Port { .. }
                | CheckKind::Mount { .. }
                | CheckKind::Container { .. }
        )
    }

    pub fn expected(&self) -> String {
        match self {
            CheckKind::Command { expect, .. } | CheckKind::Output { expect, .. } => {
                expect.trim().to_string()
            }
            CheckKind::Port { port, .. } | CheckKind::Tcp { port, .. } => format!("Open {port}"),
            CheckKind::Mount { path } => format!("s3fs fuse.s3fs {path}"),
            CheckKind::Container { name, .. } => name.clone(),
            CheckKind::Http { status, .. } => status.to_string(),
            CheckKind::Grpc { status, .. } => status.clone(),
        }
    }

    /// Shell command run on the private host
    pub fn remote_command(&self, target_host: &str) -> Option<String> {
        match self {
            CheckKind::Command { command, .. } => Some(command.clone()),
            CheckKind::Port { host, port } => {
                let host = host.as_deref().unwrap_or(target_host);
                Some(format!(
                    r#"(echo >/dev/tcp/{host}/{port}) &>/dev/null && echo "Open {port}" || echo "Close {port}""#
                ))
            }
            CheckKind::Mount { path } => Some(format!(
                "df -Th {path} | tail -n +2 | awk '{{ print $1, $2, $7 }}'"
            )),
            CheckKind::Container { sudo, .. } => {
                let prefix = if *sudo { "sudo " } else { "" };
                Some(format!("{prefix}docker ps --format '{{{{.Names}}}}'"))
            }
            _ => None,
        }
    }

    /// One attempt, returning what the target answered
    pub async fn query(&self, ctx: &CheckContext) -> Result<String, AttemptError> {
        match self {
            CheckKind::Tcp {
                host,
                port,
                timeout_secs,
            } => connect_tcp(host, *port, Duration::from_secs(*timeout_secs)).await,
            CheckKind::Http {
                url,
                method,
                status,
                contains,
                body,
                headers,
            } => {
                let mut request = HttpRequest::new(method.as_str(), url.as_str()).headers(headers.clone());
                if let Some(body) = body {
                    request = request.body(body.as_str());
                }
                let response = ctx.http().send(request).await?;

                if response.status_code == *status {
                    if let Some(needle) = contains {
                        if !response.body_contains(needle) {
                            return Err(AttemptError::mismatch(
                                format!("body containing '{needle}'"),
                                excerpt(&response.body),
                            ));
                        }
                    }
                }
                Ok(response.status_code.to_string())
            }
            CheckKind::Grpc {
                url, path, request, ..
            } => {
                let response = ctx
                    .http()
                    .grpc_call(url, &GrpcRequest::new(path.as_str(), request.as_str()))
                    .await?;
                if !response.is_ok() {
                    debug!(
                        "gRPC {} answered {}: {}",
                        path,
                        response.status,
                        response.message.as_deref().unwrap_or("")
                    );
                }
                Ok(response.status)
            }
            CheckKind::Output { name, expect } => {
                let terraform = ctx.terraform().ok_or_else(|| {
                    AttemptError::Fatal(format!("output check '{name}' needs a provisioning directory"))
                })?;
                read_output(terraform, name, expect).await
            }
            remote => {
                let executor = ctx.executor().ok_or_else(|| {
                    AttemptError::Fatal(format!("{} check needs a bastion and a private host", remote.name()))
                })?;
                run_remote(remote, executor).await
            }
        }
    }
}

async fn run_remote(kind: &CheckKind, executor: &BastionExecutor) -> Result<String, AttemptError> {
    let command = kind
        .remote_command(&executor.target().hostname)
        .ok_or_else(|| AttemptError::Fatal(format!("{} check has no remote command", kind.name())))?;
    let output = executor.exec(&command).await?;

    match kind {
        // Other containers may be running on the host
        CheckKind::Container { name, .. } if output.lines().any(|line| line.trim() == name) => {
            Ok(name.clone())
        }
        _ => Ok(output),
    }
}

async fn read_output(terraform: &Terraform, name: &str, expect: &str) -> Result<String, AttemptError> {
    terraform.output(name).await.map_err(|err| match err {
        // Not populated yet, or not a scalar
        TerraformError::Output { reason, .. } => AttemptError::mismatch(expect.trim(), reason),
        TerraformError::Command { source, .. } if source.last_error().is_retryable() => {
            AttemptError::Unreachable(source.to_string())
        }
        other => AttemptError::Fatal(other.to_string()),
    })
}

async fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<String, AttemptError> {
    let address = format!("{host}:{port}");
    match tokio::time::timeout(timeout, TcpStream::connect(&address)).await {
        Ok(Ok(_)) => Ok(format!("Open {port}")),
        Ok(Err(e)) => Err(AttemptError::Unreachable(format!("{address}: {e}"))),
        Err(_) => Err(AttemptError::Unreachable(format!(
            "{address}: no answer within {}s",
            timeout.as_secs()
        ))),
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
