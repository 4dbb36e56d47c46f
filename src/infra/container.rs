//! Container image and task definition

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::{ConfigError, InstanceSpec};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Public,
    Private,
}

/// Elastic container registry coordinates
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcrRegistry {
    pub privacy: Privacy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ecr: Option<EcrRegistry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<Registry>,
    pub repository: String,
    #[serde(default = "default_tag")]
    pub tag: String,
}

fn default_tag() -> String {
    "latest".to_string()
}

impl DockerImage {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repository.trim().is_empty() {
            return Err(ConfigError::Missing("docker repository".to_string()));
        }
        if self.tag.trim().is_empty() {
            return Err(ConfigError::Missing("docker image tag".to_string()));
        }
        Ok(())
    }

    pub fn to_value(&self) -> Value {
        let mut value = json!({
            "repository": {"name": self.repository},
            "image": {"tag": self.tag},
        });
        if let Some(registry) = &self.registry {
            value["registry"] = json!(registry);
        }
        value
    }
}

/// Container of a task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub docker: DockerImage,

    /// CPU units; defaults to the whole instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,

    /// MiB; defaults to what ECS leaves for tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entrypoint: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default)]
    pub readonly_root_filesystem: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
}

impl ContainerSpec {
    /// Check the container fits on `instance`
    pub fn validate_for(&self, instance: &InstanceSpec) -> Result<(), ConfigError> {
        self.docker.validate()?;
        if self.name.trim().is_empty() {
            return Err(ConfigError::Missing("container name".to_string()));
        }
        if let Some(cpu) = self.cpu {
            if cpu > instance.cpu {
                return Err(ConfigError::invalid(
                    "container cpu",
                    format!("{cpu} exceeds the {} units of {}", instance.cpu, instance.name),
                ));
            }
        }
        if let Some(memory) = self.memory {
            if memory > instance.memory_allowed {
                return Err(ConfigError::invalid(
                    "container memory",
                    format!(
                        "{memory} MiB exceeds the {} MiB ECS allows on {} ({} MiB reserved)",
                        instance.memory_allowed,
                        instance.name,
                        instance.memory_headroom()
                    ),
                ));
            }
        }
        if let Some(gpu) = self.gpu {
            if gpu > instance.gpu.unwrap_or(0) {
                return Err(ConfigError::invalid(
                    "container gpu",
                    format!("{} has {} GPU(s)", instance.name, instance.gpu.unwrap_or(0)),
                ));
            }
        }
        Ok(())
    }

    /// Variable tree, with unset resources filled in from `instance`
    pub fn to_value(&self, instance: &InstanceSpec) -> Value {
        json!({
            "name": self.name,
            "docker": self.docker.to_value(),
            "cpu": self.cpu.unwrap_or(instance.cpu),
            "memory": self.memory.unwrap_or(instance.memory_allowed),
            "gpu": self.gpu.or(instance.gpu),
            "entrypoint": self.entrypoint,
            "command": self.command,
            "readonly_root_filesystem": self.readonly_root_filesystem,
            "environment": self.environment,
        })
    }
}
