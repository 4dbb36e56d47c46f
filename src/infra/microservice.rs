//! Containerized microservice behind a load balancer

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use super::{
    format_name, CapacityProvider, ConfigError, ContainerSpec, IamScope, InstanceSpec,
    NetworkPlacement, ScalingPolicy, Tier, TrafficRule,
};
use crate::config::AccountContext;

/// Typed microservice module input
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMicroservice")]
pub struct Microservice {
    pub project: String,
    pub service: String,

    /// Suffix of the ECS service / container group
    pub group: String,
    pub tier: Tier,

    /// Overrides `VPC_ID` from the account context
    pub vpc_id: Option<String>,
    pub instance_types: Vec<String>,
    pub os: String,
    pub os_version: String,
    pub key_name: Option<String>,
    pub scaling: ScalingPolicy,
    pub capacities: Vec<CapacityProvider>,
    pub container: ContainerSpec,
    pub traffics: Vec<TrafficRule>,
    pub iam: IamScope,
}

#[derive(Deserialize)]
struct RawMicroservice {
    project: String,
    service: String,
    #[serde(default = "default_group")]
    group: String,
    #[serde(default = "default_tier")]
    tier: Tier,
    #[serde(default)]
    vpc_id: Option<String>,
    instance_types: Vec<String>,
    #[serde(default = "default_os")]
    os: String,
    #[serde(default = "default_os_version")]
    os_version: String,
    #[serde(default)]
    key_name: Option<String>,
    #[serde(default = "ScalingPolicy::single")]
    scaling: ScalingPolicy,
    #[serde(default = "default_capacities")]
    capacities: Vec<CapacityProvider>,
    container: ContainerSpec,
    traffics: Vec<TrafficRule>,
    #[serde(default)]
    iam: IamScope,
}

fn default_group() -> String {
    "unique".to_string()
}

fn default_tier() -> Tier {
    Tier::Public
}

fn default_os() -> String {
    "linux".to_string()
}

fn default_os_version() -> String {
    "2023".to_string()
}

fn default_capacities() -> Vec<CapacityProvider> {
    vec![CapacityProvider::on_demand()]
}

impl TryFrom<RawMicroservice> for Microservice {
    type Error = ConfigError;

    fn try_from(raw: RawMicroservice) -> Result<Self, Self::Error> {
        let microservice = Self {
            project: raw.project,
            service: raw.service,
            group: raw.group,
            tier: raw.tier,
            vpc_id: raw.vpc_id,
            instance_types: raw.instance_types,
            os: raw.os,
            os_version: raw.os_version,
            key_name: raw.key_name,
            scaling: raw.scaling,
            capacities: raw.capacities,
            container: raw.container,
            traffics: raw.traffics,
            iam: raw.iam,
        };
        microservice.validate()?;
        Ok(microservice)
    }
}

impl Microservice {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project.trim().is_empty() || self.service.trim().is_empty() {
            return Err(ConfigError::Missing("project and service names".to_string()));
        }
        if self.instance_types.is_empty() {
            return Err(ConfigError::Missing("instance_types".to_string()));
        }
        for name in &self.instance_types {
            self.container.validate_for(InstanceSpec::lookup(name)?)?;
        }
        if self.capacities.is_empty() {
            return Err(ConfigError::Missing("capacity providers".to_string()));
        }
        if self.traffics.is_empty() {
            return Err(ConfigError::Missing("traffic rules".to_string()));
        }
        Ok(())
    }

    /// Smallest instance of the list, used to size the task
    pub fn sizing_instance(&self) -> Result<&'static InstanceSpec, ConfigError> {
        let mut smallest: Option<&'static InstanceSpec> = None;
        for name in &self.instance_types {
            let spec = InstanceSpec::lookup(name)?;
            if smallest.map_or(true, |s| spec.memory_allowed < s.memory_allowed) {
                smallest = Some(spec);
            }
        }
        smallest.ok_or_else(|| ConfigError::Missing("instance_types".to_string()))
    }

    /// `<prefix>-<project>-<service>-<suffix>`
    pub fn name(&self, name_prefix: &str, name_suffix: &str) -> String {
        format_name("-", &[name_prefix, self.project.as_str(), self.service.as_str(), name_suffix])
    }

    /// Variable tree of the microservice module
    pub fn to_vars(
        &self,
        account: &AccountContext,
        name_prefix: &str,
        name_suffix: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<Map<String, Value>, ConfigError> {
        let vpc_id = match &self.vpc_id {
            Some(id) => id.clone(),
            None => account
                .require_vpc_id()
                .map_err(|_| ConfigError::Missing("VPC_ID or vpc_id".to_string()))?
                .to_string(),
        };
        let placement = NetworkPlacement::new(vpc_id, self.tier)?;
        let instance = self.sizing_instance()?;

        let vars = json!({
            "name_prefix": name_prefix,
            "name_suffix": name_suffix,
            "vpc": placement.to_value(),
            "microservice": {
                "container": {
                    "group": {
                        "name": self.group,
                        "deployment": {
                            "min_size": self.scaling.min(),
                            "max_size": self.scaling.max(),
                            "desired_size": self.scaling.desired(),
                            "container": self.container.to_value(instance),
                        },
                        "ec2": {
                            "key_name": self.key_name,
                            "instance_types": self.instance_types,
                            "os": self.os,
                            "os_version": self.os_version,
                            "architecture": instance.architecture,
                            "capacities": self.capacities.iter().map(CapacityProvider::to_value).collect::<Vec<_>>(),
                        },
                    },
                    "ecs": {},
                },
                "traffics": self.traffics.iter().map(TrafficRule::to_value).collect::<Vec<_>>(),
                "iam": self.iam.to_value(),
            },
            "tags": tags,
        });

        match vars {
            Value::Object(map) => Ok(map),
            _ => Err(ConfigError::invalid("microservice", "variables are not an object")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRPC_YAML: &str = r#"
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
"#;

    fn account() -> AccountContext {
        AccountContext {
            vpc_id: Some("vpc-013a411b59dd8a08e".to_string()),
            ..AccountContext::new("dev", "123456789012", "us-east-1")
        }
    }

    #[test]
    fn test_grpc_microservice_vars() {
        let microservice: Microservice = serde_yaml::from_str(GRPC_YAML).unwrap();
        let tags = BTreeMap::from([("Project".to_string(), "ms".to_string())]);
        let vars = microservice.to_vars(&account(), "pre", "a1b2", &tags).unwrap();

        assert_eq!(vars["vpc"], json!({"id": "vpc-013a411b59dd8a08e", "tier": "public"}));
        let group = &vars["microservice"]["container"]["group"];
        assert_eq!(group["name"], json!("unique"));
        assert_eq!(group["deployment"]["desired_size"], json!(1));
        assert_eq!(group["deployment"]["container"]["memory"], json!(1801));
        assert_eq!(group["ec2"]["capacities"][0]["type"], json!("ON_DEMAND"));
        assert_eq!(vars["microservice"]["traffics"][0]["target"]["protocol_version"], json!("grpc"));
        assert_eq!(vars["tags"]["Project"], json!("ms"));
    }

    #[test]
    fn test_names() {
        let microservice: Microservice = serde_yaml::from_str(GRPC_YAML).unwrap();
        assert_eq!(microservice.name("", "a1b2"), "ms-grpc-a1b2");
        assert_eq!(microservice.name("pre", "a1b2"), "pre-ms-grpc-a1b2");
    }

    #[test]
    fn test_missing_vpc() {
        let microservice: Microservice = serde_yaml::from_str(GRPC_YAML).unwrap();
        let account = AccountContext::new("dev", "1", "us-east-1");
        let err = microservice.to_vars(&account, "", "", &BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("VPC_ID"));
    }

    #[test]
    fn test_unknown_instance_rejected() {
        let yaml = GRPC_YAML.replace("t3.small", "m5.large");
        let result: Result<Microservice, _> = serde_yaml::from_str(&yaml);
        assert!(result.unwrap_err().to_string().contains("m5.large"));
    }

    #[test]
    fn test_grpc_behind_http_rejected() {
        let yaml = GRPC_YAML.replace("{port: 443, protocol: https}", "{port: 80, protocol: http}");
        let result: Result<Microservice, _> = serde_yaml::from_str(&yaml);
        assert!(result.is_err());
    }

    #[test]
    fn test_sizing_instance_is_smallest() {
        let yaml = GRPC_YAML.replace("[t3.small]", "[t3.medium, t3.small]");
        let microservice: Microservice = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(microservice.sizing_instance().unwrap().name, "t3.small");
    }
}
