//! Compute sizing: instance catalog, scaling and capacity providers

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::ConfigError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    X86_64,
    Arm64,
}

/// Instance type with the resources ECS can hand out to tasks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct InstanceSpec {
    pub name: &'static str,

    /// CPU units (1024 per vCPU)
    pub cpu: u32,

    /// MiB on the instance
    pub memory: u32,

    /// MiB left for tasks once the ECS agent and OS are served
    pub memory_allowed: u32,
    pub gpu: Option<u32>,
    pub architecture: Architecture,
}

pub const T3_SMALL: InstanceSpec = InstanceSpec {
    name: "t3.small",
    cpu: 2048,
    memory: 2048,
    memory_allowed: 1801,
    gpu: None,
    architecture: Architecture::X86_64,
};

pub const T3_MEDIUM: InstanceSpec = InstanceSpec {
    name: "t3.medium",
    cpu: 2048,
    memory: 4096,
    memory_allowed: 3828,
    gpu: None,
    architecture: Architecture::X86_64,
};

pub const G4DN_XLARGE: InstanceSpec = InstanceSpec {
    name: "g4dn.xlarge",
    cpu: 4096,
    memory: 16384,
    memory_allowed: 15731,
    gpu: Some(1),
    architecture: Architecture::X86_64,
};

pub const INSTANCE_CATALOG: &[InstanceSpec] = &[T3_SMALL, T3_MEDIUM, G4DN_XLARGE];

impl InstanceSpec {
    pub fn lookup(name: &str) -> Result<&'static InstanceSpec, ConfigError> {
        INSTANCE_CATALOG
            .iter()
            .find(|spec| spec.name == name)
            .ok_or_else(|| ConfigError::UnknownInstance(name.to_string()))
    }

    /// Memory ECS keeps for itself on this instance
    pub fn memory_headroom(&self) -> u32 {
        self.memory - self.memory_allowed
    }
}

/// Task or instance count bounds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawScaling")]
pub struct ScalingPolicy {
    min: u32,
    desired: u32,
    max: u32,
}

#[derive(Deserialize)]
struct RawScaling {
    min: u32,
    desired: u32,
    max: u32,
}

impl TryFrom<RawScaling> for ScalingPolicy {
    type Error = ConfigError;

    fn try_from(raw: RawScaling) -> Result<Self, Self::Error> {
        Self::new(raw.min, raw.desired, raw.max)
    }
}

impl ScalingPolicy {
    pub fn new(min: u32, desired: u32, max: u32) -> Result<Self, ConfigError> {
        if min > desired || desired > max {
            return Err(ConfigError::invalid(
                "scaling",
                format!("expected min <= desired <= max, got {min}/{desired}/{max}"),
            ));
        }
        if max == 0 {
            return Err(ConfigError::invalid("scaling", "max must be at least 1"));
        }
        Ok(Self { min, desired, max })
    }

    /// One instance, no scaling
    pub fn single() -> Self {
        Self {
            min: 1,
            desired: 1,
            max: 1,
        }
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn desired(&self) -> u32 {
        self.desired
    }

    pub fn max(&self) -> u32 {
        self.max
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapacityKind {
    OnDemand,
    Spot,
}

/// Purchase option backing a share of the instances
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCapacity")]
pub struct CapacityProvider {
    kind: CapacityKind,
    base: Option<u32>,
    weight: u32,
    target_capacity_cpu_percent: u32,
}

#[derive(Deserialize)]
struct RawCapacity {
    kind: CapacityKind,
    #[serde(default)]
    base: Option<u32>,
    weight: u32,
    #[serde(default = "default_target_cpu")]
    target_capacity_cpu_percent: u32,
}

fn default_target_cpu() -> u32 {
    70
}

impl TryFrom<RawCapacity> for CapacityProvider {
    type Error = ConfigError;

    fn try_from(raw: RawCapacity) -> Result<Self, Self::Error> {
        Self::new(raw.kind, raw.base, raw.weight, raw.target_capacity_cpu_percent)
    }
}

impl CapacityProvider {
    pub fn new(
        kind: CapacityKind,
        base: Option<u32>,
        weight: u32,
        target_capacity_cpu_percent: u32,
    ) -> Result<Self, ConfigError> {
        if weight > 100 {
            return Err(ConfigError::invalid("capacity weight", format!("{weight} is not in 0..=100")));
        }
        if !(1..=100).contains(&target_capacity_cpu_percent) {
            return Err(ConfigError::invalid(
                "target_capacity_cpu_percent",
                format!("{target_capacity_cpu_percent} is not in 1..=100"),
            ));
        }
        Ok(Self {
            kind,
            base,
            weight,
            target_capacity_cpu_percent,
        })
    }

    /// On-demand, no base, half the weight
    pub fn on_demand() -> Self {
        Self {
            kind: CapacityKind::OnDemand,
            base: None,
            weight: 50,
            target_capacity_cpu_percent: default_target_cpu(),
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "type": self.kind,
            "base": self.base,
            "weight": self.weight,
            "target_capacity_cpu_percent": self.target_capacity_cpu_percent,
        })
    }
}
