//! VPC placement of a deployment

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::ConfigError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Public,
    Private,
}

/// Which VPC and subnet tier a workload lands in
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPlacement")]
pub struct NetworkPlacement {
    vpc_id: String,
    tier: Tier,
}

#[derive(Deserialize)]
struct RawPlacement {
    vpc_id: String,
    tier: Tier,
}

impl TryFrom<RawPlacement> for NetworkPlacement {
    type Error = ConfigError;

    fn try_from(raw: RawPlacement) -> Result<Self, Self::Error> {
        Self::new(raw.vpc_id, raw.tier)
    }
}

impl NetworkPlacement {
    pub fn new(vpc_id: impl Into<String>, tier: Tier) -> Result<Self, ConfigError> {
        let vpc_id = vpc_id.into();
        if !vpc_id.starts_with("vpc-") || vpc_id.len() <= "vpc-".len() {
            return Err(ConfigError::invalid("vpc_id", format!("'{vpc_id}' is not a VPC id")));
        }
        Ok(Self { vpc_id, tier })
    }

    pub fn to_value(&self) -> Value {
        json!({"id": self.vpc_id, "tier": self.tier})
    }
}
