//! IAM scope of a workload

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Who may assume the workload's roles
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Accounts,
    Microservices,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IamScope {
    pub scope: Scope,
    #[serde(default)]
    pub requires_mfa: bool,
}

impl Default for IamScope {
    fn default() -> Self {
        Self {
            scope: Scope::Accounts,
            requires_mfa: false,
        }
    }
}

impl IamScope {
    pub fn to_value(&self) -> Value {
        json!({"scope": self.scope, "requires_mfa": self.requires_mfa})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scope() {
        assert_eq!(
            IamScope::default().to_value(),
            json!({"scope": "accounts", "requires_mfa": false})
        );
        let scope: IamScope = serde_yaml::from_str("scope: microservices\n").unwrap();
        assert_eq!(scope.scope, Scope::Microservices);
        assert!(!scope.requires_mfa);
    }
}
