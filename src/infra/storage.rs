//! Data storage host: EC2 instance with S3 buckets behind a bastion

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{format_name, ConfigError, NetworkPlacement, Tier};
use crate::config::AccountContext;

/// Network outputs of the VPC the storage host lives in
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcNetwork {
    pub vpc_id: String,
    pub vpc_cidr_block: String,
    pub private_subnets: Vec<String>,
    pub public_subnets: Vec<String>,
    pub security_group_ids: Vec<String>,
}

impl VpcNetwork {
    pub fn validate(&self) -> Result<(), ConfigError> {
        NetworkPlacement::new(self.vpc_id.as_str(), Tier::Private)?;
        if self.private_subnets.is_empty() {
            return Err(ConfigError::Missing("private subnets".to_string()));
        }
        if self.public_subnets.is_empty() {
            return Err(ConfigError::Missing("public subnets (needed by the bastion)".to_string()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStorage {
    /// Engine name, e.g. `mongodb`
    pub name: String,
    pub ami_id: String,
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
    pub user_data_path: String,
    #[serde(default)]
    pub user_data_args: BTreeMap<String, String>,
    #[serde(default = "default_bastion")]
    pub bastion: bool,

    /// Buckets the host mounts; each gets a `bucket_name_<bucket>` user data arg
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buckets: Vec<String>,

    /// Working dir of the VPC module whose outputs give the network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_dir: Option<PathBuf>,
}

fn default_instance_type() -> String {
    "t2.micro".to_string()
}

fn default_bastion() -> bool {
    true
}

impl DataStorage {
    /// `<account>-<region>-<project>-<name>-<test id>`
    pub fn storage_name(&self, project: &str, account: &AccountContext, test_id: &str) -> String {
        format_name(
            "-",
            &[
                account.account_name.as_str(),
                account.region.as_str(),
                project,
                self.name.as_str(),
                test_id,
            ],
        )
    }

    /// `<storage name>-<bucket>` for every bucket
    pub fn bucket_names(&self, storage_name: &str) -> BTreeMap<String, String> {
        self.buckets
            .iter()
            .map(|bucket| (bucket.clone(), format_name("-", &[storage_name, bucket.as_str()])))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.ami_id.starts_with("ami-") {
            return Err(ConfigError::invalid("ami_id", format!("'{}' is not an AMI id", self.ami_id)));
        }
        if self.user_data_path.trim().is_empty() {
            return Err(ConfigError::Missing("user_data_path".to_string()));
        }
        Ok(())
    }

    /// Variable tree of the data storage module
    pub fn to_vars(
        &self,
        project: &str,
        account: &AccountContext,
        network: &VpcNetwork,
        test_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<Map<String, Value>, ConfigError> {
        self.validate()?;
        network.validate()?;

        let storage_name = self.storage_name(project, account, test_id);
        let mut user_data_args = self.user_data_args.clone();
        for (bucket, name) in self.bucket_names(&storage_name) {
            user_data_args.entry(format!("bucket_name_{bucket}")).or_insert(name);
        }

        let vars = json!({
            "aws_region": account.region,
            "data_storage_name": storage_name,
            "private_subnets": network.private_subnets,
            "public_subnets": network.public_subnets,
            "vpc_security_group_ids": network.security_group_ids,
            "vpc_id": network.vpc_id,
            "vpc_cidr_block": network.vpc_cidr_block,
            "common_tags": tags,
            "ami_id": self.ami_id,
            "instance_type": self.instance_type,
            "user_data_path": self.user_data_path,
            "user_data_args": user_data_args,
            "bastion": self.bastion,
        });

        match vars {
            Value::Object(map) => Ok(map),
            _ => Err(ConfigError::invalid("data storage", "variables are not an object")),
        }
    }
}
