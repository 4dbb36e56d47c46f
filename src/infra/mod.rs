//! Typed infrastructure configuration
//!
//! Module inputs are built from validated structs and serialized to the
//! variable tree the provisioning tool consumes.

mod compute;
mod container;
mod error;
mod iam;
mod microservice;
mod naming;
mod network;
mod storage;
mod traffic;

pub use compute::{CapacityProvider, InstanceSpec, ScalingPolicy};
pub use container::ContainerSpec;
pub use error::ConfigError;
pub use iam::IamScope;
pub use microservice::Microservice;
pub use naming::{common_tags, format_name, random_id};
pub use network::{NetworkPlacement, Tier};
pub use storage::{DataStorage, VpcNetwork};
pub use traffic::{Protocol, TrafficRule};
