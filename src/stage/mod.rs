//! Validation stages
//!
//! A run is split into named stages (`deploy`, `validate`, `cleanup`, plus
//! any sub-stages) that can be skipped independently, with teardown scoped
//! to the deployment.

mod scope;
mod stages;
mod store;

pub use scope::{with_deployment, DeploymentRun};
pub use stages::{StageSet, CLEANUP, DEPLOY, VALIDATE};
pub use store::StageStore;
