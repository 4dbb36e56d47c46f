//! Provisioning tool driver
//!
//! Drives `terraform` (or a CLI-compatible wrapper such as `terragrunt` or
//! `tofu`) to deploy, query, and destroy the infrastructure under test.

mod error;
mod options;
mod provisioner;
mod runner;

pub use error::TerraformError;
pub use options::TerraformOptions;
pub use provisioner::Provisioner;
pub use runner::Terraform;
