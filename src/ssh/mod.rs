//! SSH connectivity
//!
//! Runs commands on hosts directly or through a bastion, using the system
//! `ssh`/`scp` binaries.

mod bastion;
mod client;
mod identity;

pub use bastion::{BastionExecutor, HopMode};
pub use client::{SshClient, SshConfig, SshHost, SshOutput};
pub use identity::{IdentityFile, KeyPair};
