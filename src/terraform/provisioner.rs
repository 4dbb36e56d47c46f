//! Provisioner seam used by the stage runner

use anyhow::Result;

/// Something that can create and tear down a deployment
#[allow(async_fn_in_trait)]
pub trait Provisioner {
    /// Human readable name used in logs and reports
    fn name(&self) -> &str;

    /// Create or update the deployment
    async fn deploy(&self) -> Result<()>;

    /// Tear the deployment down
    async fn destroy(&self) -> Result<()>;
}
