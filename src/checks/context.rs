//! Shared clients for the checks of a suite

use crate::http::HttpClient;
use crate::ssh::BastionExecutor;
use crate::terraform::Terraform;

/// Clients shared by the checks of one suite
#[derive(Clone, Debug)]
pub struct CheckContext {
    executor: Option<BastionExecutor>,
    http: HttpClient,
    terraform: Option<Terraform>,
}

impl CheckContext {
    pub fn new(http: HttpClient) -> Self {
        Self {
            executor: None,
            http,
            terraform: None,
        }
    }

    pub fn with_executor(mut self, executor: BastionExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Working directory that `output` checks read from
    pub fn with_terraform(mut self, terraform: Terraform) -> Self {
        self.terraform = Some(terraform);
        self
    }

    pub fn executor(&self) -> Option<&BastionExecutor> {
        self.executor.as_ref()
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn terraform(&self) -> Option<&Terraform> {
        self.terraform.as_ref()
    }
}
