//! Scoped deployment
//!
//! Teardown runs exactly once on every exit path: success, deploy failure,
//! validation failure, or panic. A panic is re-raised after teardown.

use anyhow::{anyhow, Result};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::{resume_unwind, AssertUnwindSafe};
use tracing::{error, info, warn};

use super::{StageSet, CLEANUP, DEPLOY, VALIDATE};
use crate::models::StageResult;
use crate::terraform::Provisioner;
use crate::utils::Timer;

/// What happened in a scoped deployment
#[derive(Debug)]
pub struct DeploymentRun<T> {
    /// Results of deploy, validate and cleanup, in order
    pub stages: Vec<StageResult>,

    /// Validation value (`None` when validation was skipped) or the first error
    pub outcome: Result<Option<T>>,
}

type PanicPayload = Box<dyn Any + Send + 'static>;

fn panic_message(payload: &PanicPayload) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Deploy with `provisioner`, run `validate`, then tear down
pub async fn with_deployment<P, F, Fut, T>(
    provisioner: &P,
    stages: &StageSet,
    validate: F,
) -> DeploymentRun<T>
where
    P: Provisioner,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let name = provisioner.name().to_string();
    let mut results = Vec::new();
    let mut failure: Option<anyhow::Error> = None;
    let mut panicked: Option<PanicPayload> = None;
    let mut value = None;

    if stages.is_skipped(DEPLOY) {
        results.push(StageResult::skip(DEPLOY));
    } else {
        let timer = Timer::start(format!("{name} deploy"));
        let outcome = AssertUnwindSafe(provisioner.deploy()).catch_unwind().await;
        let elapsed_ms = timer.stop();
        match outcome {
            Ok(Ok(())) => results.push(StageResult::pass(DEPLOY, elapsed_ms)),
            Ok(Err(e)) => {
                error!("Deploy of {} failed: {:#}", name, e);
                results.push(StageResult::fail(DEPLOY, elapsed_ms, format!("{e:#}")));
                failure = Some(e.context(format!("Deploy of {name} failed")));
            }
            Err(payload) => {
                error!("Deploy of {} panicked: {}", name, panic_message(&payload));
                results.push(StageResult::error(DEPLOY, elapsed_ms, panic_message(&payload)));
                panicked = Some(payload);
            }
        }
    }

    if stages.is_skipped(VALIDATE) {
        results.push(StageResult::skip(VALIDATE));
    } else if failure.is_some() || panicked.is_some() {
        results.push(StageResult::skip(VALIDATE));
    } else {
        let timer = Timer::start(format!("{name} validate"));
        let outcome = AssertUnwindSafe(validate()).catch_unwind().await;
        let elapsed_ms = timer.stop();
        match outcome {
            Ok(Ok(v)) => {
                results.push(StageResult::pass(VALIDATE, elapsed_ms));
                value = Some(v);
            }
            Ok(Err(e)) => {
                results.push(StageResult::fail(VALIDATE, elapsed_ms, format!("{e:#}")));
                failure = Some(e);
            }
            Err(payload) => {
                error!("Validation of {} panicked: {}", name, panic_message(&payload));
                results.push(StageResult::error(VALIDATE, elapsed_ms, panic_message(&payload)));
                panicked = Some(payload);
            }
        }
    }

    if stages.is_skipped(CLEANUP) {
        results.push(StageResult::skip(CLEANUP));
    } else {
        let timer = Timer::start(format!("{name} cleanup"));
        let outcome = AssertUnwindSafe(provisioner.destroy()).catch_unwind().await;
        let elapsed_ms = timer.stop();
        match outcome {
            Ok(Ok(())) => {
                info!("Cleanup of {} complete", name);
                results.push(StageResult::pass(CLEANUP, elapsed_ms));
            }
            Ok(Err(e)) => {
                warn!("Cleanup of {} failed: {:#}", name, e);
                results.push(StageResult::fail(CLEANUP, elapsed_ms, format!("{e:#}")));
                if failure.is_none() && panicked.is_none() {
                    failure = Some(e.context(format!("Cleanup of {name} failed")));
                }
            }
            Err(payload) => {
                warn!("Cleanup of {} panicked: {}", name, panic_message(&payload));
                results.push(StageResult::error(CLEANUP, elapsed_ms, panic_message(&payload)));
                if panicked.is_none() && failure.is_none() {
                    failure = Some(anyhow!("Cleanup of {name} panicked: {}", panic_message(&payload)));
                }
            }
        }
    }

    if let Some(payload) = panicked {
        resume_unwind(payload);
    }

    DeploymentRun {
        stages: results,
        outcome: match failure {
            Some(e) => Err(e),
            None => Ok(value),
        },
    }
}
