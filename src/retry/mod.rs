//! Polling validation harness
//!
//! Repeatedly invokes a query until it yields the expected value or the
//! retry budget runs out.

mod error;
mod harness;
mod policy;

pub use error::{AttemptError, RetryError};
pub use harness::{do_with_retry, do_with_retry_expecting, Attempted};
pub use policy::RetryPolicy;
pub(crate) use policy::duration_secs;
