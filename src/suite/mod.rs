//! Validation suites
//!
//! A suite names what to deploy and what to check; the runner drives one
//! suite through its stages and the executor schedules many.

mod definition;
mod executor;
mod runner;

pub use definition::{InfraSection, OutputNames, SuiteDefinition};
pub use executor::SuiteExecutor;
pub use runner::{run_checks, SuiteRunner};
