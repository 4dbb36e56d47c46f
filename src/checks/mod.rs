//! Validation checks
//!
//! Each check pairs a query (remote command, TCP connect, HTTP or gRPC
//! request) with the answer it expects and a retry budget.

mod check;
mod context;
mod kind;

pub use check::ValidationCheck;
pub use context::CheckContext;
pub use kind::CheckKind;
