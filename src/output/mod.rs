//! Output formatting module
//!
//! Renders suite reports for the terminal and for files.

mod formatter;

pub use formatter::{write_reports_to_file, OutputFormat, ResultFormatter};
