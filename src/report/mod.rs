//! Reporting utilities: pipelines, registry codes, and fit summaries.

pub mod format;

pub use format::*;
