//! `nems-xfspec` library crate.
//!
//! Turns compound model names such as
//! `ozgf100ch18_wc18x2_lvl1_fir15x2_dexp1_fit01` into ordered pipelines
//! ("xfspecs"), hands them to an evaluator, and saves or reloads the results.
//!
//! The binary (`xf`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the registry and assembler can be reused by other front-ends

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod io;
pub mod registry;
pub mod report;
pub mod settings;
pub mod xforms;
