//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the compound model name (`ModelName`)
//! - pipeline steps and their operations (`Step`, `Operation`, `Xfspec`)
//! - loader acquisition options (`LoaderOptions`, `StateSignal`, `StimFormat`)
//! - fit requests and their metadata (`FitConfig`, `FitMeta`, `RecordingSource`)

pub mod types;

pub use types::*;
