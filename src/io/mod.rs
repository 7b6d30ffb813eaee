//! Input/output helpers.
//!
//! - saved analysis directories + xfspec JSON (`analysis`)
//! - results table persistence (`results`)

pub mod analysis;
pub mod results;

pub use analysis::*;
pub use results::*;
