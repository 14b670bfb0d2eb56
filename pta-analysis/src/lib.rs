//! Whole-program pointer analyses over [`pta_ir`].
//!
//! The [`dataflow`] module holds a generic fixed-point engine.  [`points_to`] builds the
//! interprocedural points-to analysis and call graph on top of it and [`dataflow::live_variables`]
//! is a small backward client of the same engine.

pub mod config;
pub mod dataflow;
pub mod error;
pub mod passes;
pub mod points_to;
pub mod report;

pub use config::{AnalysisConfig, ConfigOptions};
pub use error::{AnalysisError, ConfigError};
pub use passes::*;
pub use points_to::{analyse_context, analyse_module, PointsToResult};
pub use report::CallGraphReport;
