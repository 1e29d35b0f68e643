//! Pipeline module.
//!
//! This module provides the orchestrator that runs the processing stages in
//! order, plus progress reporting.

mod builder;
mod executor;
pub mod progress;

pub use builder::{Pipeline, PipelineBuilder, PipelineOutput, run};
pub use executor::{StageExecutor, detect_only};
pub use progress::{ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate};
