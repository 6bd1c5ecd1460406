//! Pipeline module.
//!
//! Orchestration of a report run plus progress and cancellation support.

pub mod progress;
mod runner;

pub use progress::{
    CancellationToken, ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
pub use runner::{Pipeline, PipelineBuilder, RunOutcome};
