//! Progress reporting and cancellation support for report runs.
//!
//! # Example
//!
//! ```rust,ignore
//! use sales_report::{CancellationToken, Pipeline};
//!
//! let token = CancellationToken::new();
//! let token_clone = token.clone();
//!
//! // In another thread (e.g. a Ctrl-C handler)
//! std::thread::spawn(move || token_clone.cancel());
//!
//! let outcome = Pipeline::builder()
//!     .config(config)
//!     .llm_config(llm_config)
//!     .cancellation_token(token)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run_path("data/sales.csv");
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Stages of a report run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Reading the input table
    Loading,
    /// Checking rows against the validation rules
    Validating,
    /// Imputing and aggregating into the context document
    Transforming,
    /// Writing chart files
    Rendering,
    /// Building the prompt payload
    Prompting,
    /// Waiting on the model, retries included
    Invoking,
    /// Parsing the narrative and writing the report files
    Assembling,
    Complete,
    Cancelled,
    Failed,
}

impl PipelineStage {
    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Loading => "Loading Data",
            Self::Validating => "Validating Records",
            Self::Transforming => "Building Context",
            Self::Rendering => "Rendering Charts",
            Self::Prompting => "Building Prompt",
            Self::Invoking => "Calling Model",
            Self::Assembling => "Assembling Report",
            Self::Complete => "Complete",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }

    /// Share of the whole run (0.0 - 1.0). Main stages sum to 1.0.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Loading => 0.05,
            Self::Validating => 0.10,
            Self::Transforming => 0.15,
            Self::Rendering => 0.15,
            Self::Prompting => 0.05,
            Self::Invoking => 0.40,
            Self::Assembling => 0.10,
            Self::Complete | Self::Cancelled | Self::Failed => 0.0,
        }
    }

    /// Returns the cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Loading => 0.0,
            Self::Validating => 0.05,
            Self::Transforming => 0.15,
            Self::Rendering => 0.30,
            Self::Prompting => 0.45,
            Self::Invoking => 0.50,
            Self::Assembling => 0.90,
            Self::Complete => 1.0,
            Self::Cancelled | Self::Failed => 0.0,
        }
    }
}

/// One progress notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: PipelineStage,

    /// Optional detail (e.g. "Chart: top-models")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_stage: Option<String>,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within current stage (0.0 - 1.0)
    pub stage_progress: f32,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_processed: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
}

impl ProgressUpdate {
    pub fn new(stage: PipelineStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            sub_stage: None,
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }

    /// Update carrying item counts; stage progress is `current / total`.
    pub fn with_items(
        stage: PipelineStage,
        sub_stage: impl Into<String>,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        let stage_progress = if total > 0 {
            current as f32 / total as f32
        } else {
            0.0
        };
        Self {
            sub_stage: Some(sub_stage.into()),
            items_processed: Some(current),
            items_total: Some(total),
            ..Self::new(stage, stage_progress, message)
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            stage: PipelineStage::Complete,
            sub_stage: None,
            progress: 1.0,
            stage_progress: 1.0,
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            message: "Run cancelled".to_string(),
            ..Self::terminal(PipelineStage::Cancelled)
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::terminal(PipelineStage::Failed)
        }
    }

    fn terminal(stage: PipelineStage) -> Self {
        Self {
            stage,
            sub_stage: None,
            progress: 0.0,
            stage_progress: 0.0,
            message: String::new(),
            items_processed: None,
            items_total: None,
        }
    }
}

/// Receives progress updates during a run.
///
/// Implementations must be `Send + Sync`: the transformer and the visualizer
/// may report from different threads.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// [`ProgressReporter`] backed by a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

/// Token for cancelling a running pipeline.
///
/// Clones share one atomic flag. The pipeline checks it at every component
/// boundary and while waiting between model attempts, and then returns
/// [`ReportError::Cancelled`](crate::error::ReportError::Cancelled).
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(CancellationToken: Send, Sync);
static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. Safe to call from any thread.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can serve another run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}
