//! Automotive Sales Report Library
//!
//! Turns a raw table of vehicle sales into an executive report: validated
//! records, a compact statistical context, a language-model narrative and a
//! set of interactive charts, assembled into Markdown and HTML.
//!
//! # Overview
//!
//! A run moves through fixed components, each consuming only the output of
//! the one before it:
//!
//! - **Validation**: [`Validator`] checks every row against declarative
//!   [`ValidationRules`] and drops rows that break them
//! - **Transformation**: [`Transformer`] imputes gaps and aggregates the
//!   [`Dataset`] into a budgeted [`ContextDocument`]
//! - **Prompting**: [`PromptBuilder`] combines role, task and context into a
//!   [`PromptPayload`]
//! - **Model call**: [`LlmClient`] sends the payload through a
//!   [`ModelEndpoint`] with bounded retries and exponential backoff
//! - **Charts**: [`Visualizer`] writes one HTML chart per [`ChartSpec`]
//! - **Assembly**: [`ReportAssembler`] merges the parsed [`Narrative`] and
//!   the charts into the final report
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sales_report::{LlmConfig, Pipeline, ReportConfig};
//!
//! let config = ReportConfig::builder()
//!     .output_dir("output")
//!     .top_n(5)
//!     .build()?;
//!
//! let outcome = Pipeline::builder()
//!     .config(config)
//!     .llm_config(LlmConfig::default())
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run_path("data/sales.csv")?;
//!
//! if !outcome.narrative_available() {
//!     eprintln!("report written without a narrative");
//! }
//! ```
//!
//! # Model Endpoints
//!
//! With the `ai` feature (on by default) two endpoints are available:
//!
//! - [`llm::GeminiEndpoint`] - Google Gemini `generateContent`
//! - [`llm::OpenRouterEndpoint`] - OpenRouter chat completions
//!
//! Any type implementing [`ModelEndpoint`] can be supplied through
//! [`PipelineBuilder::endpoint`]; the retry loop is shared.
//!
//! # Failure Model
//!
//! Only missing required columns, too many invalid rows, an over-budget
//! prompt, invalid configuration and cancellation stop a run. A failed
//! model call, a chart that cannot be drawn or a file that cannot be
//! written leave a warning in [`RunOutcome::warnings`] and the rest of the
//! report is still produced.

pub mod analysis;
pub mod config;
pub mod dataset;
pub mod error;
pub mod llm;
pub mod loader;
pub mod narrative;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod schema;
pub mod transform;
pub mod validator;
pub mod visualizer;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use analysis::{Analyzer, BinSpec, Cagr, GrowthMethod, GrowthMetric, PeriodChange};
pub use config::{ConfigValidationError, LlmConfig, PromptTemplates, Provider, ReportConfig, ReportConfigBuilder};
pub use dataset::{Dataset, DatasetMeta};
pub use error::{ReportError, Result as ReportResult, ResultExt};
pub use llm::{
    ApiKey, EndpointError, FailureKind, LlmClient, ModelEndpoint, ModelResponse, ResponseStatus, RetryPolicy,
};
pub use loader::load_table;
pub use narrative::{Narrative, ReportSection};
pub use pipeline::{
    CancellationToken, ClosureProgressReporter, Pipeline, PipelineBuilder, PipelineStage, ProgressReporter,
    ProgressUpdate, RunOutcome,
};
pub use prompt::{PromptBuilder, PromptPayload};
pub use report::{Report, ReportAssembler, ReportMetadata, ReportSkeleton, WriteOutcome};
pub use schema::{FuelType, Record, Region, Transmission};
pub use transform::{ContextDocument, ImputationPolicy, Transformer};
pub use validator::{ValidationResult, ValidationRules, Validator};
pub use visualizer::{ChartArtifact, ChartKind, ChartRender, ChartSpec, Visualizer};
