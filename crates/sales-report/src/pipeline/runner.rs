//! The report pipeline and its builder.

use crate::config::{LlmConfig, ReportConfig};
use crate::dataset::Dataset;
use crate::error::{ReportError, Result};
use crate::llm::{
    JitterSource, LlmClient, ModelEndpoint, ModelResponse, RandJitter, Sleeper, ThreadSleeper,
};
use crate::loader::load_table;
use crate::narrative::Narrative;
use crate::pipeline::progress::{
    CancellationToken, ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
use crate::prompt::{PromptBuilder, PromptPayload};
use crate::report::{Report, ReportAssembler, ReportMetadata, ReportSkeleton, WriteOutcome};
use crate::transform::{ContextDocument, Transformer};
use crate::validator::{RULE_REQUIRED_COLUMN, ValidationResult, Validator};
use crate::visualizer::{ChartRender, Visualizer, VisualizerOptions};
use polars::prelude::DataFrame;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Everything a run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub validation: ValidationResult,
    pub dataset: Dataset,
    pub context: ContextDocument,
    pub prompt: PromptPayload,
    pub charts: ChartRender,
    /// `None` for a dry run.
    pub response: Option<ModelResponse>,
    pub narrative: Option<Narrative>,
    pub report: Option<Report>,
    pub written: Option<WriteOutcome>,
    /// Non-fatal problems: dropped rows, imputed values, failed charts,
    /// a degraded narrative, files that could not be written.
    pub warnings: Vec<String>,
    pub duration: Duration,
}

impl RunOutcome {
    /// Whether the narrative came from the model rather than a placeholder.
    pub fn narrative_available(&self) -> bool {
        self.response.as_ref().is_some_and(ModelResponse::is_success)
    }
}

/// The report pipeline.
///
/// Use [`Pipeline::builder()`] to create one.
///
/// # Example
///
/// ```rust,ignore
/// use sales_report::{LlmConfig, Pipeline, ReportConfig};
///
/// let outcome = Pipeline::builder()
///     .config(ReportConfig::default())
///     .llm_config(LlmConfig::default())
///     .build()?
///     .run_path("data/sales.csv")?;
///
/// for warning in &outcome.warnings {
///     eprintln!("warning: {warning}");
/// }
/// ```
pub struct Pipeline {
    config: ReportConfig,
    llm_config: LlmConfig,
    endpoint: Option<Box<dyn ModelEndpoint>>,
    sleeper: Arc<dyn Sleeper>,
    jitter: Arc<dyn JitterSource>,
    skeleton: ReportSkeleton,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: CancellationToken,
    dry_run: bool,
}

static_assertions::assert_impl_all!(Pipeline: Send, Sync);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Load a CSV, TSV or Parquet file and run the pipeline on it.
    pub fn run_path(&self, path: impl AsRef<Path>) -> Result<RunOutcome> {
        let path = path.as_ref();
        let source = path.display().to_string();
        self.finish(self.check_cancelled().and_then(|_| {
            self.report_progress(ProgressUpdate::new(
                PipelineStage::Loading,
                0.0,
                format!("Loading {}", source),
            ));
            let df = load_table(path)?;
            self.run_internal(&df, &source)
        }))
    }

    /// Run the pipeline on an already loaded table.
    ///
    /// # Errors
    ///
    /// Fails only on insufficient data, an over-budget prompt and
    /// cancellation. Everything else degrades into [`RunOutcome::warnings`].
    pub fn run(&self, df: &DataFrame, source: &str) -> Result<RunOutcome> {
        self.finish(self.check_cancelled().and_then(|_| self.run_internal(df, source)))
    }

    fn finish(&self, result: Result<RunOutcome>) -> Result<RunOutcome> {
        match result {
            Ok(outcome) => {
                self.report_progress(ProgressUpdate::complete(format!(
                    "Report finished with {} warning(s)",
                    outcome.warnings.len()
                )));
                Ok(outcome)
            }
            Err(e) => {
                if e.is_cancelled() {
                    self.report_progress(ProgressUpdate::cancelled());
                    info!("Pipeline cancelled");
                } else {
                    self.report_progress(ProgressUpdate::failed(e.to_string()));
                    error!("Pipeline error: {}", e);
                }
                Err(e)
            }
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancellation_token.is_cancelled() {
            return Err(ReportError::Cancelled);
        }
        Ok(())
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn run_internal(&self, df: &DataFrame, source: &str) -> Result<RunOutcome> {
        let started = Instant::now();
        info!(source, rows = df.height(), dry_run = self.dry_run, "Starting report pipeline");
        let mut warnings = Vec::new();

        // Validation
        self.check_cancelled()?;
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Validating,
            0.0,
            "Validating records...",
        ));
        let outcome = Validator::new(self.config.validation.clone()).validate(df)?;
        let validation = outcome.result.clone();
        if !validation.ok {
            return Err(insufficient(&validation, self.config.validation.max_drop_ratio));
        }
        warnings.extend(outcome.warnings.iter().cloned());
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Validating,
            1.0,
            format!("{} of {} rows valid", validation.rows_kept, validation.rows_in),
        ));

        // Imputation, then context and charts from the same frozen dataset
        self.check_cancelled()?;
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Transforming,
            0.0,
            "Imputing missing values...",
        ));
        let transformer = Transformer::new(self.config.transform_options());
        let dataset = transformer.impute(outcome.into_table(source))?;
        warnings.extend(dataset.meta().imputation.notes());

        self.check_cancelled()?;
        let (context, charts) = self.transform_and_render(&transformer, &dataset)?;
        for chart_error in &charts.errors {
            warnings.push(chart_error.to_string());
        }
        if !context.metadata.dropped_sections.is_empty() {
            warnings.push(format!(
                "context trimmed to fit {} characters; omitted: {}",
                self.config.context_char_budget,
                context.metadata.dropped_sections.join(", ")
            ));
        }

        // Prompt
        self.check_cancelled()?;
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Prompting,
            0.0,
            "Building prompt...",
        ));
        let prompts = &self.llm_config.prompts;
        let prompt = PromptBuilder::new(self.config.prompt_char_budget).build(
            &context,
            &prompts.system_role,
            &prompts.task,
        )?;

        let Some(endpoint) = self.endpoint.as_ref().filter(|_| !self.dry_run) else {
            info!(chars = prompt.char_count(), "Dry run: skipping model call and report");
            return Ok(RunOutcome {
                validation,
                dataset,
                context,
                prompt,
                charts,
                response: None,
                narrative: None,
                report: None,
                written: None,
                warnings,
                duration: started.elapsed(),
            });
        };

        // Model call
        self.check_cancelled()?;
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Invoking,
            0.0,
            format!("Calling {}...", endpoint.name()),
        ));
        let client = LlmClient::new(
            &**endpoint,
            self.config.retry.clone(),
            self.config.attempt_timeout(),
        )
        .with_sleeper(self.sleeper.clone())
        .with_jitter(self.jitter.clone())
        .with_cancellation(self.cancellation_token.clone());
        let response = client.invoke(&prompt)?;

        let narrative = match &response.text {
            Some(text) if response.is_success() => {
                let narrative = Narrative::parse(text);
                let missing = narrative.missing_sections();
                if !missing.is_empty() {
                    let names: Vec<&str> = missing.iter().map(|s| s.title()).collect();
                    warnings.push(format!("model response lacks sections: {}", names.join(", ")));
                }
                narrative
            }
            _ => {
                let reason = response
                    .failure_reason()
                    .unwrap_or_else(|| "model returned no text".to_string());
                warnings.push(format!("narrative unavailable: {}", reason));
                Narrative::placeholder(reason)
            }
        };

        // Report
        self.check_cancelled()?;
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Assembling,
            0.0,
            "Assembling report...",
        ));
        let model = endpoint
            .model()
            .unwrap_or_else(|| self.llm_config.model_name())
            .to_string();
        let metadata = ReportMetadata::for_dataset(&dataset, model, warnings.clone());
        let report = ReportAssembler::new(self.skeleton.clone()).assemble(&narrative, &charts.artifacts, &metadata);
        let written = report.write(&self.config.output_dir, &self.config.report_base_name);
        warnings.extend(written.errors());

        let duration = started.elapsed();
        info!(
            duration_ms = duration.as_millis() as u64,
            warnings = warnings.len(),
            narrative = response.is_success(),
            "Report pipeline finished"
        );

        Ok(RunOutcome {
            validation,
            dataset,
            context,
            prompt,
            charts,
            response: Some(response),
            narrative: Some(narrative),
            report: Some(report),
            written: Some(written),
            warnings,
            duration,
        })
    }

    /// Build the context and render the charts, concurrently when enabled.
    fn transform_and_render(
        &self,
        transformer: &Transformer,
        dataset: &Dataset,
    ) -> Result<(ContextDocument, ChartRender)> {
        let visualizer = Visualizer::new(
            &self.config.output_dir,
            VisualizerOptions {
                engine_bins: self.config.engine_bins.clone(),
                mileage_bins: self.config.mileage_bins.clone(),
            },
        );
        let specs = &self.config.charts;

        self.report_progress(ProgressUpdate::new(
            PipelineStage::Transforming,
            0.5,
            "Building context document...",
        ));

        if self.config.parallel_render {
            std::thread::scope(|scope| {
                let charts = scope.spawn(|| {
                    self.report_progress(ProgressUpdate::with_items(
                        PipelineStage::Rendering,
                        "charts",
                        0,
                        specs.len(),
                        "Rendering charts...",
                    ));
                    visualizer.render(dataset, specs)
                });
                let context = transformer.transform(dataset);
                let charts = charts
                    .join()
                    .map_err(|_| ReportError::Internal("chart rendering thread panicked".to_string()))?;
                self.report_progress(ProgressUpdate::with_items(
                    PipelineStage::Rendering,
                    "charts",
                    charts.artifacts.len(),
                    specs.len(),
                    "Charts rendered",
                ));
                Ok((context?, charts))
            })
        } else {
            let context = transformer.transform(dataset)?;
            self.check_cancelled()?;
            self.report_progress(ProgressUpdate::with_items(
                PipelineStage::Rendering,
                "charts",
                0,
                specs.len(),
                "Rendering charts...",
            ));
            let charts = visualizer.render(dataset, specs);
            Ok((context, charts))
        }
    }
}

fn insufficient(validation: &ValidationResult, max_drop_ratio: f64) -> ReportError {
    let missing: Vec<&str> = validation
        .violations
        .iter()
        .filter(|v| v.rule == RULE_REQUIRED_COLUMN)
        .map(|v| v.field.as_str())
        .collect();
    if !missing.is_empty() {
        return ReportError::InsufficientData(format!(
            "missing required column(s): {}",
            missing.join(", ")
        ));
    }
    ReportError::InsufficientData(format!(
        "{} of {} rows failed validation ({:.1}% > {:.1}% tolerated)",
        validation.rows_dropped(),
        validation.rows_in,
        validation.drop_ratio * 100.0,
        max_drop_ratio * 100.0
    ))
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<ReportConfig>,
    llm_config: Option<LlmConfig>,
    endpoint: Option<Box<dyn ModelEndpoint>>,
    sleeper: Option<Arc<dyn Sleeper>>,
    jitter: Option<Arc<dyn JitterSource>>,
    skeleton: Option<ReportSkeleton>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: Option<CancellationToken>,
    dry_run: bool,
}

impl PipelineBuilder {
    /// Set the report configuration.
    pub fn config(mut self, config: ReportConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the model configuration.
    pub fn llm_config(mut self, config: LlmConfig) -> Self {
        self.llm_config = Some(config);
        self
    }

    /// Use this endpoint instead of building one from the model configuration.
    pub fn endpoint(mut self, endpoint: impl ModelEndpoint + 'static) -> Self {
        self.endpoint = Some(Box::new(endpoint));
        self
    }

    /// Replace the wait primitive used between attempts.
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Replace the backoff jitter source.
    pub fn jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Set the section-to-chart layout of the report.
    pub fn skeleton(mut self, skeleton: ReportSkeleton) -> Self {
        self.skeleton = Some(skeleton);
        self
    }

    /// Set a progress reporter.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a closure-based progress callback.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Set a cancellation token.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Stop after building the prompt: no model call, no report files.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Build the pipeline.
    ///
    /// Validates both configurations and, unless this is a dry run or an
    /// endpoint was supplied, reads the API credential from the environment.
    pub fn build(self) -> Result<Pipeline> {
        let config = self.config.unwrap_or_default();
        let llm_config = self.llm_config.unwrap_or_default();
        config.validate()?;
        llm_config.validate()?;
        config.check_prompt_budget(&llm_config)?;

        let endpoint = match self.endpoint {
            Some(endpoint) => Some(endpoint),
            None if self.dry_run => None,
            None => Some(default_endpoint(&llm_config)?),
        };

        Ok(Pipeline {
            config,
            llm_config,
            endpoint,
            sleeper: self.sleeper.unwrap_or_else(|| Arc::new(ThreadSleeper)),
            jitter: self.jitter.unwrap_or_else(|| Arc::new(RandJitter::new())),
            skeleton: self.skeleton.unwrap_or_default(),
            progress_reporter: self.progress_reporter,
            cancellation_token: self.cancellation_token.unwrap_or_default(),
            dry_run: self.dry_run,
        })
    }
}

#[cfg(feature = "ai")]
fn default_endpoint(llm_config: &LlmConfig) -> Result<Box<dyn ModelEndpoint>> {
    let api_key = crate::llm::ApiKey::from_env(llm_config.api_key_env())?;
    crate::llm::endpoint_for(llm_config, api_key)
}

#[cfg(not(feature = "ai"))]
fn default_endpoint(_llm_config: &LlmConfig) -> Result<Box<dyn ModelEndpoint>> {
    Err(ReportError::InvalidConfig(
        "no model endpoint available; enable the `ai` feature or supply one".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{AttemptOptions, EndpointError, FailureKind, NoJitter};
    use crate::narrative::ReportSection;
    use polars::df;
    use std::sync::Mutex;

    struct Fixed(std::result::Result<String, EndpointError>);

    impl ModelEndpoint for Fixed {
        fn send(&self, _: &PromptPayload, _: &AttemptOptions) -> std::result::Result<String, EndpointError> {
            self.0.clone()
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct NoSleep;

    impl Sleeper for NoSleep {
        fn sleep(&self, _: Duration, token: &CancellationToken) -> bool {
            !token.is_cancelled()
        }
    }

    fn table() -> DataFrame {
        df! {
            "region" => ["Asia", "Europe", "Asia", "Europe", "Asia", "Europe"],
            "model" => ["X3", "X3", "i3", "i3", "M5", "M5"],
            "year" => ["2020", "2020", "2021", "2021", "2022", "2022"],
            "fuel_type" => ["Petrol", "Diesel", "Electric", "Electric", "Petrol", "Hybrid"],
            "transmission" => ["Automatic", "Manual", "Automatic", "Automatic", "Manual", "Automatic"],
            "engine_size_l" => ["2.0", "3.0", "1.5", "1.5", "4.4", "3.0"],
            "sales_volume" => ["100", "120", "80", "90", "40", "45"],
            "price_usd" => ["45000", "47000", "42000", "43000", "98000", "99000"],
        }
        .unwrap()
    }

    fn config(dir: &Path) -> ReportConfig {
        ReportConfig::builder().output_dir(dir).parallel_render(false).build().unwrap()
    }

    fn pipeline(dir: &Path, reply: std::result::Result<String, EndpointError>) -> Pipeline {
        Pipeline::builder()
            .config(config(dir))
            .endpoint(Fixed(reply))
            .sleeper(Arc::new(NoSleep))
            .jitter(Arc::new(NoJitter))
            .build()
            .unwrap()
    }

    #[test]
    fn test_full_run_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = pipeline(dir.path(), Ok("## Executive Summary\nSolid year.".to_string()))
            .run(&table(), "inline")
            .unwrap();

        assert!(outcome.narrative_available());
        assert_eq!(outcome.dataset.len(), 6);
        assert!(outcome.written.as_ref().unwrap().all_written());
        let narrative = outcome.narrative.as_ref().unwrap();
        assert_eq!(narrative.section(ReportSection::ExecutiveSummary), Some("Solid year."));
        assert!(outcome.warnings.iter().any(|w| w.contains("lacks sections")));
        assert!(dir.path().join("report.md").exists());
        assert!(dir.path().join("plots").join("regional-trend.html").exists());
    }

    #[test]
    fn test_fatal_model_failure_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = pipeline(
            dir.path(),
            Err(EndpointError::new(FailureKind::Authentication, "bad key")),
        )
        .run(&table(), "inline")
        .unwrap();

        assert!(!outcome.narrative_available());
        assert_eq!(outcome.response.as_ref().unwrap().attempts, 1);
        assert!(outcome.narrative.as_ref().unwrap().is_degraded());
        assert!(outcome.written.as_ref().unwrap().all_written());
    }

    #[test]
    fn test_dry_run_skips_model_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::builder()
            .config(config(dir.path()))
            .dry_run(true)
            .build()
            .unwrap();
        let outcome = pipeline.run(&table(), "inline").unwrap();

        assert!(outcome.response.is_none());
        assert!(outcome.report.is_none());
        assert!(outcome.prompt.text().contains("DATA CONTEXT:"));
        assert!(!dir.path().join("report.md").exists());
    }

    #[test]
    fn test_missing_column_is_insufficient_data() {
        let dir = tempfile::tempdir().unwrap();
        let df = table().drop("price_usd").unwrap();
        let err = pipeline(dir.path(), Ok("unused".to_string()))
            .run(&df, "inline")
            .unwrap_err();

        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("price_usd"));
    }

    #[test]
    fn test_cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let stages = Arc::new(Mutex::new(Vec::new()));
        let seen = stages.clone();

        let err = Pipeline::builder()
            .config(config(dir.path()))
            .endpoint(Fixed(Ok("unused".to_string())))
            .cancellation_token(token)
            .on_progress(move |update| seen.lock().unwrap().push(update.stage))
            .build()
            .unwrap()
            .run(&table(), "inline")
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(*stages.lock().unwrap(), vec![PipelineStage::Cancelled]);
    }

    #[test]
    fn test_invalid_config_rejected_at_build() {
        let config = ReportConfig {
            top_n: 0,
            ..ReportConfig::default()
        };
        let err = Pipeline::builder().config(config).dry_run(true).build().err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_templates_overflowing_prompt_budget_rejected_at_build() {
        let dir = tempfile::tempdir().unwrap();
        let config = ReportConfig::builder()
            .output_dir(dir.path())
            .context_char_budget(3_000)
            .prompt_char_budget(3_000)
            .build()
            .unwrap();
        let mut llm_config = LlmConfig::default();
        llm_config.prompts.task = "Task. ".repeat(200);

        let err = Pipeline::builder()
            .config(config)
            .llm_config(llm_config)
            .endpoint(Fixed(Ok("unused".to_string())))
            .build()
            .err()
            .unwrap();
        assert!(err.is_configuration());
        assert_eq!(err.exit_code(), 1);
        assert!(!dir.path().join("plots").exists());
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let sequential = Pipeline::builder()
            .config(config(dir_a.path()))
            .dry_run(true)
            .build()
            .unwrap()
            .run(&table(), "inline")
            .unwrap();
        let parallel = Pipeline::builder()
            .config(ReportConfig::builder().output_dir(dir_b.path()).parallel_render(true).build().unwrap())
            .dry_run(true)
            .build()
            .unwrap()
            .run(&table(), "inline")
            .unwrap();

        assert_eq!(sequential.context.text(), parallel.context.text());
        assert_eq!(sequential.charts.artifacts.len(), parallel.charts.artifacts.len());
    }
}
