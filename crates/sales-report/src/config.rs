//! Configuration types for the report pipeline.
//!
//! Two documents configure a run: the general [`ReportConfig`] (validation
//! thresholds, imputation policy, bin edges, budgets, retry parameters,
//! output location, chart set) and the model-specific [`LlmConfig`]
//! (provider, model selection, prompt templates). Both arrive already parsed;
//! the library never reads files for them. They are immutable once built and
//! passed explicitly into each component.

use crate::analysis::{BinSpec, GrowthMethod};
use crate::error::ReportError;
use crate::llm::RetryPolicy;
use crate::prompt::PromptBuilder;
use crate::transform::{ImputationPolicy, TransformOptions};
use crate::validator::ValidationRules;
use crate::visualizer::ChartSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Default number of entries in top-N rankings.
const DEFAULT_TOP_N: usize = 3;

/// Default character budget for the context document.
const DEFAULT_CONTEXT_BUDGET: usize = 12_000;

/// Default character budget for the full prompt (templates + context).
const DEFAULT_PROMPT_BUDGET: usize = 16_000;

/// Default timeout for a single model request in seconds.
const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 60;

/// General settings for a report run.
///
/// Use [`ReportConfig::builder()`] for a fluent, validated setup.
///
/// # Example
///
/// ```rust,ignore
/// use sales_report::ReportConfig;
///
/// let config = ReportConfig::builder()
///     .top_n(5)
///     .context_char_budget(8_000)
///     .output_dir("output")
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Declarative validation rules and the tolerated drop ratio.
    pub validation: ValidationRules,

    /// Per-field imputation/removal policy for missing numeric values.
    pub imputation: ImputationPolicy,

    /// Engine-size bins (liters).
    pub engine_bins: BinSpec,

    /// Mileage bins (kilometers), used when the input carries `mileage_km`.
    pub mileage_bins: BinSpec,

    /// Size of top-N rankings in the context document.
    /// Default: 3
    pub top_n: usize,

    /// Growth-rate method used for trend summaries.
    /// Default: Cagr
    pub growth_method: GrowthMethod,

    /// Maximum characters of the context document.
    /// Default: 12000
    pub context_char_budget: usize,

    /// Maximum characters of the final prompt payload.
    /// Default: 16000
    pub prompt_char_budget: usize,

    /// Retry/backoff parameters for the model call.
    pub retry: RetryPolicy,

    /// Timeout for one model request, independent of the retry budget.
    /// Default: 60
    pub attempt_timeout_secs: u64,

    /// Directory receiving the report files and the `plots/` folder.
    /// Default: "output"
    pub output_dir: PathBuf,

    /// Base name shared by the HTML and Markdown report files.
    /// Default: "report"
    pub report_base_name: String,

    /// Charts to render.
    pub charts: Vec<ChartSpec>,

    /// Run the transformer and the visualizer on separate threads.
    /// Default: true
    pub parallel_render: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            validation: ValidationRules::default(),
            imputation: ImputationPolicy::default(),
            engine_bins: BinSpec::engine_size(),
            mileage_bins: BinSpec::mileage(),
            top_n: DEFAULT_TOP_N,
            growth_method: GrowthMethod::default(),
            context_char_budget: DEFAULT_CONTEXT_BUDGET,
            prompt_char_budget: DEFAULT_PROMPT_BUDGET,
            retry: RetryPolicy::default(),
            attempt_timeout_secs: DEFAULT_ATTEMPT_TIMEOUT_SECS,
            output_dir: PathBuf::from("output"),
            report_base_name: "report".to_string(),
            charts: ChartSpec::defaults(),
            parallel_render: true,
        }
    }
}

impl ReportConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ReportConfigBuilder {
        ReportConfigBuilder::default()
    }

    /// Per-attempt timeout as a [`Duration`].
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    /// Options handed to the [`Transformer`](crate::transform::Transformer).
    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions {
            imputation: self.imputation.clone(),
            engine_bins: self.engine_bins.clone(),
            mileage_bins: self.mileage_bins.clone(),
            top_n: self.top_n,
            growth_method: self.growth_method,
            char_budget: self.context_char_budget,
            min_rows: self.validation.min_rows,
        }
    }

    /// Directory receiving rendered chart files.
    pub fn plots_dir(&self) -> PathBuf {
        self.output_dir.join("plots")
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(0.0..=1.0).contains(&self.validation.max_drop_ratio) {
            return Err(ConfigValidationError::InvalidThreshold {
                field: "validation.max_drop_ratio".to_string(),
                value: self.validation.max_drop_ratio,
            });
        }

        if !(0.0..=1.0).contains(&self.validation.missing_value_warning_ratio) {
            return Err(ConfigValidationError::InvalidThreshold {
                field: "validation.missing_value_warning_ratio".to_string(),
                value: self.validation.missing_value_warning_ratio,
            });
        }

        if self.top_n == 0 {
            return Err(ConfigValidationError::invalid("top_n", "must be at least 1"));
        }

        if self.context_char_budget == 0 || self.prompt_char_budget == 0 {
            return Err(ConfigValidationError::invalid(
                "char_budget",
                "character budgets must be positive",
            ));
        }

        if self.context_char_budget > self.prompt_char_budget {
            return Err(ConfigValidationError::invalid(
                "context_char_budget",
                "must not exceed prompt_char_budget",
            ));
        }

        if self.attempt_timeout_secs == 0 {
            return Err(ConfigValidationError::invalid(
                "attempt_timeout_secs",
                "must be at least 1 second",
            ));
        }

        if self.report_base_name.trim().is_empty() {
            return Err(ConfigValidationError::invalid(
                "report_base_name",
                "must not be empty",
            ));
        }

        self.engine_bins
            .check()
            .map_err(|reason| ConfigValidationError::invalid("engine_bins", reason))?;
        self.mileage_bins
            .check()
            .map_err(|reason| ConfigValidationError::invalid("mileage_bins", reason))?;
        self.retry
            .check()
            .map_err(|reason| ConfigValidationError::invalid("retry", reason))?;
        self.imputation
            .check()
            .map_err(|reason| ConfigValidationError::invalid("imputation", reason))?;

        let mut seen = HashSet::new();
        for chart in &self.charts {
            if !seen.insert(chart.id.as_str()) {
                return Err(ConfigValidationError::invalid(
                    "charts",
                    format!("duplicate chart id '{}'", chart.id),
                ));
            }
        }

        Ok(())
    }

    /// Check that a context filling its whole budget, wrapped in the prompt
    /// templates of `llm`, still fits the prompt budget.
    pub fn check_prompt_budget(&self, llm: &LlmConfig) -> Result<(), ConfigValidationError> {
        let overhead = PromptBuilder::overhead(&llm.prompts.system_role, &llm.prompts.task);
        let needed = self.context_char_budget.saturating_add(overhead);
        if needed > self.prompt_char_budget {
            return Err(ConfigValidationError::invalid(
                "prompt_char_budget",
                format!(
                    "{} is too small for a {}-character context plus {} characters of prompt templates (needs {})",
                    self.prompt_char_budget, self.context_char_budget, overhead, needed
                ),
            ));
        }
        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid threshold for '{field}': {value} (must be between 0.0 and 1.0)")]
    InvalidThreshold { field: String, value: f64 },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigValidationError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<ConfigValidationError> for ReportError {
    fn from(err: ConfigValidationError) -> Self {
        ReportError::InvalidConfig(err.to_string())
    }
}

/// Builder for [`ReportConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct ReportConfigBuilder {
    validation: Option<ValidationRules>,
    imputation: Option<ImputationPolicy>,
    engine_bins: Option<BinSpec>,
    mileage_bins: Option<BinSpec>,
    top_n: Option<usize>,
    growth_method: Option<GrowthMethod>,
    context_char_budget: Option<usize>,
    prompt_char_budget: Option<usize>,
    retry: Option<RetryPolicy>,
    attempt_timeout_secs: Option<u64>,
    output_dir: Option<PathBuf>,
    report_base_name: Option<String>,
    charts: Option<Vec<ChartSpec>>,
    parallel_render: Option<bool>,
}

impl ReportConfigBuilder {
    /// Set the validation rules.
    pub fn validation(mut self, rules: ValidationRules) -> Self {
        self.validation = Some(rules);
        self
    }

    /// Set the imputation policy.
    pub fn imputation(mut self, policy: ImputationPolicy) -> Self {
        self.imputation = Some(policy);
        self
    }

    /// Set the engine-size bins.
    pub fn engine_bins(mut self, bins: BinSpec) -> Self {
        self.engine_bins = Some(bins);
        self
    }

    /// Set the mileage bins.
    pub fn mileage_bins(mut self, bins: BinSpec) -> Self {
        self.mileage_bins = Some(bins);
        self
    }

    /// Set the size of top-N rankings.
    pub fn top_n(mut self, n: usize) -> Self {
        self.top_n = Some(n);
        self
    }

    /// Set the growth-rate method.
    pub fn growth_method(mut self, method: GrowthMethod) -> Self {
        self.growth_method = Some(method);
        self
    }

    /// Set the context document character budget.
    pub fn context_char_budget(mut self, budget: usize) -> Self {
        self.context_char_budget = Some(budget);
        self
    }

    /// Set the full prompt character budget.
    pub fn prompt_char_budget(mut self, budget: usize) -> Self {
        self.prompt_char_budget = Some(budget);
        self
    }

    /// Set the retry policy for the model call.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Set the per-attempt timeout in seconds.
    pub fn attempt_timeout_secs(mut self, secs: u64) -> Self {
        self.attempt_timeout_secs = Some(secs);
        self
    }

    /// Set the output directory.
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Set the base name of the report files (without extension).
    pub fn report_base_name(mut self, name: impl Into<String>) -> Self {
        self.report_base_name = Some(name.into());
        self
    }

    /// Set the charts to render.
    pub fn charts(mut self, charts: Vec<ChartSpec>) -> Self {
        self.charts = Some(charts);
        self
    }

    /// Enable or disable concurrent transform/visualize.
    pub fn parallel_render(mut self, parallel: bool) -> Self {
        self.parallel_render = Some(parallel);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `ReportConfig` or an error if validation fails.
    pub fn build(self) -> Result<ReportConfig, ConfigValidationError> {
        let defaults = ReportConfig::default();
        let config = ReportConfig {
            validation: self.validation.unwrap_or(defaults.validation),
            imputation: self.imputation.unwrap_or(defaults.imputation),
            engine_bins: self.engine_bins.unwrap_or(defaults.engine_bins),
            mileage_bins: self.mileage_bins.unwrap_or(defaults.mileage_bins),
            top_n: self.top_n.unwrap_or(defaults.top_n),
            growth_method: self.growth_method.unwrap_or(defaults.growth_method),
            context_char_budget: self
                .context_char_budget
                .unwrap_or(defaults.context_char_budget),
            prompt_char_budget: self
                .prompt_char_budget
                .unwrap_or(defaults.prompt_char_budget),
            retry: self.retry.unwrap_or(defaults.retry),
            attempt_timeout_secs: self
                .attempt_timeout_secs
                .unwrap_or(defaults.attempt_timeout_secs),
            output_dir: self.output_dir.unwrap_or(defaults.output_dir),
            report_base_name: self.report_base_name.unwrap_or(defaults.report_base_name),
            charts: self.charts.unwrap_or(defaults.charts),
            parallel_render: self.parallel_render.unwrap_or(defaults.parallel_render),
        };

        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// LLM configuration
// ============================================================================

/// Model backend used for the narrative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Google Gemini `generateContent` API.
    #[default]
    Gemini,
    /// OpenRouter chat-completions API.
    OpenRouter,
}

impl Provider {
    /// Environment variable holding the API key for this provider.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::Gemini => "GOOGLE_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
        }
    }

    /// Model used when the configuration names none.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.5-flash",
            Self::OpenRouter => "deepseek/deepseek-chat",
        }
    }
}

/// Role and task instructions placed ahead of the data context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    /// Persona and report-structure instructions.
    pub system_role: String,
    /// The concrete analysis task.
    pub task: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            system_role: "You are a senior automotive market analyst writing for an executive \
                audience. Be precise, cite the figures you rely on, and challenge any pattern \
                that the data does not clearly support. Values marked as approximate were \
                imputed; treat them with care."
                .to_string(),
            task: "Write a professional executive report in Markdown using exactly these \
                second-level headings, in this order: ## Executive Summary, ## Trends, \
                ## Model and Market Performance, ## Key Drivers, ## Creative Insights, \
                ## Chart Commentary. Identify sales performance trends over time, the \
                top-performing and underperforming models and regions, and the key drivers \
                of sales. The report is accompanied by charts of regional sales trends, top \
                models by fuel type, price versus sales volume, price by engine size, and \
                fuel-type momentum; refer to them in the Chart Commentary section."
                .to_string(),
        }
    }
}

/// Model-specific settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Which backend to call.
    pub provider: Provider,
    /// Model name; provider default when `None`.
    pub model: Option<String>,
    /// Sampling temperature (0.0 - 2.0).
    pub temperature: f32,
    /// Maximum tokens in the response.
    pub max_output_tokens: u32,
    /// Override of the provider endpoint (proxies, tests).
    pub base_url: Option<String>,
    /// Override of the API key environment variable.
    pub api_key_env: Option<String>,
    /// Prompt templates.
    pub prompts: PromptTemplates,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            temperature: 0.5,
            max_output_tokens: 4000,
            base_url: None,
            api_key_env: None,
            prompts: PromptTemplates::default(),
        }
    }
}

impl LlmConfig {
    /// Model in effect for this configuration.
    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Environment variable holding the credential.
    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.provider.api_key_env())
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigValidationError::invalid(
                "temperature",
                format!("{} is outside 0.0 - 2.0", self.temperature),
            ));
        }
        if self.max_output_tokens == 0 {
            return Err(ConfigValidationError::invalid(
                "max_output_tokens",
                "must be at least 1",
            ));
        }
        if self.prompts.system_role.trim().is_empty() || self.prompts.task.trim().is_empty() {
            return Err(ConfigValidationError::invalid(
                "prompts",
                "system_role and task must not be empty",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::GrowthMethod;

    #[test]
    fn test_default_config() {
        let config = ReportConfig::default();
        assert_eq!(config.top_n, 3);
        assert_eq!(config.context_char_budget, 12_000);
        assert_eq!(config.report_base_name, "report");
        assert_eq!(config.plots_dir(), PathBuf::from("output/plots"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = ReportConfig::builder()
            .top_n(5)
            .context_char_budget(4_000)
            .growth_method(GrowthMethod::PeriodChange)
            .report_base_name("q4")
            .parallel_render(false)
            .build()
            .unwrap();

        assert_eq!(config.top_n, 5);
        assert_eq!(config.context_char_budget, 4_000);
        assert_eq!(config.growth_method, GrowthMethod::PeriodChange);
        assert_eq!(config.report_base_name, "q4");
        assert!(!config.parallel_render);
    }

    #[test]
    fn test_default_budgets_hold_default_templates() {
        let config = ReportConfig::default();
        assert!(config.check_prompt_budget(&LlmConfig::default()).is_ok());
    }

    #[test]
    fn test_prompt_budget_must_cover_templates() {
        let config = ReportConfig::builder()
            .context_char_budget(3_000)
            .prompt_char_budget(3_000)
            .build()
            .unwrap();
        let mut llm = LlmConfig::default();
        llm.prompts.task = "Task. ".repeat(200);

        let err = config.check_prompt_budget(&llm).unwrap_err();
        assert!(err.to_string().contains("prompt_char_budget"));

        let roomy = ReportConfig::builder()
            .context_char_budget(3_000)
            .prompt_char_budget(3_000 + PromptBuilder::overhead(&llm.prompts.system_role, &llm.prompts.task))
            .build()
            .unwrap();
        assert!(roomy.check_prompt_budget(&llm).is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_top_n() {
        let result = ReportConfig::builder().top_n(0).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_validation_rejects_context_above_prompt_budget() {
        let result = ReportConfig::builder()
            .context_char_budget(20_000)
            .prompt_char_budget(10_000)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_bad_missing_ratio() {
        let mut rules = ValidationRules::default();
        rules.missing_value_warning_ratio = -0.1;
        let err = ReportConfig::builder().validation(rules).build().unwrap_err();
        assert!(matches!(
            err,
            ConfigValidationError::InvalidThreshold { ref field, .. } if field == "validation.missing_value_warning_ratio"
        ));
    }

    #[test]
    fn test_validation_rejects_bad_drop_ratio() {
        let mut rules = ValidationRules::default();
        rules.max_drop_ratio = 1.5;
        let result = ReportConfig::builder().validation(rules).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidThreshold { .. }
        ));
    }

    #[test]
    fn test_validation_rejects_duplicate_chart_ids() {
        let mut charts = ChartSpec::defaults();
        charts.push(charts[0].clone());
        let result = ReportConfig::builder().charts(charts).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_from_partial_json() {
        let json = r#"{
            "top_n": 4,
            "context_char_budget": 6000,
            "growth_method": "period_change",
            "output_dir": "custom_output"
        }"#;

        let config: ReportConfig = serde_json::from_str(json).expect("partial JSON should deserialize");
        assert_eq!(config.top_n, 4);
        assert_eq!(config.context_char_budget, 6000);
        assert_eq!(config.growth_method, GrowthMethod::PeriodChange);
        assert_eq!(config.output_dir, PathBuf::from("custom_output"));
        // untouched fields keep their defaults
        assert_eq!(config.report_base_name, "report");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_llm_config_defaults_and_overrides() {
        let config = LlmConfig::default();
        assert_eq!(config.model_name(), "gemini-2.5-flash");
        assert_eq!(config.api_key_env(), "GOOGLE_API_KEY");

        let json = r#"{"provider": "open_router", "model": "openai/gpt-4o", "temperature": 0.2}"#;
        let config: LlmConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.provider, Provider::OpenRouter);
        assert_eq!(config.model_name(), "openai/gpt-4o");
        assert_eq!(config.api_key_env(), "OPENROUTER_API_KEY");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_llm_config_rejects_empty_prompts() {
        let mut config = LlmConfig::default();
        config.prompts.task = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
