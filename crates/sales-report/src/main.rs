//! CLI entry point for the sales report pipeline.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use dotenv::dotenv;
use sales_report::{LlmConfig, Pipeline, Provider, ReportConfig, ReportError, RunOutcome};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

/// CLI-compatible model provider enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliProvider {
    /// Google Gemini (GOOGLE_API_KEY)
    Gemini,
    /// OpenRouter (OPENROUTER_API_KEY)
    Openrouter,
}

impl From<CliProvider> for Provider {
    fn from(cli: CliProvider) -> Self {
        match cli {
            CliProvider::Gemini => Provider::Gemini,
            CliProvider::Openrouter => Provider::OpenRouter,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Automated Business Intelligence Reports for Automotive Sales",
    long_about = "Validates a vehicle sales table, summarizes it, asks a language model for an \
                  executive narrative and writes a Markdown and HTML report with charts.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  GOOGLE_API_KEY        API key for Gemini (default provider)\n  \
                  OPENROUTER_API_KEY    API key for OpenRouter\n\n\
                  EXIT CODES:\n  \
                  0  report written (a missing narrative is only a warning)\n  \
                  1  configuration or input error\n  \
                  2  insufficient data after validation\n\n\
                  EXAMPLES:\n  \
                  # Full report into ./output\n  \
                  sales-report -i data/sales.csv\n\n  \
                  # Inspect the context the model would receive\n  \
                  sales-report -i data/sales.csv --dry-run\n\n  \
                  # Use OpenRouter with a custom model configuration\n  \
                  sales-report -i data/sales.csv --provider openrouter --llm-config llm.json"
)]
struct Args {
    /// Path to the sales table (CSV, TSV, Parquet or Excel)
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory for the report and charts
    ///
    /// Overrides `output_dir` from --config.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON file with report settings (validation, bins, budgets, retry)
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON file with model settings (provider, model, prompt templates)
    #[arg(long)]
    llm_config: Option<PathBuf>,

    /// Model provider, overriding --llm-config
    #[arg(long, value_enum)]
    provider: Option<CliProvider>,

    /// Print the data context and stop before calling the model
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long)]
    quiet: bool,
}

/// Initialize the tracing subscriber for logging.
fn init_logging(level: &str, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet);

    // Load environment variables from .env file
    dotenv().ok();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            let code = err
                .downcast_ref::<ReportError>()
                .map(ReportError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

fn run(args: &Args) -> Result<()> {
    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let mut config: ReportConfig = match &args.config {
        Some(path) => read_json(path)?,
        None => ReportConfig::default(),
    };
    if let Some(output) = &args.output {
        config.output_dir = output.clone();
    }

    let mut llm_config: LlmConfig = match &args.llm_config {
        Some(path) => read_json(path)?,
        None => LlmConfig::default(),
    };
    if let Some(provider) = args.provider {
        llm_config.provider = provider.into();
    }

    let quiet = args.quiet;
    let pipeline = Pipeline::builder()
        .config(config)
        .llm_config(llm_config)
        .dry_run(args.dry_run)
        .on_progress(move |update| {
            if !quiet {
                info!("[{:>3.0}%] {}", update.progress * 100.0, update.message);
            }
        })
        .build()?;

    let outcome = pipeline.run_path(&args.input)?;

    if args.dry_run {
        print_dry_run(&outcome);
    } else {
        print_summary(&outcome);
    }
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Print the context document exactly as the model would see it.
///
/// Uses `println!` on purpose: this is the product of --dry-run and must be
/// visible regardless of the log level.
fn print_dry_run(outcome: &RunOutcome) {
    println!("{}", outcome.context.text());
    eprintln!(
        "\n{} records, {} context characters, {} prompt characters, {} chart(s)",
        outcome.dataset.len(),
        outcome.context.char_count(),
        outcome.prompt.char_count(),
        outcome.charts.artifacts.len()
    );
    for warning in &outcome.warnings {
        warn!("{}", warning);
    }
}

fn print_summary(outcome: &RunOutcome) {
    println!("\n{}", "=".repeat(60));
    println!("REPORT SUMMARY");
    println!("{}", "=".repeat(60));
    println!(
        "  Records:   {} kept of {}",
        outcome.validation.rows_kept, outcome.validation.rows_in
    );
    println!("  Charts:    {}", outcome.charts.artifacts.len());
    println!(
        "  Narrative: {}",
        if outcome.narrative_available() {
            "generated"
        } else {
            "unavailable"
        }
    );
    if let Some(response) = &outcome.response {
        println!("  Attempts:  {}", response.attempts);
    }
    println!("  Duration:  {:.1}s", outcome.duration.as_secs_f64());

    if let Some(written) = &outcome.written {
        for path in written.written() {
            println!("  Wrote:     {}", path.display());
        }
    }

    if !outcome.warnings.is_empty() {
        println!("\nWARNINGS");
        println!("{}", "-".repeat(40));
        for warning in &outcome.warnings {
            println!("  - {}", warning);
        }
    }
}
