mod registry;
mod settings;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use mockdata_core::{Error as CoreError, load_metadata};
use mockdata_generate::{
    EventConfig, GenerateOptions, GenerationEngine, GenerationError, SurvivalConfig,
    generate_survival,
};
use registry::{LogOptions, init_logging, write_outputs};
use settings::{FormatArg, Overrides, SettingsError, apply_overrides, load_run_config};
use thiserror::Error;

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("metadata error: {0}")]
    Core(#[from] CoreError),
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Parser, Debug)]
#[command(name = "mockdata", version, about = "Synthetic survey data from recodeflow metadata")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate every applicable variable of a window into one CSV.
    Generate(GenerateArgs),
    /// Generate correlated entry and event dates.
    Survival(SurvivalArgs),
}

#[derive(Args, Debug)]
struct MetadataArgs {
    /// Variables table (CSV).
    #[arg(long, value_name = "CSV")]
    variables: PathBuf,
    /// Variable-details table (CSV).
    #[arg(long, value_name = "CSV")]
    details: PathBuf,
}

#[derive(Args, Debug)]
struct LogArgs {
    /// Emit logs as JSON lines.
    #[arg(long, default_value_t = false)]
    log_json: bool,
    /// Also append JSON logs to this file.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[command(flatten)]
    metadata: MetadataArgs,
    /// Applicability window (databaseStart value).
    #[arg(long)]
    window: Option<String>,
    /// Rows to generate.
    #[arg(long)]
    rows: Option<usize>,
    /// Batch seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Date encoding for every date column.
    #[arg(long, value_enum)]
    format: Option<FormatArg>,
    /// TOML run config; flags override its values.
    #[arg(long, value_name = "TOML")]
    config: Option<PathBuf>,
    /// Abort on the first failing variable.
    #[arg(long, default_value_t = false)]
    strict: bool,
    /// Only generate these variables.
    #[arg(long = "variable", value_name = "NAME")]
    only: Vec<String>,
    /// Output CSV path.
    #[arg(long)]
    out: PathBuf,
    /// Optional JSON report path.
    #[arg(long)]
    report: Option<PathBuf>,
    #[command(flatten)]
    log: LogArgs,
}

#[derive(Args, Debug)]
struct SurvivalArgs {
    #[command(flatten)]
    metadata: MetadataArgs,
    /// Applicability window (databaseStart value).
    #[arg(long)]
    window: String,
    /// Entry date variable.
    #[arg(long)]
    entry: String,
    /// Primary event date variable.
    #[arg(long)]
    event: Option<String>,
    /// Death date variable.
    #[arg(long)]
    death: Option<String>,
    /// Loss to follow-up date variable.
    #[arg(long)]
    ltfu: Option<String>,
    /// Administrative censoring date variable.
    #[arg(long)]
    admin_censor: Option<String>,
    /// Rows to generate.
    #[arg(long, default_value_t = 1000)]
    rows: usize,
    /// Seed.
    #[arg(long, default_value_t = 12345)]
    seed: u64,
    /// Date encoding.
    #[arg(long, value_enum)]
    format: Option<FormatArg>,
    /// Output CSV path.
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    log: LogArgs,
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Survival(args) => run_survival(args),
    }
}

fn run_generate(args: GenerateArgs) -> Result<(), CliError> {
    init_logging(&log_options(&args.log))?;
    let timer = Instant::now();

    let mut options = match &args.config {
        Some(path) => load_run_config(path)?,
        None => GenerateOptions::default(),
    };
    apply_overrides(
        &mut options,
        Overrides {
            window: args.window,
            rows: args.rows,
            seed: args.seed,
            format: args.format,
            strict: args.strict,
            variables: args.only,
        },
    );
    if options.window.trim().is_empty() {
        return Err(CliError::InvalidConfig(
            "a window is required (--window or `window` in the run config)".to_string(),
        ));
    }

    let metadata = load_metadata(&args.metadata.variables, &args.metadata.details)?;
    tracing::info!(
        event = "run_started",
        window = %options.window,
        rows = options.rows,
        seed = options.seed
    );

    let result = GenerationEngine::new(options).run(&metadata)?;
    let report = args
        .report
        .as_deref()
        .map(|path| (path, &result.report));
    let summary = write_outputs(&result.report.run_id, &args.out, &result.table, report)?;

    tracing::info!(
        event = "run_finished",
        run_id = %summary.run_id,
        path = %summary.table_path.display(),
        rows = summary.rows,
        columns = summary.columns,
        bytes_written = summary.bytes_written,
        coverage_gaps = result.report.coverage_gaps.len(),
        failures = result.report.failures.len(),
        duration_ms = timer.elapsed().as_millis() as u64
    );
    Ok(())
}

fn run_survival(args: SurvivalArgs) -> Result<(), CliError> {
    init_logging(&log_options(&args.log))?;
    let timer = Instant::now();

    let metadata = load_metadata(&args.metadata.variables, &args.metadata.details)?;
    let config = SurvivalConfig {
        event: args.event.map(EventConfig::new),
        death: args.death.map(EventConfig::new),
        ltfu: args.ltfu.map(EventConfig::new),
        admin_censor: args.admin_censor.map(EventConfig::new),
        source_format: args.format.map(Into::into),
        ..SurvivalConfig::new(args.entry, args.window, args.rows, args.seed)
    };

    let table = generate_survival(&metadata, &config)?;
    let run_id = format!("survival-{}", chrono::Utc::now().format("%Y%m%dT%H%M%SZ"));
    let summary = write_outputs(&run_id, &args.out, &table, None)?;

    tracing::info!(
        event = "run_finished",
        path = %summary.table_path.display(),
        rows = summary.rows,
        columns = summary.columns,
        bytes_written = summary.bytes_written,
        duration_ms = timer.elapsed().as_millis() as u64
    );
    Ok(())
}

fn log_options(args: &LogArgs) -> LogOptions {
    LogOptions {
        json: args.log_json,
        file: args.log_file.clone(),
    }
}
