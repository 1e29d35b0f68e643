//! CLI entry point for the processing pipeline.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use dotenv::dotenv;
use hybrid_processing::{
    EncodingMethod, MissingStrategy, NormalizationMethod, OutlierMethod,
    OutlierTreatmentMethod, Pipeline, PipelineConfig, ProcessingReport, ReportWriter,
    StageOutcome, TransformKind,
};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Environment variable naming a JSON config file.
const CONFIG_ENV_VAR: &str = "HYBRID_PROCESSING_CONFIG";

/// CLI-compatible missing-value strategy enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMissingStrategy {
    /// Drop rows with missing values
    Drop,
    /// Use the mean of non-null values
    Mean,
    /// Use the median of non-null values
    Median,
    /// Use the most frequent value
    Mode,
    /// Use the mean of the row's group (needs --group-by)
    GroupMean,
    /// Use the mean of the nearest observed rows
    Knn,
    /// Linear interpolation between neighbours
    Interpolate,
}

impl From<CliMissingStrategy> for MissingStrategy {
    fn from(cli: CliMissingStrategy) -> Self {
        match cli {
            CliMissingStrategy::Drop => MissingStrategy::Drop,
            CliMissingStrategy::Mean => MissingStrategy::Mean,
            CliMissingStrategy::Median => MissingStrategy::Median,
            CliMissingStrategy::Mode => MissingStrategy::Mode,
            CliMissingStrategy::GroupMean => MissingStrategy::GroupMean,
            CliMissingStrategy::Knn => MissingStrategy::Knn,
            CliMissingStrategy::Interpolate => MissingStrategy::Interpolate,
        }
    }
}

/// CLI-compatible outlier detection method enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliOutlierMethod {
    /// Tukey fences at 1.5 x IQR
    Iqr,
    /// |z| > 3
    Zscore,
    /// Seeded isolation forest
    IsolationForest,
}

impl From<CliOutlierMethod> for OutlierMethod {
    fn from(cli: CliOutlierMethod) -> Self {
        match cli {
            CliOutlierMethod::Iqr => OutlierMethod::Iqr,
            CliOutlierMethod::Zscore => OutlierMethod::ZScore,
            CliOutlierMethod::IsolationForest => OutlierMethod::IsolationForest,
        }
    }
}

/// CLI-compatible outlier treatment enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliOutlierTreatment {
    /// Clip to the IQR fences found during detection
    Winsorize,
    /// Clip to the 5th and 95th percentiles
    Cap,
    /// Remove flagged rows
    Remove,
    /// Replace values with log(1 + x)
    LogTransform,
}

impl From<CliOutlierTreatment> for OutlierTreatmentMethod {
    fn from(cli: CliOutlierTreatment) -> Self {
        match cli {
            CliOutlierTreatment::Winsorize => OutlierTreatmentMethod::Winsorize,
            CliOutlierTreatment::Cap => OutlierTreatmentMethod::Cap,
            CliOutlierTreatment::Remove => OutlierTreatmentMethod::Remove,
            CliOutlierTreatment::LogTransform => OutlierTreatmentMethod::LogTransform,
        }
    }
}

/// CLI-compatible distribution transform enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliTransform {
    Log,
    Boxcox,
    Sqrt,
    Square,
}

impl From<CliTransform> for TransformKind {
    fn from(cli: CliTransform) -> Self {
        match cli {
            CliTransform::Log => TransformKind::Log,
            CliTransform::Boxcox => TransformKind::BoxCox,
            CliTransform::Sqrt => TransformKind::Sqrt,
            CliTransform::Square => TransformKind::Square,
        }
    }
}

/// CLI-compatible normalization enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliNormalization {
    /// Zero mean, unit variance
    Standard,
    /// Rescale to [0, 1]
    Minmax,
    /// Median and MAD
    Robust,
}

impl From<CliNormalization> for NormalizationMethod {
    fn from(cli: CliNormalization) -> Self {
        match cli {
            CliNormalization::Standard => NormalizationMethod::Standard,
            CliNormalization::Minmax => NormalizationMethod::MinMax,
            CliNormalization::Robust => NormalizationMethod::Robust,
        }
    }
}

/// CLI-compatible encoding enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliEncoding {
    /// Integer codes in sorted category order
    Label,
    /// One indicator column per category
    Onehot,
    /// Relative frequency of the category
    Frequency,
}

impl From<CliEncoding> for EncodingMethod {
    fn from(cli: CliEncoding) -> Self {
        match cli {
            CliEncoding::Label => EncodingMethod::Label,
            CliEncoding::Onehot => EncodingMethod::OneHot,
            CliEncoding::Frequency => EncodingMethod::Frequency,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Configurable tabular preprocessing pipeline",
    long_about = "Detects and treats outliers, fills missing values, removes duplicates,\n\
                  transforms, scales and encodes columns, and extracts date features.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  HYBRID_PROCESSING_CONFIG    Path to a JSON config (also read from .env)\n\n\
                  EXAMPLES:\n  \
                  # Defaults\n  \
                  hybrid-processing -i sales.csv\n\n  \
                  # Per-store scaling with a config file\n  \
                  hybrid-processing -i sales.csv --config pipeline.json --group-by store --normalize-by-group\n\n  \
                  # Machine-readable report\n  \
                  hybrid-processing -i sales.parquet --json"
)]
struct Args {
    /// Path to the CSV or Parquet file to process
    #[arg(short, long)]
    input: String,

    /// Output directory for results
    #[arg(short, long, default_value = "./outputs")]
    output: String,

    /// Custom output file name (without extension)
    ///
    /// If not specified, uses "<input_name>_processed"
    #[arg(long)]
    output_name: Option<String>,

    /// JSON pipeline config; overrides HYBRID_PROCESSING_CONFIG
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long)]
    quiet: bool,

    /// Partition column for grouped detection, imputation and scaling
    #[arg(short, long)]
    group_by: Option<String>,

    /// Strategy for filling missing values
    #[arg(long, value_enum)]
    missing_strategy: Option<CliMissingStrategy>,

    /// Columns with a higher missing ratio are dropped (0.0 - 1.0)
    #[arg(long)]
    missing_threshold: Option<f64>,

    /// Outlier detection methods, comma separated
    #[arg(long, value_enum, value_delimiter = ',')]
    outlier_methods: Option<Vec<CliOutlierMethod>>,

    /// What to do with flagged outliers
    #[arg(long, value_enum)]
    outlier_treatment: Option<CliOutlierTreatment>,

    /// Derive transformed columns, comma separated
    #[arg(long, value_enum, value_delimiter = ',')]
    transform: Option<Vec<CliTransform>>,

    /// Global scaling method
    #[arg(long, value_enum)]
    normalization: Option<CliNormalization>,

    /// Scale within --group-by partitions instead of globally
    #[arg(long)]
    normalize_by_group: bool,

    /// Categorical encoding method
    #[arg(long, value_enum)]
    encoding: Option<CliEncoding>,

    /// One-hot cardinality limit
    #[arg(long)]
    max_categories: Option<usize>,

    /// Keep duplicate rows
    #[arg(long)]
    no_dedupe: bool,

    /// Skip outlier detection and treatment
    #[arg(long)]
    no_outliers: bool,

    /// Skip date parsing
    #[arg(long)]
    no_dates: bool,

    /// Output JSON to stdout instead of human-readable summary
    ///
    /// Disables all progress logs; only outputs the final JSON report.
    #[arg(long)]
    json: bool,

    /// Write the JSON report to the output directory
    ///
    /// The report will be saved as <input_name>_report.json
    #[arg(short = 'r', long)]
    emit_report: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is disabled so stdout only carries
/// the report.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    // Load environment variables from .env file
    dotenv().ok();

    if !Path::new(&args.input).exists() {
        return Err(anyhow!("Input file not found: {}", args.input));
    }

    let config = load_config(&args)?;

    info!("Loading dataset from: {}", args.input);
    let data = load_dataset(&args.input)?;
    info!("Dataset loaded successfully: {:?}", data.shape());

    let pipeline = build_pipeline(&args, config)?;
    run_pipeline(&pipeline, &args, data)
}

/// Load the config file (flag first, then environment) and apply CLI overrides.
fn load_config(args: &Args) -> Result<PipelineConfig> {
    let path = args
        .config
        .clone()
        .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from));

    let mut config = match path {
        Some(path) => {
            info!("Loading config from: {}", path.display());
            PipelineConfig::from_json_file(&path)
                .with_context(|| format!("Failed to load config {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };

    if let Some(group_by) = &args.group_by {
        config.group_by = Some(group_by.clone());
    }
    if let Some(strategy) = args.missing_strategy {
        config.missing_strategy = strategy.into();
    }
    if let Some(threshold) = args.missing_threshold {
        config.missing_threshold = threshold;
    }
    if let Some(methods) = &args.outlier_methods {
        config.outlier_methods = methods.iter().map(|&m| m.into()).collect();
    }
    if let Some(treatment) = args.outlier_treatment {
        config.outlier_method = treatment.into();
    }
    if let Some(transforms) = &args.transform {
        config.apply_transformations = true;
        config.transformations = transforms.iter().map(|&t| t.into()).collect();
    }
    if let Some(method) = args.normalization {
        config.normalization_method = method.into();
    }
    if args.normalize_by_group {
        config.normalize_by_group = true;
    }
    if let Some(method) = args.encoding {
        config.encoding_method = method.into();
    }
    if let Some(max) = args.max_categories {
        config.max_categories = max;
    }
    if args.no_dedupe {
        config.remove_duplicates = false;
    }
    if args.no_outliers {
        config.detect_outliers = false;
        config.handle_outliers = false;
    }
    if args.no_dates {
        config.normalize_dates = false;
    }

    debug!("Effective config: {:?}", config);
    Ok(config)
}

fn build_pipeline(args: &Args, config: PipelineConfig) -> Result<Pipeline> {
    let mut builder = Pipeline::builder().config(config);

    if !args.quiet {
        builder = builder.on_progress(|update| {
            info!(
                "[{:.0}%] {}: {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.message
            );
        });
    }

    Ok(builder.build()?)
}

/// Run pipeline, write outputs and print results.
fn run_pipeline(pipeline: &Pipeline, args: &Args, data: DataFrame) -> Result<()> {
    info!("{}", "=".repeat(80));
    info!("Starting processing pipeline...");
    info!("{}", "=".repeat(80));

    let output = match pipeline.run_frame(data) {
        Ok(output) => output,
        Err(e) => {
            error!("Pipeline failed: {}", e);
            return Err(anyhow!("Pipeline failed: {}", e));
        }
    };

    let input_stem = extract_file_stem(&args.input);
    let writer = ReportWriter::new(PathBuf::from(&args.output), args.output_name.clone());
    let mut frame = output.dataset.into_frame();
    let output_path = writer.write_dataset(&mut frame, &input_stem)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output.report)?);
        return Ok(());
    }

    if args.emit_report {
        let report_path = writer.write_report(&output.report, &input_stem)?;
        info!("Report written to: {}", report_path.display());
    }

    print_human_readable_summary(&output.report, &args.input, &output_path);
    Ok(())
}

/// Extract the file stem (name without extension) from a path.
fn extract_file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string()
}

/// Print a human-readable summary of the run.
fn print_human_readable_summary(report: &ProcessingReport, input: &str, output_path: &Path) {
    println!();
    println!("{}", "=".repeat(80));
    println!("PROCESSING COMPLETE");
    println!("{}", "=".repeat(80));
    println!();

    println!(
        "Input:  {} ({} rows x {} columns)",
        input, report.rows_before, report.columns_before
    );
    println!(
        "Output: {} ({} rows x {} columns)",
        output_path.display(),
        report.rows_after,
        report.columns_after
    );
    println!();

    println!("Processing Summary:");
    println!("  Duration: {}ms", report.duration_ms);
    println!(
        "  Rows: {} -> {} ({} removed, {} duplicates)",
        report.rows_before,
        report.rows_after,
        report.rows_removed(),
        report.duplicates_removed
    );
    println!(
        "  Fitted: {} scalers, {} encoders",
        report.scalers_count, report.encoders_count
    );
    println!();

    println!("Stages:");
    for record in &report.stages {
        let outcome = match record.outcome {
            StageOutcome::Applied => "applied",
            StageOutcome::Skipped => "skipped",
            StageOutcome::Failed => "FAILED",
        };
        println!("  {:<28} {}", record.stage.display_name(), outcome);
    }
    println!();

    let outlier_counts = report.outlier_counts();
    if !outlier_counts.is_empty() {
        println!("Outliers:");
        for (column, methods) in &outlier_counts {
            let counts: Vec<String> = methods
                .iter()
                .map(|(method, count)| format!("{}={}", method, count))
                .collect();
            println!("  {}: {}", column, counts.join(", "));
        }
        println!();
    }

    if !report.actions.is_empty() {
        println!("Actions Taken:");
        for action in report.actions.iter().take(10) {
            println!("  - [{}] {}", action.target, action.description);
        }
        if report.actions.len() > 10 {
            println!("  ... and {} more actions", report.actions.len() - 10);
        }
        println!();
    }

    if !report.warnings.is_empty() {
        println!("Warnings:");
        for warning in &report.warnings {
            println!("  ! [{}] {}", warning.code, warning.message);
        }
        println!();
    }

    println!("Use --json for machine-readable output");
    println!("Use --emit-report to save detailed JSON report");
    println!("{}", "=".repeat(80));
}

/// Load a CSV or Parquet file, by extension.
fn load_dataset(path: &str) -> Result<DataFrame> {
    let is_parquet = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("parquet"));

    if is_parquet {
        let file = std::fs::File::open(path)?;
        return ParquetReader::new(file)
            .finish()
            .map_err(|e| anyhow!("Failed to read parquet file: {}", e));
    }
    load_csv(path)
}

/// Rows sampled to infer CSV column dtypes.
const CSV_SCHEMA_SAMPLE: usize = 100;

/// Read a CSV with a header row. Files that fail to parse with `"` quoting
/// are retried with quoting off, which handles stray quotes inside fields.
fn load_csv(path: &str) -> Result<DataFrame> {
    let read = |quote: Option<u8>| -> PolarsResult<DataFrame> {
        CsvReadOptions::default()
            .with_infer_schema_length(Some(CSV_SCHEMA_SAMPLE))
            .with_has_header(true)
            .with_parse_options(CsvParseOptions::default().with_quote_char(quote))
            .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
            .finish()
    };

    read(Some(b'"')).or_else(|e| {
        debug!("Quoted CSV read of {} failed ({}); retrying unquoted", path, e);
        read(None).with_context(|| format!("Could not parse CSV file: {}", path))
    })
}
