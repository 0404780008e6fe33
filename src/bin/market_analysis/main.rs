//! Market analysis orchestrator - runs read, analyse, write for one assignment

use anyhow::{bail, Context, Result};
use market_analysis::analysis::fetch::read_sales_table;
use market_analysis::analysis::inputs::AnalysisInputs;
use market_analysis::analysis::pipeline::{run_analysis, AnalysisConfig};
use market_analysis::analysis::write::write_outputs;
use std::env;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_target(false)
        .init();

    info!("Starting market analysis");

    let config = Config::from_env();
    let mut inputs = AnalysisInputs::from_path(&config.inputs_path)
        .with_context(|| format!("Failed to load form inputs from {:?}", config.inputs_path))?;
    info!("Form inputs loaded");

    if let Some(path) = inputs.subject_csv.clone().or_else(|| config.subject_file.clone()) {
        inputs
            .load_subject_table(&path)
            .with_context(|| format!("Failed to read subject details from {:?}", path))?;
    }

    let sales_path = resolve_sales_path(env::args().nth(1), &inputs, &config)?;
    let analysis_config =
        AnalysisConfig::from_inputs(&inputs).context("Invalid analysis configuration")?;
    info!(
        "Subject: {} sq ft, date of value {}, thresholds {} days / {}%",
        analysis_config.subject.living_area,
        analysis_config.subject.date_of_value,
        analysis_config.thresholds.time_adjustment_days,
        analysis_config.thresholds.size_adjustment_pct
    );

    // Step 1: Read the comparable table
    info!("Step 1/3: Reading sales from {:?}...", sales_path);
    let table = read_sales_table(&sales_path)
        .with_context(|| format!("Failed to read sales from {:?}", sales_path))?;
    info!("✓ Read {} rows", table.rows.len());

    // Step 2: Run the analysis
    info!("Step 2/3: Analysing...");
    let analysis = run_analysis(&table, &analysis_config).context("Analysis failed")?;
    match &analysis.validation.message {
        Some(message) => warn!("{}", message),
        None => info!(
            "✓ {} sales, {} periods, market {}",
            analysis.sales.len(),
            analysis.validation.valid_periods.len(),
            analysis.validation.trend_results.market_trend
        ),
    }

    // Step 3: Write outputs
    info!("Step 3/3: Writing outputs to {:?}...", config.output_dir);
    let written = write_outputs(&config.output_dir, &analysis)
        .with_context(|| format!("Failed to write outputs to {:?}", config.output_dir))?;
    for path in &written {
        info!("  {}", path.display());
    }

    info!("Market analysis complete");

    Ok(())
}

/// CLI argument, then the form's csv_path, then SALES_FILE
fn resolve_sales_path(
    arg: Option<String>,
    inputs: &AnalysisInputs,
    config: &Config,
) -> Result<PathBuf> {
    if let Some(arg) = arg {
        return Ok(arg.into());
    }
    if let Some(path) = &inputs.csv_path {
        return Ok(path.clone());
    }
    if let Some(path) = &config.sales_file {
        return Ok(path.clone());
    }
    bail!("No sales file given: pass a path, set csv_path in the form inputs, or set SALES_FILE")
}

/// Configuration loaded from environment variables
#[derive(Debug, Clone)]
struct Config {
    inputs_path: PathBuf,
    output_dir: PathBuf,
    sales_file: Option<PathBuf>,
    subject_file: Option<PathBuf>,
}

impl Config {
    fn from_env() -> Self {
        Config {
            inputs_path: env::var("MARKET_INPUTS")
                .unwrap_or_else(|_| "market_analysis_inputs.json".to_string())
                .into(),

            output_dir: env::var("OUTPUT_DIR")
                .unwrap_or_else(|_| "market_outputs".to_string())
                .into(),

            sales_file: env::var("SALES_FILE").ok().map(PathBuf::from),

            subject_file: env::var("SUBJECT_FILE").ok().map(PathBuf::from),
        }
    }
}
