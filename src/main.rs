//! # IMS Analyzer
//!
//! Batch identification of substances in ion-mobility spectra.
//!
//! ## Usage
//!
//! ```bash
//! # Analyse an instrument export against a library
//! ims-analyzer --records measurements.parquet --library library.csv --resolution 32.392
//!
//! # Use a config file and also export JSON
//! ims-analyzer --records measurements.csv --library library.csv --config analysis.toml --json report.json
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;

use ims_analyzer::config::ConfigFile;
use ims_analyzer::data::loader::{load_library, load_records};
use ims_analyzer::pipeline::AnalysisPipeline;
use ims_analyzer::{SmoothingMode, report};

/// IMS Analyzer - ion-mobility spectrum reconciliation and substance identification
#[derive(Parser)]
#[command(name = "ims-analyzer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Measurement records (.csv, .json or .parquet)
    #[arg(short, long, value_name = "FILE")]
    records: PathBuf,

    /// Substance library (.csv or .json)
    #[arg(short, long, value_name = "FILE")]
    library: PathBuf,

    /// TOML analysis configuration
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Drift-time resolution in microseconds per index (overrides the config file)
    #[arg(long)]
    resolution: Option<f64>,

    /// K0 match tolerance (overrides the config file)
    #[arg(short, long)]
    tolerance: Option<f64>,

    /// Signal used for peak picking (overrides the config file)
    #[arg(long, value_enum)]
    smoothing_mode: Option<ModeArg>,

    /// Also write the full report as JSON to this file
    #[arg(long, value_name = "FILE")]
    json: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Smooth,
    SecondDerivative,
}

impl From<ModeArg> for SmoothingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Smooth => SmoothingMode::Smooth,
            ModeArg::SecondDerivative => SmoothingMode::SecondDerivative,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let mut config = match &cli.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?
            .analysis,
        None => ConfigFile::default().analysis,
    };
    if let Some(resolution) = cli.resolution {
        config.resolution = Some(resolution);
    }
    if let Some(tolerance) = cli.tolerance {
        config.tolerance = tolerance;
    }
    if let Some(mode) = cli.smoothing_mode {
        config.smoothing_mode = mode.into();
    }

    let library = load_library(&cli.library)
        .with_context(|| format!("loading library {}", cli.library.display()))?;
    let loaded = load_records(&cli.records)
        .with_context(|| format!("loading records {}", cli.records.display()))?;

    let pipeline = AnalysisPipeline::new(config, library)?;
    info!(
        "analysing {} records against {} library entries",
        loaded.records.len(),
        pipeline.library().len()
    );
    let report = pipeline.run_loaded(&loaded);

    if let Some(path) = &cli.json {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        report::write_json(&report, &mut writer)?;
        writer.flush()?;
        info!("wrote JSON report to {}", path.display());
    }

    report::write_summary(&report, io::stdout().lock())?;
    Ok(())
}
