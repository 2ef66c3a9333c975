//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and installs logging
//! - resolves the input (CSV file or synthetic panel)
//! - runs the requested analyses
//! - prints the summary and writes exports

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::cli::{Command, InputArgs, SimulateArgs};
use crate::config::Settings;
use crate::data::{SampleSpec, generate_panel};
use crate::domain::{AnalysisConfig, Observation, Population};
use crate::error::AppError;

pub mod pipeline;

use pipeline::{AnalysisRequest, run_analyses};

/// Entry point for the `azimpact` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    crate::logging::init_tracing()?;
    let settings = Settings::load();

    match cli.command {
        Command::Its(args) => {
            let config = args.analysis_config();
            handle_analysis(&args.input, Vec::new(), config, true, false, &settings)
        }
        Command::Did(args) => {
            let config = args.analysis_config();
            handle_analysis(&args.input, args.did.controls.clone(), config, false, true, &settings)
        }
        Command::Run(args) => {
            let config = args.analysis_config();
            handle_analysis(&args.input, args.did.controls.clone(), config, true, true, &settings)
        }
        Command::Simulate(args) => handle_simulate(&args),
    }
}

fn handle_analysis(
    input: &InputArgs,
    controls: Vec<String>,
    config: AnalysisConfig,
    run_its: bool,
    run_did: bool,
    settings: &Settings,
) -> Result<(), AppError> {
    let (records, source) = load_records(input, settings)?;
    let request = AnalysisRequest {
        treated: Population::new(input.country.clone(), input.internet_type),
        aggregation: input.aggregation,
        controls,
        run_its,
        run_did,
    };

    let output = run_analyses(&records, &request, &config)?;
    println!("{}", crate::report::format_run_summary(&output.summary, &source));

    if !input.no_export {
        let dir = input
            .output_dir
            .clone()
            .unwrap_or_else(|| settings.output_dir.clone());
        let written = crate::io::export_all(&dir, &output.export_bundle(), &output.summary)?;
        for path in written {
            println!("wrote {}", path.display());
        }
    }

    match output.failure() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Records from `--sample`, `--input` or `AZIMPACT_INPUT`, in that order.
fn load_records(input: &InputArgs, settings: &Settings) -> Result<(Vec<Observation>, String), AppError> {
    if input.sample {
        let spec = SampleSpec::default();
        info!(seed = spec.seed, months = spec.months, "using synthetic panel");
        return Ok((generate_panel(&spec)?, format!("synthetic panel (seed {})", spec.seed)));
    }

    let path: PathBuf = input
        .input
        .clone()
        .or_else(|| settings.input.clone())
        .ok_or_else(|| AppError::new(2, "No input: pass --input <CSV>, set AZIMPACT_INPUT, or use --sample."))?;
    let records = crate::io::load_observations(&path)?;
    info!(path = %path.display(), rows = records.len(), "loaded input");
    Ok((records, path.display().to_string()))
}

fn handle_simulate(args: &SimulateArgs) -> Result<(), AppError> {
    let spec = SampleSpec {
        seed: args.seed,
        months: args.months,
        noise_rel: args.noise,
        ..SampleSpec::default()
    };
    let records = generate_panel(&spec)?;
    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        crate::io::ensure_output_dir(parent)?;
    }
    crate::io::write_observations_csv(&args.output, &records)?;
    println!("wrote {} records to {}", records.len(), args.output.display());
    Ok(())
}
