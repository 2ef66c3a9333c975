//! Command-line parsing for the speed-impact analyses.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the estimation code.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::domain::{Aggregation, AnalysisConfig, InternetType, Outcome};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "azimpact",
    version,
    about = "Causal impact of Azerbaijan's telecom policies on internet speeds (ITS + DID)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interrupted time series plus placebo test for one population.
    Its(ItsArgs),
    /// Difference-in-differences against one or more comparator countries.
    Did(DidArgs),
    /// Both analyses for every outcome, with all exports.
    Run(RunArgs),
    /// Write a synthetic input CSV.
    Simulate(SimulateArgs),
}

/// Where the data comes from and where results go.
#[derive(Debug, Args, Clone)]
pub struct InputArgs {
    /// Input CSV (falls back to `AZIMPACT_INPUT`).
    #[arg(short = 'i', long, value_name = "CSV")]
    pub input: Option<PathBuf>,

    /// Use a seeded synthetic panel instead of an input file.
    #[arg(long, conflicts_with = "input")]
    pub sample: bool,

    /// Export directory (falls back to `AZIMPACT_OUTPUT_DIR`, then `./outputs`).
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Print the summary only; write no files.
    #[arg(long)]
    pub no_export: bool,

    /// Treated country.
    #[arg(long, default_value = "Azerbaijan")]
    pub country: String,

    #[arg(long, value_enum, default_value_t = InternetType::Fixed)]
    pub internet_type: InternetType,

    #[arg(long, value_enum, default_value_t = Aggregation::Median)]
    pub aggregation: Aggregation,

    /// Outcome variables, comma separated.
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = [Outcome::Download, Outcome::Upload])]
    pub outcomes: Vec<Outcome>,

    /// Threshold for significance wording and the parallel-trends flag.
    #[arg(long, default_value_t = 0.05)]
    pub significance: f64,
}

/// ITS and placebo knobs.
#[derive(Debug, Args, Clone)]
pub struct ItsOptions {
    /// First month of the intervention (YYYY-MM-DD).
    #[arg(long, default_value = "2022-01-01")]
    pub its_cutoff: NaiveDate,

    /// Newey-West lag truncation.
    #[arg(long, default_value_t = 3)]
    pub lags: usize,

    /// Placebo replications.
    #[arg(long, default_value_t = 100)]
    pub placebo_iterations: usize,

    #[arg(long, default_value_t = 42)]
    pub placebo_seed: u64,

    /// Months excluded on each side of the true cutoff.
    #[arg(long, default_value_t = 6)]
    pub placebo_buffer: u32,

    /// Minimum number of eligible placebo dates.
    #[arg(long, default_value_t = 10)]
    pub placebo_min_eligible: usize,
}

/// DID knobs.
#[derive(Debug, Args, Clone)]
pub struct DidOptions {
    /// First post-period month (YYYY-MM-DD).
    #[arg(long, default_value = "2024-08-01")]
    pub did_cutoff: NaiveDate,

    /// Control countries, comma separated; several are pooled by monthly mean.
    #[arg(long, value_delimiter = ',', default_value = "Georgia")]
    pub controls: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct ItsArgs {
    #[command(flatten)]
    pub input: InputArgs,
    #[command(flatten)]
    pub its: ItsOptions,
}

#[derive(Debug, Args, Clone)]
pub struct DidArgs {
    #[command(flatten)]
    pub input: InputArgs,
    #[command(flatten)]
    pub did: DidOptions,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub input: InputArgs,
    #[command(flatten)]
    pub its: ItsOptions,
    #[command(flatten)]
    pub did: DidOptions,
}

/// Options for the synthetic panel writer.
#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Destination CSV.
    #[arg(short = 'o', long, value_name = "CSV", default_value = "speeds.csv")]
    pub output: PathBuf,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Number of months from April 2019.
    #[arg(long, default_value_t = 78)]
    pub months: usize,

    /// Noise standard deviation relative to the level.
    #[arg(long, default_value_t = 0.02)]
    pub noise: f64,
}

impl RunArgs {
    pub fn analysis_config(&self) -> AnalysisConfig {
        analysis_config(&self.input, Some(&self.its), Some(&self.did))
    }
}

impl ItsArgs {
    pub fn analysis_config(&self) -> AnalysisConfig {
        analysis_config(&self.input, Some(&self.its), None)
    }
}

impl DidArgs {
    pub fn analysis_config(&self) -> AnalysisConfig {
        analysis_config(&self.input, None, Some(&self.did))
    }
}

/// Merge parsed flags over the defaults.
fn analysis_config(input: &InputArgs, its: Option<&ItsOptions>, did: Option<&DidOptions>) -> AnalysisConfig {
    let mut config = AnalysisConfig {
        significance: input.significance,
        outcomes: input.outcomes.clone(),
        ..AnalysisConfig::default()
    };
    if let Some(its) = its {
        config.its_cutoff = its.its_cutoff;
        config.newey_west_lags = its.lags;
        config.placebo_iterations = its.placebo_iterations;
        config.placebo_seed = its.placebo_seed;
        config.placebo_buffer_months = its.placebo_buffer;
        config.placebo_min_eligible = its.placebo_min_eligible;
    }
    if let Some(did) = did {
        config.did_cutoff = did.did_cutoff;
    }
    config
}
