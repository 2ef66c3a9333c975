//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - population / aggregation / outcome enums (`InternetType`, `Aggregation`, `Outcome`)
//! - monthly readings (`Observation`) and built series (`Series`, `SeriesPoint`)
//! - the run configuration (`AnalysisConfig`)

pub mod types;

pub use types::*;
