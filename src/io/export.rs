//! Export aggregated results to CSV and JSON.
//!
//! Files written into the output directory:
//! - `its_results.csv`: one row per ITS outcome
//! - `its_timeseries.csv`: observed, fitted and counterfactual series
//! - `placebo_<variable>.csv`: placebo draws per outcome
//! - `did_<variable>.csv`: DID coefficients plus the pre-trend row
//! - `pre_post_differences.csv`: descriptive before/after means
//! - `summary.json`: the full [`RunSummary`]
//!
//! [`write_observations_csv`] writes records back in the ingest format.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::domain::Observation;
use crate::error::AppError;
use crate::fit::PlaceboDistribution;
use crate::report::{DidRow, ItsRow, PrePostDifference, RunSummary, TimeSeriesTable};

pub fn ensure_output_dir(dir: &Path) -> Result<(), AppError> {
    fs::create_dir_all(dir).map_err(|e| {
        AppError::new(2, format!("Failed to create output directory '{}': {e}", dir.display()))
    })
}

/// Serialize rows of any `Serialize` record type with a header line.
pub fn write_rows_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| create_error(path, e))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| AppError::new(2, format!("Failed to write CSV row to '{}': {e}", path.display())))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush '{}': {e}", path.display())))?;
    Ok(())
}

pub fn write_its_results_csv(path: &Path, rows: &[ItsRow]) -> Result<(), AppError> {
    write_rows_csv(path, rows)
}

pub fn write_did_csv(path: &Path, rows: &[DidRow]) -> Result<(), AppError> {
    write_rows_csv(path, rows)
}

pub fn write_pre_post_csv(path: &Path, rows: &[PrePostDifference]) -> Result<(), AppError> {
    write_rows_csv(path, rows)
}

pub fn write_placebo_csv(path: &Path, dist: &PlaceboDistribution) -> Result<(), AppError> {
    write_rows_csv(path, &dist.draws)
}

/// The time-series table has one column triple per outcome, so it is written
/// record by record instead of through serde.
pub fn write_time_series_csv(path: &Path, table: &TimeSeriesTable) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| create_error(path, e))?;
    let row_error = |e: csv::Error| AppError::new(2, format!("Failed to write CSV row to '{}': {e}", path.display()));

    let mut header = vec![
        "date".to_string(),
        "time_index".to_string(),
        "intervention_flag".to_string(),
        "time_since_intervention".to_string(),
    ];
    header.extend(table.columns.iter().map(|(name, _)| name.clone()));
    writer.write_record(&header).map_err(row_error)?;

    for (i, date) in table.dates.iter().enumerate() {
        let mut record = vec![
            date.to_string(),
            table.time_index[i].to_string(),
            table.intervention_flag[i].to_string(),
            table.time_since_intervention[i].to_string(),
        ];
        record.extend(
            table
                .columns
                .iter()
                .map(|(_, values)| values.get(i).map(|v| format!("{v:.6}")).unwrap_or_default()),
        );
        writer.write_record(&record).map_err(row_error)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush '{}': {e}", path.display())))?;
    Ok(())
}

/// Flat CSV shape of an [`Observation`], matching the ingest columns.
#[derive(Debug, Serialize)]
struct ObservationRecord<'a> {
    date: chrono::NaiveDate,
    country: &'a str,
    internet_type: &'static str,
    aggregation: &'static str,
    download_speed: f64,
    upload_speed: f64,
    latency: Option<f64>,
    jitter: Option<f64>,
}

impl<'a> From<&'a Observation> for ObservationRecord<'a> {
    fn from(o: &'a Observation) -> Self {
        Self {
            date: o.date,
            country: &o.population.country,
            internet_type: o.population.internet_type.as_str(),
            aggregation: o.aggregation.as_str(),
            download_speed: o.download_speed,
            upload_speed: o.upload_speed,
            latency: o.latency,
            jitter: o.jitter,
        }
    }
}

pub fn write_observations_csv(path: &Path, records: &[Observation]) -> Result<(), AppError> {
    let rows: Vec<ObservationRecord<'_>> = records.iter().map(ObservationRecord::from).collect();
    write_rows_csv(path, &rows)
}

pub fn write_summary_json(path: &Path, summary: &RunSummary) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| create_error(path, e))?;
    serde_json::to_writer_pretty(file, summary)
        .map_err(|e| AppError::new(2, format!("Failed to write JSON '{}': {e}", path.display())))
}

/// All result tables of one run.
#[derive(Debug, Clone, Default)]
pub struct ExportBundle<'a> {
    pub its_rows: Vec<ItsRow>,
    pub time_series: Option<TimeSeriesTable>,
    pub placebo: Vec<&'a PlaceboDistribution>,
    pub did_rows: Vec<(String, Vec<DidRow>)>,
    pub pre_post: Vec<PrePostDifference>,
}

/// Write every non-empty table plus `summary.json`; returns the written paths.
pub fn export_all(dir: &Path, bundle: &ExportBundle<'_>, summary: &RunSummary) -> Result<Vec<PathBuf>, AppError> {
    ensure_output_dir(dir)?;
    let mut written = Vec::new();

    if !bundle.its_rows.is_empty() {
        let path = dir.join("its_results.csv");
        write_its_results_csv(&path, &bundle.its_rows)?;
        written.push(path);
    }
    if let Some(table) = &bundle.time_series {
        let path = dir.join("its_timeseries.csv");
        write_time_series_csv(&path, table)?;
        written.push(path);
    }
    for dist in &bundle.placebo {
        let path = dir.join(format!("placebo_{}.csv", dist.outcome.column()));
        write_placebo_csv(&path, dist)?;
        written.push(path);
    }
    for (variable, rows) in &bundle.did_rows {
        let path = dir.join(format!("did_{variable}.csv"));
        write_did_csv(&path, rows)?;
        written.push(path);
    }
    if !bundle.pre_post.is_empty() {
        let path = dir.join("pre_post_differences.csv");
        write_pre_post_csv(&path, &bundle.pre_post)?;
        written.push(path);
    }

    let path = dir.join("summary.json");
    write_summary_json(&path, summary)?;
    written.push(path);

    info!(dir = %dir.display(), files = written.len(), "exported results");
    Ok(written)
}

fn create_error(path: &Path, e: impl std::fmt::Display) -> AppError {
    AppError::new(2, format!("Failed to create '{}': {e}", path.display()))
}
