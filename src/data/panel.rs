//! Panel builder: raw monthly records -> a single ordered `Series`.
//!
//! The derived time fields follow one rule everywhere (ITS, placebo refits,
//! DID time indices):
//!
//! - `time_index` is the 1-based position in date order
//! - `intervention_flag` is 1 when `date >= cutoff`
//! - `time_since_intervention` is `position - first_cutoff_position + 1`
//!   at/after the cutoff and 0 before it; calendar gaps do not skip counts

use chrono::{Datelike, NaiveDate};
use tracing::{debug, warn};

use crate::domain::{Aggregation, Observation, Population, Series, SeriesPoint, months_between};
use crate::error::AnalysisError;

/// Build the series for one population and aggregation kind.
///
/// Records for other populations or aggregation kinds are ignored. Duplicate
/// dates within the selected records are a `DataIntegrity` error.
pub fn build_series(
    records: &[Observation],
    population: &Population,
    aggregation: Aggregation,
    cutoff: NaiveDate,
) -> Result<Series, AnalysisError> {
    let mut selected: Vec<Observation> = records
        .iter()
        .filter(|r| &r.population == population && r.aggregation == aggregation)
        .cloned()
        .collect();

    if selected.is_empty() {
        return Err(AnalysisError::DataIntegrity(format!(
            "no {} records for {}",
            aggregation.as_str(),
            population.label()
        )));
    }

    selected.sort_by_key(|r| r.date);

    for r in &selected {
        if r.date.day() != 1 {
            return Err(AnalysisError::DataIntegrity(format!(
                "{} has a non first-of-month date {}",
                population.label(),
                r.date
            )));
        }
    }
    for w in selected.windows(2) {
        if w[0].date == w[1].date {
            return Err(AnalysisError::DataIntegrity(format!(
                "duplicate {} record for {} on {}",
                aggregation.as_str(),
                population.label(),
                w[0].date
            )));
        }
        let gap = months_between(w[0].date, w[1].date);
        if gap > 1 {
            warn!(
                population = %population.label(),
                from = %w[0].date,
                to = %w[1].date,
                missing_months = gap - 1,
                "calendar gap in series"
            );
        }
    }

    let points = derive_points(selected, cutoff);
    debug!(
        population = %population.label(),
        n = points.len(),
        %cutoff,
        "built series"
    );
    Ok(Series::from_parts(
        population.clone(),
        aggregation,
        cutoff,
        points,
    ))
}

/// Re-derive the intervention fields of an existing series at another cutoff.
///
/// The input series is left untouched.
pub fn rebuild_at(series: &Series, cutoff: NaiveDate) -> Series {
    let observations = series
        .points()
        .iter()
        .map(|p| p.observation.clone())
        .collect();
    Series::from_parts(
        series.population().clone(),
        series.aggregation(),
        cutoff,
        derive_points(observations, cutoff),
    )
}

/// Derive time fields for date-sorted observations.
fn derive_points(sorted: Vec<Observation>, cutoff: NaiveDate) -> Vec<SeriesPoint> {
    let first_post = sorted.iter().position(|o| o.date >= cutoff);

    sorted
        .into_iter()
        .enumerate()
        .map(|(pos, observation)| {
            let (flag, since) = match first_post {
                Some(k) if pos >= k => (1, pos - k + 1),
                _ => (0, 0),
            };
            SeriesPoint {
                observation,
                time_index: pos + 1,
                intervention_flag: flag,
                time_since_intervention: since,
            }
        })
        .collect()
}
