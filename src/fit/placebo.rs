//! Randomization inference over placebo cutoffs.
//!
//! Procedure:
//!
//! 1. collect eligible fake cutoffs: series dates more than `buffer_months`
//!    calendar months away from the true cutoff that still leave a full-rank
//!    segmented design (at least two pre records and two post records)
//! 2. draw `iterations` dates uniformly with replacement from a seeded `StdRng`
//! 3. refit the ITS model at each fake cutoff and keep the level change
//! 4. p = share of draws with `|level change| >= |actual level change|`
//!
//! All draws are generated up front and only then dispatched to the rayon
//! pool, so the result does not depend on thread scheduling.

use chrono::NaiveDate;
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::data::panel::rebuild_at;
use crate::domain::{AnalysisConfig, Outcome, Series, months_between};
use crate::error::AnalysisError;
use crate::fit::its::fit_level_change;

/// Placebo knobs taken from the run configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceboSettings {
    pub iterations: usize,
    pub seed: u64,
    pub buffer_months: u32,
    pub min_eligible: usize,
}

impl PlaceboSettings {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            iterations: config.placebo_iterations,
            seed: config.placebo_seed,
            buffer_months: config.placebo_buffer_months,
            min_eligible: config.placebo_min_eligible,
        }
    }
}

impl Default for PlaceboSettings {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}

/// One placebo replication.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaceboDraw {
    /// 1-based.
    pub iteration: usize,
    pub fake_date: NaiveDate,
    pub level_change: f64,
}

/// Null distribution of the level change plus its empirical p-value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceboDistribution {
    pub outcome: Outcome,
    pub true_cutoff: NaiveDate,
    pub actual_level_change: f64,
    pub eligible_count: usize,
    pub draws: Vec<PlaceboDraw>,
    pub p_value: f64,
}

/// Series dates usable as fake cutoffs.
pub fn eligible_dates(series: &Series, true_cutoff: NaiveDate, buffer_months: u32) -> Vec<NaiveDate> {
    let n = series.len();
    let buffer = i64::from(buffer_months);
    series
        .points()
        .iter()
        .enumerate()
        .filter(|(pos, _)| *pos >= 2 && pos + 2 <= n)
        .map(|(_, p)| p.date())
        .filter(|&d| months_between(true_cutoff, d).abs() > buffer)
        .collect()
}

/// Draw `iterations` fake cutoffs uniformly with replacement.
///
/// The sequence is a pure function of `(eligible, iterations, seed)`.
pub fn draw_placebo_dates(
    eligible: &[NaiveDate],
    iterations: usize,
    seed: u64,
    min_eligible: usize,
) -> Result<Vec<NaiveDate>, AnalysisError> {
    if eligible.is_empty() || eligible.len() < min_eligible {
        return Err(AnalysisError::InsufficientEligibleDates {
            eligible: eligible.len(),
            required: min_eligible.max(1),
        });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    Ok((0..iterations)
        .map(|_| eligible[rng.gen_range(0..eligible.len())])
        .collect())
}

/// Refit the level change at each given fake cutoff.
pub fn run_placebo_draws(
    series: &Series,
    outcome: Outcome,
    fake_dates: &[NaiveDate],
    actual_level_change: f64,
    eligible_count: usize,
) -> Result<PlaceboDistribution, AnalysisError> {
    let draws: Vec<PlaceboDraw> = fake_dates
        .par_iter()
        .enumerate()
        .map(|(i, &fake_date)| {
            let moved = rebuild_at(series, fake_date);
            fit_level_change(&moved, outcome).map(|level_change| PlaceboDraw {
                iteration: i + 1,
                fake_date,
                level_change,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let p_value = empirical_p_value(&draws, actual_level_change);

    Ok(PlaceboDistribution {
        outcome,
        true_cutoff: series.cutoff(),
        actual_level_change,
        eligible_count,
        draws,
        p_value,
    })
}

/// Full placebo test around the series' own cutoff.
pub fn run_placebo(
    series: &Series,
    outcome: Outcome,
    actual_level_change: f64,
    settings: &PlaceboSettings,
) -> Result<PlaceboDistribution, AnalysisError> {
    let eligible = eligible_dates(series, series.cutoff(), settings.buffer_months);
    let fake_dates = draw_placebo_dates(
        &eligible,
        settings.iterations,
        settings.seed,
        settings.min_eligible,
    )
    .inspect_err(|_| {
        warn!(
            outcome = outcome.column(),
            cutoff = %series.cutoff(),
            buffer_months = settings.buffer_months,
            n = series.len(),
            "placebo buffer excludes too much of the series"
        )
    })?;

    let dist = run_placebo_draws(
        series,
        outcome,
        &fake_dates,
        actual_level_change,
        eligible.len(),
    )?;
    debug!(
        outcome = outcome.column(),
        eligible = eligible.len(),
        iterations = dist.draws.len(),
        p_value = dist.p_value,
        "placebo test complete"
    );
    Ok(dist)
}

fn empirical_p_value(draws: &[PlaceboDraw], actual: f64) -> f64 {
    if draws.is_empty() {
        return f64::NAN;
    }
    let extreme = draws
        .iter()
        .filter(|d| d.level_change.abs() >= actual.abs())
        .count();
    extreme as f64 / draws.len() as f64
}
