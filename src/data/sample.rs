//! Synthetic monthly speed panels.
//!
//! Produces records that satisfy the input contract so the whole pipeline can
//! be exercised without the upstream data-preparation step: a treated country
//! with known level/slope breaks at given cutoffs plus comparator countries
//! following smooth trends, all with Gaussian noise from a seeded generator.

use chrono::{Months, NaiveDate};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{Aggregation, InternetType, Observation, Population, months_between};
use crate::error::AnalysisError;

/// Floor applied to generated speeds so every reading stays positive.
const MIN_SPEED: f64 = 0.1;

/// A break applied to the treated country.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleEffect {
    pub cutoff: NaiveDate,
    /// Immediate jump in download speed (Mbps).
    pub level_jump: f64,
    /// Added monthly growth after the cutoff (Mbps/month).
    pub slope_change: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SampleSpec {
    pub treated: String,
    pub comparators: Vec<String>,
    pub start: NaiveDate,
    pub months: usize,
    /// Treated download level at `start` (Mbps).
    pub base_download: f64,
    /// Treated pre-intervention growth (Mbps/month).
    pub pre_slope: f64,
    pub effects: Vec<SampleEffect>,
    /// Noise standard deviation as a fraction of the level.
    pub noise_rel: f64,
    pub seed: u64,
}

impl Default for SampleSpec {
    fn default() -> Self {
        let date = |y, m| NaiveDate::from_ymd_opt(y, m, 1).unwrap_or(NaiveDate::MIN);
        Self {
            treated: "Azerbaijan".to_string(),
            comparators: [
                "Armenia",
                "Georgia",
                "Kazakhstan",
                "Russia",
                "Turkey",
                "Ukraine",
                "Uzbekistan",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            start: date(2019, 4),
            // April 2019 – September 2025 inclusive.
            months: 78,
            base_download: 20.0,
            pre_slope: 0.25,
            effects: vec![
                SampleEffect {
                    cutoff: date(2022, 1),
                    level_jump: 6.0,
                    slope_change: 0.35,
                },
                SampleEffect {
                    cutoff: date(2024, 8),
                    level_jump: 8.0,
                    slope_change: 0.2,
                },
            ],
            noise_rel: 0.02,
            seed: 42,
        }
    }
}

/// Generate records for every country, internet type and aggregation kind.
pub fn generate_panel(spec: &SampleSpec) -> Result<Vec<Observation>, AnalysisError> {
    if spec.months == 0 {
        return Err(AnalysisError::InvalidConfig("sample months must be > 0".into()));
    }
    if !(spec.noise_rel.is_finite() && spec.noise_rel >= 0.0) {
        return Err(AnalysisError::InvalidConfig(format!(
            "invalid noise level {}",
            spec.noise_rel
        )));
    }

    let mut rng = StdRng::seed_from_u64(spec.seed);
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| AnalysisError::InvalidConfig(format!("noise distribution error: {e}")))?;

    let mut out = Vec::new();
    let countries = std::iter::once((&spec.treated, true))
        .chain(spec.comparators.iter().map(|c| (c, false)));

    for (country, treated) in countries {
        // Comparators get their own level and growth, drawn once per country.
        let (base, slope) = if treated {
            (spec.base_download, spec.pre_slope)
        } else {
            (
                spec.base_download * rng.gen_range(0.6..1.8),
                spec.pre_slope * rng.gen_range(0.5..1.5),
            )
        };

        for internet_type in [InternetType::Fixed, InternetType::Cellular] {
            let (type_scale, upload_ratio) = match internet_type {
                InternetType::Fixed => (1.0, 0.55),
                InternetType::Cellular => (1.3, 0.35),
            };
            let population = Population::new(country.clone(), internet_type);

            for m in 0..spec.months {
                let date = spec
                    .start
                    .checked_add_months(Months::new(m as u32))
                    .ok_or_else(|| AnalysisError::InvalidConfig("sample date overflow".into()))?;

                let mut level = base + slope * m as f64;
                if treated {
                    for e in &spec.effects {
                        let since = months_between(e.cutoff, date);
                        if since >= 0 {
                            level += e.level_jump + e.slope_change * (since + 1) as f64;
                        }
                    }
                }
                let level = level * type_scale;
                let sd = spec.noise_rel * level.abs();

                let median = (level + sd * normal.sample(&mut rng)).max(MIN_SPEED);
                let upload = (median * upload_ratio + sd * normal.sample(&mut rng)).max(MIN_SPEED);
                let latency = (45.0 - 0.1 * m as f64 + 2.0 * normal.sample(&mut rng)).max(1.0);
                let jitter = (8.0 + normal.sample(&mut rng)).max(0.5);

                for (aggregation, skew) in [(Aggregation::Median, 1.0), (Aggregation::Mean, 1.12)] {
                    out.push(Observation {
                        date,
                        population: population.clone(),
                        aggregation,
                        download_speed: median * skew,
                        upload_speed: upload * skew,
                        latency: Some(latency),
                        jitter: Some(jitter),
                    });
                }
            }
        }
    }

    Ok(out)
}
