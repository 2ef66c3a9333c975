//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during estimation
//! - exported to CSV/JSON
//! - compared across runs in tests

use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Access technology of a measured population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InternetType {
    Fixed,
    Cellular,
}

impl InternetType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Some(InternetType::Fixed),
            "cellular" | "mobile" => Some(InternetType::Cellular),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InternetType::Fixed => "fixed",
            InternetType::Cellular => "cellular",
        }
    }
}

/// How the monthly per-country reading was aggregated upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Mean,
    Median,
}

impl Aggregation {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Some(Aggregation::Mean),
            "median" => Some(Aggregation::Median),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Aggregation::Mean => "mean",
            Aggregation::Median => "median",
        }
    }
}

/// Outcome variable an estimator is run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Download,
    Upload,
    Latency,
    Jitter,
}

impl Outcome {
    /// Column name in the input/output tables.
    pub fn column(self) -> &'static str {
        match self {
            Outcome::Download => "download_speed",
            Outcome::Upload => "upload_speed",
            Outcome::Latency => "latency",
            Outcome::Jitter => "jitter",
        }
    }

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            Outcome::Download => "Download speed",
            Outcome::Upload => "Upload speed",
            Outcome::Latency => "Latency",
            Outcome::Jitter => "Jitter",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Outcome::Download | Outcome::Upload => "Mbps",
            Outcome::Latency | Outcome::Jitter => "ms",
        }
    }

    /// Read this outcome from an observation.
    pub fn value(self, obs: &Observation) -> Option<f64> {
        match self {
            Outcome::Download => Some(obs.download_speed),
            Outcome::Upload => Some(obs.upload_speed),
            Outcome::Latency => obs.latency,
            Outcome::Jitter => obs.jitter,
        }
    }
}

/// A country × internet-type combination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Population {
    pub country: String,
    pub internet_type: InternetType,
}

impl Population {
    pub fn new(country: impl Into<String>, internet_type: InternetType) -> Self {
        Self {
            country: country.into(),
            internet_type,
        }
    }

    pub fn label(&self) -> String {
        format!("{} ({})", self.country, self.internet_type.as_str())
    }
}

/// One monthly reading for a population and aggregation kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// First day of the month.
    pub date: NaiveDate,
    pub population: Population,
    pub aggregation: Aggregation,
    /// Mbps.
    pub download_speed: f64,
    /// Mbps.
    pub upload_speed: f64,
    /// Milliseconds.
    pub latency: Option<f64>,
    /// Milliseconds.
    pub jitter: Option<f64>,
}

/// An observation with its intervention-relative time fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub observation: Observation,
    /// 1-based position in the series.
    pub time_index: usize,
    /// 1 when `date >= cutoff`, else 0.
    pub intervention_flag: u8,
    /// 0 before the cutoff; 1, 2, 3, ... from the first record at/after it.
    pub time_since_intervention: usize,
}

impl SeriesPoint {
    pub fn date(&self) -> NaiveDate {
        self.observation.date
    }

    pub fn is_post(&self) -> bool {
        self.intervention_flag == 1
    }
}

/// A time-ordered, gap-checked series for one population and aggregation kind.
///
/// Built only by `data::panel`; the derived time fields are never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    population: Population,
    aggregation: Aggregation,
    cutoff: NaiveDate,
    points: Vec<SeriesPoint>,
}

impl Series {
    pub(crate) fn from_parts(
        population: Population,
        aggregation: Aggregation,
        cutoff: NaiveDate,
        points: Vec<SeriesPoint>,
    ) -> Self {
        Self {
            population,
            aggregation,
            cutoff,
            points,
        }
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    pub fn cutoff(&self) -> NaiveDate {
        self.cutoff
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date()).collect()
    }

    /// Number of records before the cutoff.
    pub fn pre_len(&self) -> usize {
        self.points.iter().filter(|p| !p.is_post()).count()
    }

    /// Number of records at/after the cutoff.
    pub fn post_len(&self) -> usize {
        self.points.iter().filter(|p| p.is_post()).count()
    }

    /// Response vector for `outcome`, failing if any record lacks the value.
    pub fn response(&self, outcome: Outcome) -> Result<Vec<f64>, AnalysisError> {
        self.points
            .iter()
            .map(|p| {
                outcome
                    .value(&p.observation)
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| {
                        AnalysisError::DataIntegrity(format!(
                            "{} is missing {} on {}",
                            self.population.label(),
                            outcome.column(),
                            p.date()
                        ))
                    })
            })
            .collect()
    }
}

/// Months from the epoch, used for calendar-month distances.
pub fn month_ordinal(date: NaiveDate) -> i64 {
    date.year() as i64 * 12 + date.month0() as i64
}

/// Signed calendar-month distance `to - from`.
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i64 {
    month_ordinal(to) - month_ordinal(from)
}

/// Every adjustable constant of an analysis run.
///
/// Derived from CLI flags (plus defaults).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// ITS intervention cutoff (first month of the intervention).
    pub its_cutoff: NaiveDate,
    /// DID post-period boundary.
    pub did_cutoff: NaiveDate,
    /// Newey-West lag truncation.
    pub newey_west_lags: usize,
    /// Placebo replication count.
    pub placebo_iterations: usize,
    pub placebo_seed: u64,
    /// Months excluded on each side of the true cutoff when drawing placebo dates.
    pub placebo_buffer_months: u32,
    /// Fewer eligible placebo dates than this is an error.
    pub placebo_min_eligible: usize,
    /// Threshold used for interpretation text and the parallel-trends flag.
    pub significance: f64,
    /// Outcome variables analysed independently.
    pub outcomes: Vec<Outcome>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            its_cutoff: ymd(2022, 1, 1),
            did_cutoff: ymd(2024, 8, 1),
            newey_west_lags: 3,
            placebo_iterations: 100,
            placebo_seed: 42,
            placebo_buffer_months: 6,
            placebo_min_eligible: 10,
            significance: 0.05,
            outcomes: vec![Outcome::Download, Outcome::Upload],
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(self.significance.is_finite() && self.significance > 0.0 && self.significance < 1.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "significance must be in (0, 1), got {}",
                self.significance
            )));
        }
        if self.placebo_iterations == 0 {
            return Err(AnalysisError::InvalidConfig(
                "placebo iterations must be > 0".into(),
            ));
        }
        if self.placebo_min_eligible == 0 {
            return Err(AnalysisError::InvalidConfig(
                "placebo minimum eligible dates must be > 0".into(),
            ));
        }
        if self.outcomes.is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "at least one outcome variable is required".into(),
            ));
        }
        for (name, date) in [("ITS", self.its_cutoff), ("DID", self.did_cutoff)] {
            if date.day() != 1 {
                return Err(AnalysisError::InvalidConfig(format!(
                    "{name} cutoff {date} must be the first day of a month"
                )));
            }
        }
        Ok(())
    }
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
}
