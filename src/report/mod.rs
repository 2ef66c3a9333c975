//! Result aggregation: estimator outputs -> reporting tables and narratives.
//!
//! Everything here is a pure reshaping of already-computed results. Estimates,
//! standard errors and p-values are copied, never re-derived; the only
//! arithmetic is the descriptive pre/post comparison of the observed series.
//!
//! We keep formatting code in one place so:
//! - the estimators stay clean and testable
//! - wording changes are localized (the reporting layer uses these strings verbatim)

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::{AnalysisConfig, Outcome, Series};
use crate::error::AnalysisError;
use crate::fit::{DidResult, ItsResult, PlaceboDistribution};
use crate::models::{DidTerm, ItsTerm};

pub mod format;

pub use format::*;

/// One ITS result-table row (one per outcome).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItsRow {
    pub variable: String,
    pub cutoff: NaiveDate,
    pub n_obs: usize,
    pub intercept: f64,
    pub intercept_se: f64,
    pub intercept_p: f64,
    pub time_coef: f64,
    pub time_se: f64,
    pub time_p: f64,
    pub level_change: f64,
    pub level_change_se: f64,
    pub level_change_p: f64,
    pub slope_change: f64,
    pub slope_change_se: f64,
    pub slope_change_p: f64,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub durbin_watson: f64,
    pub durbin_watson_p: f64,
    pub placebo_p: Option<f64>,
    pub interpretation: String,
}

/// One DID result-table row (one per coefficient, plus the pre-trend diagnostic).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DidRow {
    pub variable: String,
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub p_value: f64,
    pub ci_low: f64,
    pub ci_high: f64,
}

/// Descriptive before/after comparison of the observed series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrePostDifference {
    pub variable: String,
    pub cutoff: NaiveDate,
    pub pre_mean: f64,
    pub post_mean: f64,
    pub absolute_diff: f64,
    /// Percent of the pre-period mean.
    pub relative_diff_pct: f64,
}

/// Per-date series with observed, fitted and counterfactual columns per outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesTable {
    pub dates: Vec<NaiveDate>,
    pub time_index: Vec<usize>,
    pub intervention_flag: Vec<u8>,
    pub time_since_intervention: Vec<usize>,
    /// `(column name, values)` in output order.
    pub columns: Vec<(String, Vec<f64>)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaceboSummary {
    pub iterations: usize,
    pub eligible_dates: usize,
    pub p_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItsSummary {
    pub row: ItsRow,
    pub pre_post: PrePostDifference,
    pub placebo: Option<PlaceboSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DidSummary {
    pub variable: String,
    pub treated: String,
    pub control: String,
    pub att: f64,
    pub manual_att: f64,
    pub att_se: f64,
    pub att_p: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    pub parallel_trends_p: f64,
    pub parallel_trends_violated: bool,
    /// Set when the pre-test could not be fitted.
    pub parallel_trends_unavailable: Option<String>,
    pub interpretation: String,
    pub rows: Vec<DidRow>,
}

/// An analysis that failed without aborting its siblings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedAnalysis {
    pub analysis: String,
    pub variable: String,
    pub error: String,
}

impl FailedAnalysis {
    pub fn new(analysis: &str, outcome: Outcome, error: &AnalysisError) -> Self {
        Self {
            analysis: analysis.to_string(),
            variable: outcome.column().to_string(),
            error: error.to_string(),
        }
    }
}

/// Everything a run produced, ready for the reporting layer.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub config: AnalysisConfig,
    pub its: Vec<ItsSummary>,
    pub did: Vec<DidSummary>,
    pub failures: Vec<FailedAnalysis>,
    pub narrative: Vec<String>,
}

impl RunSummary {
    /// Assemble the summary and its narrative lines.
    pub fn new(
        config: AnalysisConfig,
        its: Vec<ItsSummary>,
        did: Vec<DidSummary>,
        failures: Vec<FailedAnalysis>,
    ) -> Self {
        let mut narrative: Vec<String> = its
            .iter()
            .map(|s| format!("{}: {}", s.row.variable, s.row.interpretation))
            .chain(did.iter().map(|d| format!("{} (DID): {}", d.variable, d.interpretation)))
            .collect();
        for f in &failures {
            narrative.push(format!("{} {} failed: {}", f.variable, f.analysis, f.error));
        }
        Self {
            config,
            its,
            did,
            failures,
            narrative,
        }
    }

    pub fn any_parallel_trends_violated(&self) -> bool {
        self.did.iter().any(|d| d.parallel_trends_violated)
    }
}

/// "statistically significant at α=0.05" or its negation.
pub fn significance_phrase(p_value: f64, alpha: f64) -> String {
    if p_value.is_nan() {
        format!("significance at α={alpha} could not be assessed")
    } else if p_value < alpha {
        format!("statistically significant at α={alpha}")
    } else {
        format!("not statistically significant at α={alpha}")
    }
}

/// Build the ITS table row.
pub fn its_row(res: &ItsResult, placebo: Option<&PlaceboDistribution>, alpha: f64) -> ItsRow {
    let c = |t: ItsTerm| res.coefficient(t);
    let unit = res.outcome.unit();
    let level = c(ItsTerm::LevelChange);
    let slope = c(ItsTerm::SlopeChange);

    let mut interpretation = format!(
        "level change of {:+.2} {unit} at {} (p={:.4}) is {}; slope change of {:+.3} {unit}/month (p={:.4}) is {}",
        level.estimate,
        res.cutoff.format("%Y-%m"),
        level.p_value,
        significance_phrase(level.p_value, alpha),
        slope.estimate,
        slope.p_value,
        significance_phrase(slope.p_value, alpha),
    );
    if let Some(p) = placebo {
        interpretation.push_str(&format!(
            "; placebo p={:.3} over {} draws",
            p.p_value,
            p.draws.len()
        ));
    }

    ItsRow {
        variable: res.outcome.column().to_string(),
        cutoff: res.cutoff,
        n_obs: res.n_obs,
        intercept: c(ItsTerm::Intercept).estimate,
        intercept_se: c(ItsTerm::Intercept).std_error,
        intercept_p: c(ItsTerm::Intercept).p_value,
        time_coef: c(ItsTerm::Time).estimate,
        time_se: c(ItsTerm::Time).std_error,
        time_p: c(ItsTerm::Time).p_value,
        level_change: level.estimate,
        level_change_se: level.std_error,
        level_change_p: level.p_value,
        slope_change: slope.estimate,
        slope_change_se: slope.std_error,
        slope_change_p: slope.p_value,
        r_squared: res.r_squared,
        adj_r_squared: res.adj_r_squared,
        durbin_watson: res.durbin_watson.statistic,
        durbin_watson_p: res.durbin_watson.p_value,
        placebo_p: placebo.map(|p| p.p_value),
        interpretation,
    }
}

/// Descriptive pre/post means of the observed series at its cutoff.
pub fn pre_post_difference(
    series: &Series,
    outcome: Outcome,
) -> Result<PrePostDifference, AnalysisError> {
    let values = series.response(outcome)?;
    let mean = |post: bool| {
        let (sum, n) = series
            .points()
            .iter()
            .zip(&values)
            .filter(|(p, _)| p.is_post() == post)
            .fold((0.0, 0usize), |(s, n), (_, v)| (s + v, n + 1));
        if n == 0 { f64::NAN } else { sum / n as f64 }
    };
    let pre_mean = mean(false);
    let post_mean = mean(true);
    let absolute_diff = post_mean - pre_mean;
    let relative_diff_pct = if pre_mean != 0.0 {
        absolute_diff / pre_mean * 100.0
    } else {
        f64::NAN
    };
    Ok(PrePostDifference {
        variable: outcome.column().to_string(),
        cutoff: series.cutoff(),
        pre_mean,
        post_mean,
        absolute_diff,
        relative_diff_pct,
    })
}

pub fn placebo_summary(dist: &PlaceboDistribution) -> PlaceboSummary {
    PlaceboSummary {
        iterations: dist.draws.len(),
        eligible_dates: dist.eligible_count,
        p_value: dist.p_value,
    }
}

/// Series augmented with fitted and counterfactual columns for each ITS result.
pub fn time_series_table(series: &Series, results: &[ItsResult]) -> TimeSeriesTable {
    let points = series.points();
    let mut columns = Vec::with_capacity(results.len() * 3);
    for res in results {
        let name = res.outcome.column();
        columns.push((name.to_string(), res.observed.clone()));
        columns.push((format!("{name}_fitted"), res.fitted.clone()));
        columns.push((format!("{name}_counterfactual"), res.counterfactual.clone()));
    }
    TimeSeriesTable {
        dates: series.dates(),
        time_index: points.iter().map(|p| p.time_index).collect(),
        intervention_flag: points.iter().map(|p| p.intervention_flag).collect(),
        time_since_intervention: points.iter().map(|p| p.time_since_intervention).collect(),
        columns,
    }
}

/// DID coefficient rows plus the parallel-trends diagnostic row.
pub fn did_rows(res: &DidResult) -> Vec<DidRow> {
    let variable = res.outcome.column().to_string();
    let mut rows: Vec<DidRow> = res
        .coefficients
        .iter()
        .map(|c| DidRow {
            variable: variable.clone(),
            name: c.estimate.name.clone(),
            estimate: c.estimate.estimate,
            std_error: c.estimate.std_error,
            p_value: c.estimate.p_value,
            ci_low: c.ci_low,
            ci_high: c.ci_high,
        })
        .collect();

    let pt = &res.parallel_trends.interaction;
    let (ci_low, ci_high) = pt.normal_ci(crate::math::Z_95);
    rows.push(DidRow {
        variable,
        name: format!("parallel_trends({})", pt.name),
        estimate: pt.estimate,
        std_error: pt.std_error,
        p_value: pt.p_value,
        ci_low,
        ci_high,
    });
    rows
}

/// Summary entry for one DID result, including the reliability flag.
pub fn did_summary(res: &DidResult, alpha: f64) -> DidSummary {
    let att = res.coefficient(DidTerm::TreatedPost);
    let pt = &res.parallel_trends;
    let unit = res.outcome.unit();

    let mut interpretation = format!(
        "ATT of {:+.2} {unit} for {} vs {} after {} (95% CI [{:.2}, {:.2}], p={:.4}) is {}",
        att.estimate.estimate,
        res.treated_label,
        res.control_label,
        res.cutoff.format("%Y-%m"),
        att.ci_low,
        att.ci_high,
        att.estimate.p_value,
        significance_phrase(att.estimate.p_value, alpha),
    );
    if let Some(reason) = &pt.unavailable {
        interpretation.push_str(&format!(
            "; parallel-trends pre-test unavailable ({reason}), assumption unchecked"
        ));
    } else if pt.violated {
        interpretation.push_str(&format!(
            "; parallel-trends assumption violated (pre-trend p={:.4}), estimate is unreliable",
            pt.interaction.p_value
        ));
    } else {
        interpretation.push_str(&format!(
            "; no evidence against parallel trends (pre-trend p={:.4})",
            pt.interaction.p_value
        ));
    }

    DidSummary {
        variable: res.outcome.column().to_string(),
        treated: res.treated_label.clone(),
        control: res.control_label.clone(),
        att: att.estimate.estimate,
        manual_att: res.manual.att,
        att_se: att.estimate.std_error,
        att_p: att.estimate.p_value,
        ci_low: att.ci_low,
        ci_high: att.ci_high,
        parallel_trends_p: pt.interaction.p_value,
        parallel_trends_violated: pt.violated,
        parallel_trends_unavailable: pt.unavailable.clone(),
        interpretation,
        rows: did_rows(res),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::panel::build_series;
    use crate::data::panel::tests::{month, observations};
    use crate::domain::{Aggregation, InternetType, Population};
    use crate::fit::{fit_did, fit_its};

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
    }

    fn series(country: &str, values: &[f64], cutoff_pos: u32) -> Series {
        let pop = Population::new(country, InternetType::Fixed);
        let records = observations(&pop, start(), values);
        build_series(&records, &pop, Aggregation::Median, month(start(), cutoff_pos)).unwrap()
    }

    #[test]
    fn significance_wording() {
        assert_eq!(
            significance_phrase(0.01, 0.05),
            "statistically significant at α=0.05"
        );
        assert_eq!(
            significance_phrase(0.2, 0.05),
            "not statistically significant at α=0.05"
        );
        assert_eq!(
            significance_phrase(0.07, 0.1),
            "statistically significant at α=0.1"
        );
    }

    #[test]
    fn pre_post_difference_uses_observed_means() {
        let s = series("Azerbaijan", &[10.0, 10.0, 20.0, 20.0], 2);
        let d = pre_post_difference(&s, Outcome::Download).unwrap();
        assert_eq!(d.pre_mean, 10.0);
        assert_eq!(d.post_mean, 20.0);
        assert_eq!(d.absolute_diff, 10.0);
        assert!((d.relative_diff_pct - 100.0).abs() < 1e-12);
    }

    #[test]
    fn its_row_copies_estimates() {
        let values: Vec<f64> = (0..24)
            .map(|i| 40.0 + 0.5 * i as f64 + if i >= 12 { 10.0 } else { 0.0 } + ((i * 3) % 5) as f64 * 0.2)
            .collect();
        let s = series("Azerbaijan", &values, 12);
        let res = fit_its(&s, Outcome::Download, 3).unwrap();
        let row = its_row(&res, None, 0.05);

        assert_eq!(row.level_change, res.level_change());
        assert_eq!(row.slope_change_se, res.coefficient(ItsTerm::SlopeChange).std_error);
        assert_eq!(row.durbin_watson, res.durbin_watson.statistic);
        assert_eq!(row.placebo_p, None);
        assert!(row.interpretation.contains("level change of +"));

        let table = time_series_table(&s, std::slice::from_ref(&res));
        assert_eq!(table.dates.len(), 24);
        let names: Vec<&str> = table.columns.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["download_speed", "download_speed_fitted", "download_speed_counterfactual"]
        );
    }

    #[test]
    fn violated_parallel_trends_reach_the_summary() {
        let control: Vec<f64> = (0..24).map(|i| 30.0 + ((i * 5) % 3) as f64 * 0.1).collect();
        let treated: Vec<f64> = (0..24)
            .map(|i| 30.0 + 1.5 * i as f64 + ((i * 7) % 3) as f64 * 0.1)
            .collect();
        let res = fit_did(
            &series("Azerbaijan", &treated, 0),
            &series("Georgia", &control, 0),
            Outcome::Download,
            month(start(), 12),
            0.05,
        )
        .unwrap();

        let summary = did_summary(&res, 0.05);
        assert!(summary.parallel_trends_violated);
        assert!(summary.interpretation.contains("parallel-trends assumption violated"));
        assert_eq!(summary.rows.len(), 5);
        assert!(summary.rows[4].name.starts_with("parallel_trends("));

        let run = RunSummary::new(AnalysisConfig::default(), Vec::new(), vec![summary], Vec::new());
        assert!(run.any_parallel_trends_violated());
        assert!(run.narrative[0].contains("unreliable"));
    }

    #[test]
    fn unavailable_pre_test_is_reported_not_hidden() {
        let control: Vec<f64> = (0..12).map(|i| 40.0 + ((i * 5) % 3) as f64 * 0.2).collect();
        let treated: Vec<f64> = (0..12)
            .map(|i| 44.0 + ((i * 7) % 3) as f64 * 0.2 + if i >= 2 { 3.0 } else { 0.0 })
            .collect();
        let res = fit_did(
            &series("Azerbaijan", &treated, 0),
            &series("Georgia", &control, 0),
            Outcome::Download,
            month(start(), 2),
            0.05,
        )
        .unwrap();

        let summary = did_summary(&res, 0.05);
        assert!(!summary.parallel_trends_violated);
        assert!(summary.parallel_trends_p.is_nan());
        assert!(summary.parallel_trends_unavailable.is_some());
        assert!(summary.interpretation.contains("pre-test unavailable"));
        assert!(summary.interpretation.starts_with("ATT of +"));

        let pt_row = &summary.rows[4];
        assert!(pt_row.name.starts_with("parallel_trends("));
        assert!(pt_row.estimate.is_nan() && pt_row.p_value.is_nan());
        assert!(summary.rows[3].estimate.is_finite());
    }
}
