//! Two-group difference-in-differences.
//!
//! Estimates ATT = (Ȳ_treat,post − Ȳ_treat,pre) − (Ȳ_ctrl,post − Ȳ_ctrl,pre)
//! both from the four cell means and via OLS:
//! `y = α + γ·treated + δ·post + θ·(treated×post) + ε`, where θ is the ATT.
//!
//! Inference uses HC1 standard errors, Student-t p-values with `n - 4`
//! degrees of freedom and a normal-approximation 95% interval (`± 1.96·se`).
//!
//! Before the main fit, a pre-period regression
//! `y = a + b·time + c·treated + d·(time×treated)` tests for diverging
//! pre-trends. The test never blocks the estimate; it only sets
//! `parallel_trends_violated` when `p(d) < significance`. A pre-period too
//! short or too degenerate to fit leaves the diagnostic unavailable (NaN
//! coefficient, reason recorded) and the ATT is still returned.

use chrono::NaiveDate;
use nalgebra::DVector;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{Outcome, Series};
use crate::error::AnalysisError;
use crate::math::{
    CoefficientEstimate, Z_95, estimates_for, fit_ols, hc1_covariance, ols_covariance,
    standard_errors,
};
use crate::models::{DidTerm, Term, TrendTerm, build_design};

const MODEL: &str = "DID";
const TREND_MODEL: &str = "DID parallel-trends pre-test";

/// One row of the stacked two-group panel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DidPanelRow {
    pub date: NaiveDate,
    pub treated: u8,
    pub post: u8,
    /// Within-group 1-based time index.
    pub time_index: usize,
    pub y: f64,
}

/// Treated rows followed by control rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DidPanel {
    pub cutoff: NaiveDate,
    pub rows: Vec<DidPanelRow>,
}

impl DidPanel {
    fn cell_mean(&self, treated: u8, post: u8) -> f64 {
        let (sum, n) = self
            .rows
            .iter()
            .filter(|r| r.treated == treated && r.post == post)
            .fold((0.0, 0usize), |(s, n), r| (s + r.y, n + 1));
        sum / n as f64
    }
}

/// Cell means and the ATT computed from them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ManualDid {
    pub mean_treated_pre: f64,
    pub mean_treated_post: f64,
    pub mean_control_pre: f64,
    pub mean_control_post: f64,
    pub att: f64,
}

/// Coefficient with its normal-approximation 95% interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DidCoefficient {
    #[serde(flatten)]
    pub estimate: CoefficientEstimate,
    pub ci_low: f64,
    pub ci_high: f64,
}

/// Pre-period differential-trend diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParallelTrendsTest {
    /// The `time×treated` coefficient. NaN fields when unavailable.
    pub interaction: CoefficientEstimate,
    pub n_obs: usize,
    pub violated: bool,
    /// Why the pre-period regression could not be fitted.
    pub unavailable: Option<String>,
}

impl ParallelTrendsTest {
    /// Placeholder for a pre-test that failed to fit. Never counts as a violation.
    pub fn unavailable(n_obs: usize, err: &AnalysisError) -> Self {
        Self {
            interaction: CoefficientEstimate {
                name: TrendTerm::TimeTreated.name().to_string(),
                estimate: f64::NAN,
                std_error: f64::NAN,
                t_stat: f64::NAN,
                p_value: f64::NAN,
            },
            n_obs,
            violated: false,
            unavailable: Some(err.to_string()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }
}

/// Result of one DID run. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DidResult {
    pub outcome: Outcome,
    pub cutoff: NaiveDate,
    pub treated_label: String,
    pub control_label: String,
    pub n_obs: usize,
    pub df_resid: usize,
    /// In `DidTerm` order.
    pub coefficients: Vec<DidCoefficient>,
    /// Classical OLS standard error of the ATT, for comparison with HC1.
    pub att_ols_std_error: f64,
    pub manual: ManualDid,
    pub parallel_trends: ParallelTrendsTest,
}

impl DidResult {
    pub fn coefficient(&self, term: DidTerm) -> &DidCoefficient {
        &self.coefficients[term.index()]
    }

    /// Regression ATT (θ).
    pub fn att(&self) -> f64 {
        self.coefficient(DidTerm::TreatedPost).estimate.estimate
    }

    pub fn parallel_trends_violated(&self) -> bool {
        self.parallel_trends.violated
    }
}

/// Stack treated and control series for `outcome` around `cutoff`.
pub fn build_did_panel(
    treated: &Series,
    control: &Series,
    outcome: Outcome,
    cutoff: NaiveDate,
) -> Result<DidPanel, AnalysisError> {
    let mut rows = Vec::with_capacity(treated.len() + control.len());
    for (series, flag, group) in [(treated, 1u8, "treated"), (control, 0u8, "control")] {
        let values = series.response(outcome)?;
        let mut pre = 0;
        let mut post = 0;
        for (point, y) in series.points().iter().zip(values) {
            let is_post = point.date() >= cutoff;
            if is_post {
                post += 1;
            } else {
                pre += 1;
            }
            rows.push(DidPanelRow {
                date: point.date(),
                treated: flag,
                post: u8::from(is_post),
                time_index: point.time_index,
                y,
            });
        }
        if pre == 0 || post == 0 {
            return Err(AnalysisError::UnbalancedCutoff {
                group,
                cutoff,
                pre,
                post,
            });
        }
    }
    Ok(DidPanel { cutoff, rows })
}

/// ATT from the four cell means.
pub fn manual_did(panel: &DidPanel) -> ManualDid {
    let mean_treated_pre = panel.cell_mean(1, 0);
    let mean_treated_post = panel.cell_mean(1, 1);
    let mean_control_pre = panel.cell_mean(0, 0);
    let mean_control_post = panel.cell_mean(0, 1);
    ManualDid {
        mean_treated_pre,
        mean_treated_post,
        mean_control_pre,
        mean_control_post,
        att: (mean_treated_post - mean_treated_pre) - (mean_control_post - mean_control_pre),
    }
}

/// Pre-period test for diverging group trends.
pub fn parallel_trends_test(
    panel: &DidPanel,
    significance: f64,
) -> Result<ParallelTrendsTest, AnalysisError> {
    let pre: Vec<&DidPanelRow> = panel.rows.iter().filter(|r| r.post == 0).collect();
    let x = build_design::<TrendTerm>(pre.len(), |i, term| {
        let r = pre[i];
        let t = r.time_index as f64;
        let d = r.treated as f64;
        match term {
            TrendTerm::Intercept => 1.0,
            TrendTerm::Time => t,
            TrendTerm::Treated => d,
            TrendTerm::TimeTreated => t * d,
        }
    });
    let y = DVector::from_iterator(pre.len(), pre.iter().map(|r| r.y));
    let fit = fit_ols(TREND_MODEL, &x, &y)?;

    let se = standard_errors(&hc1_covariance(&x, &fit));
    let beta: Vec<f64> = fit.beta.iter().copied().collect();
    let mut estimates =
        estimates_for::<TrendTerm>(&beta, &se, fit.df_resid(), fit.response_scale());
    let interaction = estimates.swap_remove(TrendTerm::TimeTreated.index());
    let violated = interaction.p_value < significance;

    Ok(ParallelTrendsTest {
        interaction,
        n_obs: fit.n,
        violated,
        unavailable: None,
    })
}

/// Full DID run for one outcome.
pub fn fit_did(
    treated: &Series,
    control: &Series,
    outcome: Outcome,
    cutoff: NaiveDate,
    significance: f64,
) -> Result<DidResult, AnalysisError> {
    let panel = build_did_panel(treated, control, outcome, cutoff)?;

    let x = build_design::<DidTerm>(panel.rows.len(), |i, term| {
        let r = &panel.rows[i];
        let d = r.treated as f64;
        let p = r.post as f64;
        match term {
            DidTerm::Intercept => 1.0,
            DidTerm::Treated => d,
            DidTerm::Post => p,
            DidTerm::TreatedPost => d * p,
        }
    });
    let y = DVector::from_iterator(panel.rows.len(), panel.rows.iter().map(|r| r.y));
    let fit = fit_ols(MODEL, &x, &y)?;

    let se = standard_errors(&hc1_covariance(&x, &fit));
    let ols_se = standard_errors(&ols_covariance(&fit));
    let beta: Vec<f64> = fit.beta.iter().copied().collect();
    let coefficients = estimates_for::<DidTerm>(&beta, &se, fit.df_resid(), fit.response_scale())
        .into_iter()
        .map(|estimate| {
            let (ci_low, ci_high) = estimate.normal_ci(Z_95);
            DidCoefficient {
                estimate,
                ci_low,
                ci_high,
            }
        })
        .collect();

    let manual = manual_did(&panel);
    let parallel_trends = parallel_trends_test(&panel, significance).unwrap_or_else(|err| {
        let n_pre = panel.rows.iter().filter(|r| r.post == 0).count();
        warn!(
            outcome = outcome.column(),
            n_pre,
            error = %err,
            "parallel-trends pre-test unavailable; reporting ATT without it"
        );
        ParallelTrendsTest::unavailable(n_pre, &err)
    });

    debug!(
        outcome = outcome.column(),
        n = fit.n,
        %cutoff,
        att = beta[DidTerm::TreatedPost.index()],
        manual_att = manual.att,
        pretrend_p = parallel_trends.interaction.p_value,
        "fitted DID"
    );

    Ok(DidResult {
        outcome,
        cutoff,
        treated_label: treated.population().label(),
        control_label: control.population().label(),
        n_obs: fit.n,
        df_resid: fit.df_resid(),
        coefficients,
        att_ols_std_error: ols_se[DidTerm::TreatedPost.index()],
        manual,
        parallel_trends,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::panel::build_series;
    use crate::data::panel::tests::{month, observations};
    use crate::domain::{Aggregation, InternetType, Population};

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
    }

    fn series(country: &str, values: &[f64]) -> Series {
        let pop = Population::new(country, InternetType::Fixed);
        let records = observations(&pop, start(), values);
        build_series(&records, &pop, Aggregation::Median, start()).unwrap()
    }

    #[test]
    fn flat_groups_with_treated_jump() {
        // 20 months each, cutoff at month 11, treated +5 afterwards.
        let control = series("Georgia", &[50.0; 20]);
        let treated_values: Vec<f64> = (0..20).map(|i| if i >= 10 { 55.0 } else { 50.0 }).collect();
        let treated = series("Azerbaijan", &treated_values);

        let res = fit_did(&treated, &control, Outcome::Download, month(start(), 10), 0.05).unwrap();
        assert!((res.att() - 5.0).abs() < 1e-8, "att={}", res.att());
        assert!((res.manual.att - 5.0).abs() < 1e-12);
        assert!((res.parallel_trends.interaction.p_value - 1.0).abs() < 1e-9);
        assert!(!res.parallel_trends_violated());
        assert_eq!(res.n_obs, 40);
        assert_eq!(res.df_resid, 36);
    }

    #[test]
    fn manual_and_regression_att_agree_on_balanced_panel() {
        let noise = |i: usize| ((i * 13) % 7) as f64 * 0.3 - 0.9;
        let control: Vec<f64> = (0..24).map(|i| 20.0 + 0.2 * i as f64 + noise(i)).collect();
        let treated: Vec<f64> = (0..24)
            .map(|i| 25.0 + 0.2 * i as f64 + noise(i + 3) + if i >= 12 { 3.5 } else { 0.0 })
            .collect();

        let res = fit_did(
            &series("Azerbaijan", &treated),
            &series("Georgia", &control),
            Outcome::Download,
            month(start(), 12),
            0.05,
        )
        .unwrap();
        assert!((res.att() - res.manual.att).abs() < 1e-6);
        let att = res.coefficient(DidTerm::TreatedPost);
        assert!((att.ci_low - (att.estimate.estimate - 1.96 * att.estimate.std_error)).abs() < 1e-12);
        assert!((att.ci_high - (att.estimate.estimate + 1.96 * att.estimate.std_error)).abs() < 1e-12);
    }

    #[test]
    fn diverging_pre_trends_are_flagged_but_estimated() {
        let control: Vec<f64> = (0..24).map(|i| 30.0 + ((i * 5) % 3) as f64 * 0.1).collect();
        let treated: Vec<f64> = (0..24)
            .map(|i| 30.0 + 1.5 * i as f64 + ((i * 7) % 3) as f64 * 0.1)
            .collect();

        let res = fit_did(
            &series("Azerbaijan", &treated),
            &series("Georgia", &control),
            Outcome::Download,
            month(start(), 12),
            0.05,
        )
        .unwrap();
        assert!(res.parallel_trends_violated());
        assert!(res.parallel_trends.interaction.estimate > 1.0);
        assert!(res.att().is_finite());
    }

    #[test]
    fn hc1_exceeds_ols_for_heteroskedastic_cells() {
        let alt = |i: usize, a: f64| if i % 2 == 0 { a } else { -a };
        let control: Vec<f64> = (0..20)
            .map(|i| if i < 10 { 10.0 + alt(i, 0.1) } else { 12.0 + alt(i, 0.1) })
            .collect();
        let treated: Vec<f64> = (0..14)
            .map(|i| if i < 10 { 10.0 + alt(i, 0.1) } else { 15.0 + alt(i, 3.0) })
            .collect();

        let res = fit_did(
            &series("Azerbaijan", &treated),
            &series("Georgia", &control),
            Outcome::Download,
            month(start(), 10),
            0.05,
        )
        .unwrap();
        let hc1 = res.coefficient(DidTerm::TreatedPost).estimate.std_error;
        assert!(hc1 >= res.att_ols_std_error, "hc1={hc1} ols={}", res.att_ols_std_error);
        assert!((res.att() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn short_pre_period_keeps_att_without_pre_test() {
        // Two pre months per group: 4 pre rows cannot support a 4-parameter trend fit.
        let control: Vec<f64> = (0..12)
            .map(|i| 40.0 + 0.3 * i as f64 + ((i * 5) % 3) as f64 * 0.2)
            .collect();
        let treated: Vec<f64> = (0..12)
            .map(|i| 42.0 + 0.3 * i as f64 + ((i * 7) % 3) as f64 * 0.2 + if i >= 2 { 3.5 } else { 0.0 })
            .collect();

        let res = fit_did(
            &series("Azerbaijan", &treated),
            &series("Georgia", &control),
            Outcome::Download,
            month(start(), 2),
            0.05,
        )
        .unwrap();
        assert_eq!(res.n_obs, 24);
        assert!((res.att() - res.manual.att).abs() < 1e-9);
        assert!(res.att().is_finite());

        let pt = &res.parallel_trends;
        assert!(!pt.is_available());
        assert!(pt.unavailable.as_deref().unwrap().contains("parallel-trends"));
        assert!(pt.interaction.p_value.is_nan());
        assert_eq!(pt.n_obs, 4);
        assert!(!res.parallel_trends_violated());
    }

    #[test]
    fn single_pre_month_per_group_keeps_att() {
        let control: Vec<f64> = (0..10).map(|i| 10.0 + ((i * 3) % 4) as f64 * 0.5).collect();
        let treated: Vec<f64> = (0..10)
            .map(|i| (if i >= 1 { 16.0 } else { 11.0 }) + ((i * 5) % 4) as f64 * 0.5)
            .collect();

        let res = fit_did(
            &series("Azerbaijan", &treated),
            &series("Georgia", &control),
            Outcome::Download,
            month(start(), 1),
            0.05,
        )
        .unwrap();
        assert!((res.att() - res.manual.att).abs() < 1e-9);
        assert!(!res.parallel_trends.is_available());
        assert!(!res.parallel_trends_violated());
    }

    #[test]
    fn empty_post_window_is_unbalanced() {
        let control = series("Georgia", &[1.0; 12]);
        let treated = series("Azerbaijan", &[1.0; 6]);
        let err = fit_did(&treated, &control, Outcome::Download, month(start(), 8), 0.05).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::UnbalancedCutoff {
                group: "treated",
                cutoff: month(start(), 8),
                pre: 6,
                post: 0,
            }
        );
    }

    #[test]
    fn panel_tags_groups_and_periods() {
        let panel = build_did_panel(
            &series("Azerbaijan", &[1.0, 2.0, 3.0]),
            &series("Georgia", &[4.0, 5.0, 6.0]),
            Outcome::Download,
            month(start(), 2),
        )
        .unwrap();
        let tags: Vec<(u8, u8)> = panel.rows.iter().map(|r| (r.treated, r.post)).collect();
        assert_eq!(tags, vec![(1, 0), (1, 0), (1, 1), (0, 0), (0, 0), (0, 1)]);
    }
}
