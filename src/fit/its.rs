//! Interrupted time series (segmented regression).
//!
//! Model, fitted once per outcome:
//!
//! ```text
//! y_t = β0 + β1·time_index + β2·intervention_flag + β3·time_since_intervention + ε_t
//! ```
//!
//! - β2 is the immediate level change at the cutoff
//! - β3 is the change in slope relative to the pre-trend
//!
//! Inference uses Newey-West HAC standard errors and Student-t p-values with
//! `n - 4` degrees of freedom. R² and adjusted R² come from the plain OLS fit.
//! The counterfactual series evaluates the same coefficients with the
//! intervention terms set to zero.

use chrono::NaiveDate;
use nalgebra::DVector;
use serde::Serialize;
use tracing::debug;

use crate::domain::{Outcome, Series};
use crate::error::AnalysisError;
use crate::math::{
    CoefficientEstimate, DurbinWatson, durbin_watson, estimates_for, fit_ols,
    newey_west_covariance, standard_errors,
};
use crate::models::{ItsTerm, Term, its_design, predict};

const MODEL: &str = "ITS";

/// Result of one ITS fit. Immutable once constructed.
#[derive(Debug, Clone, Serialize)]
pub struct ItsResult {
    pub outcome: Outcome,
    pub cutoff: NaiveDate,
    pub n_obs: usize,
    pub df_resid: usize,
    pub newey_west_lags: usize,
    /// In `ItsTerm` order.
    pub coefficients: Vec<CoefficientEstimate>,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub durbin_watson: DurbinWatson,
    pub dates: Vec<NaiveDate>,
    pub observed: Vec<f64>,
    pub fitted: Vec<f64>,
    pub counterfactual: Vec<f64>,
}

impl ItsResult {
    pub fn coefficient(&self, term: ItsTerm) -> &CoefficientEstimate {
        &self.coefficients[term.index()]
    }

    pub fn level_change(&self) -> f64 {
        self.coefficient(ItsTerm::LevelChange).estimate
    }

    pub fn slope_change(&self) -> f64 {
        self.coefficient(ItsTerm::SlopeChange).estimate
    }
}

/// Fit the segmented regression for `outcome` on a built series.
pub fn fit_its(
    series: &Series,
    outcome: Outcome,
    newey_west_lags: usize,
) -> Result<ItsResult, AnalysisError> {
    check_segments(series)?;

    let observed = series.response(outcome)?;
    let y = DVector::from_column_slice(&observed);
    let x = its_design(series.points(), false);
    let fit = fit_ols(MODEL, &x, &y)?;

    let cov = newey_west_covariance(&x, &fit, newey_west_lags);
    let se = standard_errors(&cov);
    let beta: Vec<f64> = fit.beta.iter().copied().collect();
    let coefficients = estimates_for::<ItsTerm>(&beta, &se, fit.df_resid(), fit.response_scale());

    let dw = durbin_watson(&x, &fit);
    let fitted = predict(&x, &fit.beta);
    let counterfactual = predict(&its_design(series.points(), true), &fit.beta);

    debug!(
        outcome = outcome.column(),
        n = fit.n,
        df = fit.df_resid(),
        cutoff = %series.cutoff(),
        level_change = beta[ItsTerm::LevelChange.index()],
        slope_change = beta[ItsTerm::SlopeChange.index()],
        r2 = fit.r_squared,
        "fitted ITS"
    );

    Ok(ItsResult {
        outcome,
        cutoff: series.cutoff(),
        n_obs: fit.n,
        df_resid: fit.df_resid(),
        newey_west_lags,
        coefficients,
        r_squared: fit.r_squared,
        adj_r_squared: fit.adj_r_squared,
        durbin_watson: dw,
        dates: series.dates(),
        observed,
        fitted,
        counterfactual,
    })
}

/// Level-change coefficient only (same model, no inference).
///
/// Used by the placebo refits.
pub fn fit_level_change(series: &Series, outcome: Outcome) -> Result<f64, AnalysisError> {
    check_segments(series)?;
    let y = DVector::from_column_slice(&series.response(outcome)?);
    let x = its_design(series.points(), false);
    let fit = fit_ols(MODEL, &x, &y)?;
    Ok(fit.beta[ItsTerm::LevelChange.index()])
}

/// Reject cutoffs that collapse a design column before solving.
fn check_segments(series: &Series) -> Result<(), AnalysisError> {
    let n = series.len();
    let params = ItsTerm::ALL.len();
    if n <= params {
        return Err(AnalysisError::InsufficientData {
            model: MODEL,
            n,
            params,
        });
    }

    let (pre, post) = (series.pre_len(), series.post_len());
    let detail = if pre == 0 {
        Some("cutoff at or before the series start: intervention flag equals the intercept")
    } else if pre == 1 {
        Some("cutoff on the second record: time index equals intercept plus time since intervention")
    } else if post == 0 {
        Some("cutoff after the series end: intervention flag is all zeros")
    } else if post == 1 {
        Some("cutoff on the last record: intervention flag equals time since intervention")
    } else {
        None
    };

    match detail {
        Some(detail) => Err(AnalysisError::SingularDesign {
            model: MODEL,
            rank: params - 1,
            params,
            detail: format!("{detail} (cutoff {})", series.cutoff()),
        }),
        None => Ok(()),
    }
}
