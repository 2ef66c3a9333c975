//! Coefficient covariance estimators.
//!
//! All three estimators share the sandwich form
//! `V = (X'X)^{-1} · meat · (X'X)^{-1}`:
//!
//! - classical OLS: `meat = σ² X'X`, so `V = σ² (X'X)^{-1}` with `σ² = RSS/(n-k)`
//! - HC1: `meat = n/(n-k) · Σ_i e_i² x_i x_i'`
//! - Newey-West: `meat = Σ_i e_i² x_i x_i' + Σ_{l=1}^{L} w_l Σ_t (x_t e_t e_{t-l} x_{t-l}' + transpose)`
//!   with Bartlett weights `w_l = 1 - l/(L+1)`, no prewhitening and no
//!   small-sample rescaling.

use nalgebra::{DMatrix, DVector};

use crate::math::ols::OlsFit;

/// Classical homoskedastic covariance `σ² (X'X)^{-1}`.
pub fn ols_covariance(fit: &OlsFit) -> DMatrix<f64> {
    let dof = fit.df_resid() as f64;
    let sigma2 = if dof > 0.0 { fit.rss / dof } else { f64::NAN };
    &fit.xtx_inv * sigma2
}

/// HC1 heteroskedasticity-robust covariance.
pub fn hc1_covariance(x: &DMatrix<f64>, fit: &OlsFit) -> DMatrix<f64> {
    let n = fit.n as f64;
    let scale = n / fit.df_resid() as f64;
    let meat = white_meat(x, &fit.residuals) * scale;
    sandwich(&fit.xtx_inv, &meat)
}

/// Newey-West HAC covariance with lag truncation `lags`.
///
/// Rows of `x` must be in time order.
pub fn newey_west_covariance(x: &DMatrix<f64>, fit: &OlsFit, lags: usize) -> DMatrix<f64> {
    let n = x.nrows();
    let p = x.ncols();
    let e = &fit.residuals;
    let lags = lags.min(n.saturating_sub(1));

    let mut meat = white_meat(x, e);
    for l in 1..=lags {
        let w = 1.0 - l as f64 / (lags as f64 + 1.0);
        let mut gamma = DMatrix::<f64>::zeros(p, p);
        for t in l..n {
            let s_t = x.row(t).transpose() * e[t];
            let s_lag = x.row(t - l) * e[t - l];
            gamma += s_t * s_lag;
        }
        meat += (&gamma + gamma.transpose()) * w;
    }

    sandwich(&fit.xtx_inv, &meat)
}

/// Square roots of the covariance diagonal (negative round-off clamped to 0).
pub fn standard_errors(cov: &DMatrix<f64>) -> Vec<f64> {
    (0..cov.nrows()).map(|j| cov[(j, j)].max(0.0).sqrt()).collect()
}

/// `Σ_i e_i² x_i x_i'`.
fn white_meat(x: &DMatrix<f64>, e: &DVector<f64>) -> DMatrix<f64> {
    let p = x.ncols();
    let mut meat = DMatrix::<f64>::zeros(p, p);
    for i in 0..x.nrows() {
        let row = x.row(i);
        meat += row.transpose() * row * (e[i] * e[i]);
    }
    meat
}

fn sandwich(bread: &DMatrix<f64>, meat: &DMatrix<f64>) -> DMatrix<f64> {
    bread * meat * bread
}
