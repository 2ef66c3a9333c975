//! Durbin-Watson serial-correlation diagnostic.
//!
//! `d = Σ_{t≥2} (e_t - e_{t-1})² / Σ e_t²`
//!
//! The p-value uses a normal approximation with the exact null moments of
//! `d` for the fitted design. With `M = I - X(X'X)^{-1}X'` and `A = D'D`
//! (`D` the first-difference operator), under independent errors:
//!
//! - `E[d] = tr(MA) / (n-k)`
//! - `Var[d] = 2·((n-k)·tr((MA)²) - tr(MA)²) / ((n-k)²·(n-k+2))`
//!
//! The reported p-value is two-sided (positive or negative autocorrelation).

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::math::inference::normal_two_sided_p;
use crate::math::ols::OlsFit;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurbinWatson {
    pub statistic: f64,
    pub p_value: f64,
}

/// Compute the statistic and its p-value for a fit on design `x`.
pub fn durbin_watson(x: &DMatrix<f64>, fit: &OlsFit) -> DurbinWatson {
    let e = &fit.residuals;
    let n = e.len();

    let ss: f64 = e.iter().map(|v| v * v).sum();
    let diff: f64 = (1..n).map(|t| (e[t] - e[t - 1]).powi(2)).sum();
    if !(ss > 0.0) || n < 2 {
        return DurbinWatson {
            statistic: f64::NAN,
            p_value: f64::NAN,
        };
    }
    let statistic = diff / ss;

    let m = DMatrix::<f64>::identity(n, n) - x * &fit.xtx_inv * x.transpose();
    let ma = m * difference_gram(n);
    let tr_ma = ma.trace();
    let tr_ma2 = (&ma * &ma).trace();

    let dof = fit.df_resid() as f64;
    let mean = tr_ma / dof;
    let var = 2.0 * (dof * tr_ma2 - tr_ma * tr_ma) / (dof * dof * (dof + 2.0));

    let p_value = if var > 0.0 {
        normal_two_sided_p((statistic - mean) / var.sqrt())
    } else {
        f64::NAN
    };

    DurbinWatson { statistic, p_value }
}

/// `D'D` for the `(n-1) × n` first-difference operator: tridiagonal with
/// diagonal `[1, 2, ..., 2, 1]` and off-diagonals `-1`.
fn difference_gram(n: usize) -> DMatrix<f64> {
    DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            if i == 0 || i == n - 1 { 1.0 } else { 2.0 }
        } else if i.abs_diff(j) == 1 {
            -1.0
        } else {
            0.0
        }
    })
}
