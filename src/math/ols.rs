//! Ordinary least squares solver.
//!
//! Every estimator in this crate solves a small regression of the form:
//!
//! ```text
//! minimize Σ (y_i - x_i^T β)^2
//! ```
//!
//! with 4 columns and at most a few hundred rows.
//!
//! Implementation choices:
//! - We use SVD to solve the least-squares problem (the design is tall, and
//!   nalgebra's `QR::solve` is intended for square systems).
//! - Rank is checked on the singular values before solving. A collapsed
//!   column (e.g. a cutoff on the first record makes the intervention flag
//!   equal to the intercept) is a `SingularDesign` error rather than a silently
//!   regularized answer.
//! - `(X'X)^{-1}` is kept on the fit because every covariance estimator
//!   (classical, HC1, Newey-West) is a sandwich around it.

use nalgebra::{DMatrix, DVector};

use crate::error::AnalysisError;

/// Relative singular-value threshold below which a column is treated as collinear.
const RANK_TOL: f64 = 1e-10;

/// Output of a least-squares fit.
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub beta: DVector<f64>,
    pub xtx_inv: DMatrix<f64>,
    pub fitted: DVector<f64>,
    pub residuals: DVector<f64>,
    /// Residual sum of squares.
    pub rss: f64,
    /// Total sum of squares around the mean of y.
    pub tss: f64,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub n: usize,
    pub k: usize,
}

impl OlsFit {
    /// Residual degrees of freedom `n - k`.
    pub fn df_resid(&self) -> usize {
        self.n - self.k
    }

    /// Largest absolute response value, used to scale zero tolerances.
    pub fn response_scale(&self) -> f64 {
        (&self.fitted + &self.residuals)
            .iter()
            .fold(1.0_f64, |acc, v| acc.max(v.abs()))
    }
}

/// Fit `y = Xβ + ε` by least squares.
///
/// `model` names the regression in error messages.
pub fn fit_ols(
    model: &'static str,
    x: &DMatrix<f64>,
    y: &DVector<f64>,
) -> Result<OlsFit, AnalysisError> {
    let n = x.nrows();
    let k = x.ncols();

    if y.len() != n {
        return Err(AnalysisError::DataIntegrity(format!(
            "{model}: response length {} != design rows {n}",
            y.len()
        )));
    }
    if n <= k {
        return Err(AnalysisError::InsufficientData {
            model,
            n,
            params: k,
        });
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(AnalysisError::DataIntegrity(format!(
            "{model}: non-finite value in design or response"
        )));
    }

    let svd = x.clone().svd(true, true);
    let max_sv = svd.singular_values.max();
    let tol = (max_sv * RANK_TOL).max(f64::MIN_POSITIVE);
    let rank = svd.singular_values.iter().filter(|&&s| s > tol).count();
    if rank < k {
        return Err(AnalysisError::SingularDesign {
            model,
            rank,
            params: k,
            detail: collapsed_columns(x),
        });
    }

    let beta = svd
        .solve(y, tol)
        .map_err(|e| AnalysisError::SingularDesign {
            model,
            rank,
            params: k,
            detail: e.to_string(),
        })?;

    let xtx = x.transpose() * x;
    let xtx_inv = xtx.try_inverse().ok_or_else(|| AnalysisError::SingularDesign {
        model,
        rank,
        params: k,
        detail: "X'X not invertible".into(),
    })?;

    let fitted = x * &beta;
    let residuals = y - &fitted;
    let rss: f64 = residuals.iter().map(|r| r * r).sum();

    let mean = y.mean();
    let tss: f64 = y.iter().map(|v| (v - mean) * (v - mean)).sum();
    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { f64::NAN };
    let adj_r_squared = 1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / (n - k) as f64;

    Ok(OlsFit {
        beta,
        xtx_inv,
        fitted,
        residuals,
        rss,
        tss,
        r_squared,
        adj_r_squared,
        n,
        k,
    })
}

/// Describe constant columns, the usual cause of a singular segmented design.
fn collapsed_columns(x: &DMatrix<f64>) -> String {
    let constant: Vec<String> = (0..x.ncols())
        .filter(|&j| {
            let col = x.column(j);
            let first = col[0];
            col.iter().all(|v| (v - first).abs() < f64::EPSILON)
        })
        .map(|j| format!("column {j}"))
        .collect();

    if constant.len() > 1 {
        format!("constant columns: {}", constant.join(", "))
    } else {
        "linearly dependent columns".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2,3]
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0, 11.0]);

        let fit = fit_ols("test", &x, &y).unwrap();
        assert!((fit.beta[0] - 2.0).abs() < 1e-10);
        assert!((fit.beta[1] - 3.0).abs() < 1e-10);
        assert!(fit.rss < 1e-20);
        assert!((fit.r_squared - 1.0).abs() < 1e-12);
        assert_eq!(fit.df_resid(), 2);
    }

    #[test]
    fn r_squared_matches_hand_computation() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let y = DVector::from_row_slice(&[1.0, 3.0, 2.0, 4.0]);
        let fit = fit_ols("test", &x, &y).unwrap();

        // slope = 0.8, intercept = 1.3; residuals -0.3, 0.9, -0.9, 0.3
        assert!((fit.beta[1] - 0.8).abs() < 1e-12);
        assert!((fit.rss - 1.8).abs() < 1e-12);
        assert!((fit.tss - 5.0).abs() < 1e-12);
        assert!((fit.r_squared - 0.64).abs() < 1e-12);
        assert!((fit.adj_r_squared - 0.46).abs() < 1e-12);
    }

    #[test]
    fn too_few_rows_is_insufficient_data() {
        let x = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 1.0, 1.0]);
        let y = DVector::from_row_slice(&[1.0, 2.0]);
        let err = fit_ols("test", &x, &y).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData { n: 2, params: 2, .. }));
    }

    #[test]
    fn duplicated_column_is_singular() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        let y = DVector::from_row_slice(&[1.0, 2.0, 3.0, 4.0]);
        let err = fit_ols("test", &x, &y).unwrap_err();
        assert!(matches!(err, AnalysisError::SingularDesign { rank: 1, .. }));
    }
}
