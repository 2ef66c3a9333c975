//! Coefficient inference: t-statistics, p-values, confidence intervals.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

use crate::models::Term;

/// Relative magnitude below which a coefficient or standard error counts as zero.
const ZERO_TOL: f64 = 1e-9;

/// Two-sided 95% normal multiplier.
pub const Z_95: f64 = 1.96;

/// One fitted coefficient with its (robust) inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientEstimate {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub t_stat: f64,
    pub p_value: f64,
}

impl CoefficientEstimate {
    /// `estimate ± z·se`.
    pub fn normal_ci(&self, z: f64) -> (f64, f64) {
        (
            self.estimate - z * self.std_error,
            self.estimate + z * self.std_error,
        )
    }
}

/// Ratio `coef / se` with exact-fit handling.
///
/// Noise-free fits produce standard errors that are round-off. Only when the
/// standard error is zero relative to `scale` (the response magnitude) does
/// the convention apply: a zero coefficient gives `t = 0`, a non-zero one
/// gives `t = ±∞`. Otherwise the plain ratio is returned, however small.
pub fn t_statistic(coef: f64, se: f64, scale: f64) -> f64 {
    let tol = ZERO_TOL * scale.abs().max(1.0);
    if se > tol {
        return coef / se;
    }
    if coef.abs() <= tol {
        0.0
    } else {
        f64::INFINITY.copysign(coef)
    }
}

/// Two-sided p-value of `t` under Student's t with `df` degrees of freedom.
pub fn t_two_sided_p(t: f64, df: f64) -> f64 {
    if t.is_nan() {
        return f64::NAN;
    }
    if t.is_infinite() {
        return 0.0;
    }
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * dist.sf(t.abs())).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

/// Two-sided p-value of `z` under the standard normal.
pub fn normal_two_sided_p(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    if z.is_infinite() {
        return 0.0;
    }
    match Normal::new(0.0, 1.0) {
        Ok(dist) => (2.0 * dist.sf(z.abs())).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

/// Build named estimates for every term of a design.
pub fn estimates_for<T: Term>(
    beta: &[f64],
    std_errors: &[f64],
    df: usize,
    scale: f64,
) -> Vec<CoefficientEstimate> {
    T::ALL
        .iter()
        .map(|&term| {
            let j = term.index();
            let t_stat = t_statistic(beta[j], std_errors[j], scale);
            CoefficientEstimate {
                name: term.name().to_string(),
                estimate: beta[j],
                std_error: std_errors[j],
                t_stat,
                p_value: t_two_sided_p(t_stat, df as f64),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_p_values_match_reference_quantiles() {
        // t_{0.975, 10} = 2.228139
        let p = t_two_sided_p(2.228139, 10.0);
        assert!((p - 0.05).abs() < 1e-5, "p={p}");
        assert!((t_two_sided_p(0.0, 5.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn normal_p_value_at_196() {
        let p = normal_two_sided_p(1.959964);
        assert!((p - 0.05).abs() < 1e-6, "p={p}");
    }

    #[test]
    fn exact_fit_conventions() {
        assert_eq!(t_statistic(0.0, 0.0, 50.0), 0.0);
        assert_eq!(t_statistic(1e-13, 1e-14, 50.0), 0.0);
        assert_eq!(t_statistic(5.0, 0.0, 50.0), f64::INFINITY);
        assert_eq!(t_statistic(-5.0, 0.0, 50.0), f64::NEG_INFINITY);
        assert_eq!(t_two_sided_p(f64::INFINITY, 10.0), 0.0);
        assert!((t_statistic(2.0, 0.5, 1.0) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn tiny_coefficient_with_real_se_keeps_its_ratio() {
        // Coefficient below 1e-9 of a unit-scale response, SE well above it.
        let t = t_statistic(1e-10, 1e-3, 1.0);
        assert!((t - 1e-7).abs() < 1e-18, "t={t}");

        let t = t_statistic(-2e-9, 4e-6, 50.0);
        assert!((t + 5e-4).abs() < 1e-15, "t={t}");
        assert!(t_two_sided_p(t, 20.0) < 1.0);

        // Round-off SE and round-off coefficient still count as an exact zero.
        assert_eq!(t_statistic(2e-9, 1e-11, 50.0), 0.0);
    }

    #[test]
    fn normal_ci_is_symmetric() {
        let est = CoefficientEstimate {
            name: "treated:post".into(),
            estimate: 5.0,
            std_error: 1.0,
            t_stat: 5.0,
            p_value: 0.0,
        };
        let (lo, hi) = est.normal_ci(Z_95);
        assert!((lo - 3.04).abs() < 1e-12);
        assert!((hi - 6.96).abs() < 1e-12);
    }
}
