//! Design-matrix construction for the segmented and DID regressions.
//!
//! The estimators rely on two primitive operations:
//! - build a design matrix from per-row term values (for OLS)
//! - predict y for a row given the fitted coefficients (fitted / counterfactual)

use nalgebra::{DMatrix, DVector};

use crate::domain::SeriesPoint;

/// A named regression column with a fixed position.
pub trait Term: Copy + Eq + std::fmt::Debug + 'static {
    /// All columns in design order.
    const ALL: &'static [Self];

    fn name(self) -> &'static str;

    /// Column position of this term.
    fn index(self) -> usize;
}

/// Segmented-regression columns:
/// `y = β0 + β1·time + β2·level + β3·slope + ε`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItsTerm {
    Intercept = 0,
    Time = 1,
    LevelChange = 2,
    SlopeChange = 3,
}

impl Term for ItsTerm {
    const ALL: &'static [Self] = &[
        ItsTerm::Intercept,
        ItsTerm::Time,
        ItsTerm::LevelChange,
        ItsTerm::SlopeChange,
    ];

    fn name(self) -> &'static str {
        match self {
            ItsTerm::Intercept => "intercept",
            ItsTerm::Time => "time_index",
            ItsTerm::LevelChange => "intervention_flag",
            ItsTerm::SlopeChange => "time_since_intervention",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Two-group DID columns:
/// `y = α + γ·treated + δ·post + θ·(treated×post) + ε`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DidTerm {
    Intercept = 0,
    Treated = 1,
    Post = 2,
    TreatedPost = 3,
}

impl Term for DidTerm {
    const ALL: &'static [Self] = &[
        DidTerm::Intercept,
        DidTerm::Treated,
        DidTerm::Post,
        DidTerm::TreatedPost,
    ];

    fn name(self) -> &'static str {
        match self {
            DidTerm::Intercept => "intercept",
            DidTerm::Treated => "treated",
            DidTerm::Post => "post",
            DidTerm::TreatedPost => "treated:post",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Pre-period differential-trend columns:
/// `y = a + b·time + c·treated + d·(time×treated) + ε`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendTerm {
    Intercept = 0,
    Time = 1,
    Treated = 2,
    TimeTreated = 3,
}

impl Term for TrendTerm {
    const ALL: &'static [Self] = &[
        TrendTerm::Intercept,
        TrendTerm::Time,
        TrendTerm::Treated,
        TrendTerm::TimeTreated,
    ];

    fn name(self) -> &'static str {
        match self {
            TrendTerm::Intercept => "intercept",
            TrendTerm::Time => "time_index",
            TrendTerm::Treated => "treated",
            TrendTerm::TimeTreated => "time_index:treated",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Build an `n × T::ALL.len()` design matrix from a per-cell value function.
pub fn build_design<T: Term>(n: usize, value: impl Fn(usize, T) -> f64) -> DMatrix<f64> {
    DMatrix::from_fn(n, T::ALL.len(), |i, j| value(i, T::ALL[j]))
}

/// Value of an ITS column for a series point.
///
/// With `counterfactual = true` the intervention terms are forced to zero,
/// extending the pre-trend across the whole series.
pub fn its_value(point: &SeriesPoint, term: ItsTerm, counterfactual: bool) -> f64 {
    match term {
        ItsTerm::Intercept => 1.0,
        ItsTerm::Time => point.time_index as f64,
        ItsTerm::LevelChange if counterfactual => 0.0,
        ItsTerm::LevelChange => point.intervention_flag as f64,
        ItsTerm::SlopeChange if counterfactual => 0.0,
        ItsTerm::SlopeChange => point.time_since_intervention as f64,
    }
}

/// ITS design matrix for a series.
pub fn its_design(points: &[SeriesPoint], counterfactual: bool) -> DMatrix<f64> {
    build_design::<ItsTerm>(points.len(), |i, term| {
        its_value(&points[i], term, counterfactual)
    })
}

/// Predict every row of a design matrix.
pub fn predict(design: &DMatrix<f64>, beta: &DVector<f64>) -> Vec<f64> {
    (design * beta).iter().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Aggregation, InternetType, Observation, Population};
    use chrono::NaiveDate;

    fn point(time_index: usize, flag: u8, since: usize) -> SeriesPoint {
        SeriesPoint {
            observation: Observation {
                date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                population: Population::new("Azerbaijan", InternetType::Fixed),
                aggregation: Aggregation::Median,
                download_speed: 1.0,
                upload_speed: 1.0,
                latency: None,
                jitter: None,
            },
            time_index,
            intervention_flag: flag,
            time_since_intervention: since,
        }
    }

    #[test]
    fn term_indices_follow_declaration_order() {
        for (i, t) in ItsTerm::ALL.iter().enumerate() {
            assert_eq!(t.index(), i);
        }
        for (i, t) in DidTerm::ALL.iter().enumerate() {
            assert_eq!(t.index(), i);
        }
        assert_eq!(TrendTerm::TimeTreated.index(), 3);
        assert_eq!(DidTerm::TreatedPost.name(), "treated:post");
    }

    #[test]
    fn counterfactual_design_zeroes_intervention_terms() {
        let points = vec![point(1, 0, 0), point(2, 1, 1), point(3, 1, 2)];
        let factual = its_design(&points, false);
        let counter = its_design(&points, true);

        assert_eq!(factual[(2, ItsTerm::LevelChange.index())], 1.0);
        assert_eq!(factual[(2, ItsTerm::SlopeChange.index())], 2.0);
        assert_eq!(counter[(2, ItsTerm::LevelChange.index())], 0.0);
        assert_eq!(counter[(2, ItsTerm::SlopeChange.index())], 0.0);
        assert_eq!(counter[(2, ItsTerm::Time.index())], 3.0);
    }

    #[test]
    fn predict_matches_manual_dot_product() {
        let x = build_design::<DidTerm>(2, |i, term| match term {
            DidTerm::Intercept => 1.0,
            DidTerm::Treated => i as f64,
            DidTerm::Post => 1.0,
            DidTerm::TreatedPost => i as f64,
        });
        let beta = DVector::from_row_slice(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(predict(&x, &beta), vec![4.0, 10.0]);
    }
}
