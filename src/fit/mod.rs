//! Causal estimators.
//!
//! Responsibilities:
//!
//! - segmented-regression interrupted time series with HAC inference (`its`)
//! - randomization inference over placebo cutoffs (`placebo`)
//! - two-group difference-in-differences with a parallel-trends pre-test (`did`)

pub mod did;
pub mod its;
pub mod placebo;

pub use did::*;
pub use its::*;
pub use placebo::*;
