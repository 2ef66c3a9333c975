//! Mathematical utilities: least squares, robust covariance, and inference.

pub mod covariance;
pub mod durbin_watson;
pub mod inference;
pub mod ols;

pub use covariance::*;
pub use durbin_watson::*;
pub use inference::*;
pub use ols::*;
