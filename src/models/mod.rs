//! Regression designs for the ITS and DID models.
//!
//! Each model is a fixed, enumerated list of named columns so coefficient
//! positions are determined by the term enum rather than by formula text.

pub mod design;

pub use design::*;
