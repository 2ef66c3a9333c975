//! Data assembly: the panel builder and the synthetic panel generator.

pub mod panel;
pub mod sample;

pub use panel::{build_series, rebuild_at};
pub use sample::{SampleEffect, SampleSpec, generate_panel};
