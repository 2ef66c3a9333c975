//! Input/output helpers.
//!
//! - CSV ingest, validation and comparator pooling (`ingest`)
//! - result exports (CSV/JSON) (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
