//! Runtime settings resolved from `.env` and the environment.
//!
//! Command-line flags always win; these only fill in what the user did not pass.

use std::env;
use std::path::PathBuf;

/// Default directory for exported tables.
pub const DEFAULT_OUTPUT_DIR: &str = "./outputs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Input CSV (`AZIMPACT_INPUT`).
    pub input: Option<PathBuf>,
    /// Root folder for exports (`AZIMPACT_OUTPUT_DIR`).
    pub output_dir: PathBuf,
}

impl Settings {
    /// Load configuration from `.env` (if present) and the process environment.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve settings from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let input = non_empty("AZIMPACT_INPUT").map(PathBuf::from);
        let output_dir = non_empty("AZIMPACT_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        Self { input, output_dir }
    }
}
