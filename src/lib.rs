//! `az-speed-impact` library crate.
//!
//! The binary (`azimpact`) is a thin wrapper around this library so that:
//!
//! - estimators are testable without spawning processes
//! - the panel builder and estimators can be reused on other policy events
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod logging;
pub mod math;
pub mod models;
pub mod report;
