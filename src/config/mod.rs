//! Analytics Configuration Module
//!
//! Every threshold, window size, band edge and timing in the pipeline is read
//! from TOML. There is no global instance: `main` loads one `AnalyticsConfig`
//! and hands each component the section it needs at construction.
//!
//! ## Loading Order
//!
//! 1. `--config <path>` on the command line (errors are fatal)
//! 2. `VIBRALYZER_CONFIG` environment variable (path to TOML file)
//! 3. `vibralyzer.toml` in the current working directory
//! 4. Built-in defaults

mod analytics_config;
pub mod defaults;
pub mod validation;

pub use analytics_config::*;
