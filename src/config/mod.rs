//! Analysis Configuration Module
//!
//! Provides per-run configuration loaded from TOML files, replacing every
//! hardcoded angle threshold with an operator-tunable value.
//!
//! ## Loading Order
//!
//! 1. Explicit `--config` path (errors are fatal)
//! 2. `PULLUP_CONFIG` environment variable (path to TOML file)
//! 3. `pullup_config.toml` in the current working directory
//! 4. Built-in defaults (`config::defaults`)
//!
//! The config is an explicit value: each pipeline instance owns its own copy,
//! there is no process-wide configuration state.

mod analysis_config;
pub mod defaults;
pub mod validation;

pub use analysis_config::*;

use std::path::Path;

/// Resolve the configuration for a run.
///
/// An explicit path must load and validate; otherwise the standard search
/// order falls back to defaults with a warning.
pub fn resolve(explicit: Option<&Path>) -> Result<AnalysisConfig, ConfigError> {
    match explicit {
        Some(path) => {
            let config = AnalysisConfig::load_from_file(path)?;
            tracing::info!(path = %path.display(), "Loaded analysis config");
            Ok(config)
        }
        None => Ok(AnalysisConfig::load()),
    }
}
