//! Pipeline Configuration Module
//!
//! Provides deployment configuration loaded from TOML files: prediction
//! service location, batch sizing, alert thresholds and header aliases.
//!
//! ## Loading Order
//!
//! 1. `RUL_SENTINEL_CONFIG` environment variable (path to TOML file)
//! 2. `rul_sentinel.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! let (cfg, provenance) = PipelineConfig::load_with_provenance();
//! config::init(cfg, provenance);
//!
//! let batch_size = config::get().batch.batch_size;
//! ```

mod pipeline_config;
pub mod defaults;
pub mod validation;

pub use pipeline_config::*;

use std::sync::OnceLock;

/// Global pipeline configuration, initialized once at startup.
static PIPELINE_CONFIG: OnceLock<PipelineConfig> = OnceLock::new();

/// Which keys the operator set explicitly, captured alongside the config.
static CONFIG_PROVENANCE: OnceLock<ConfigProvenance> = OnceLock::new();

/// Initialize the global pipeline configuration.
///
/// A second call is ignored with a warning.
pub fn init(config: PipelineConfig, provenance: ConfigProvenance) {
    if PIPELINE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
        return;
    }
    let _ = CONFIG_PROVENANCE.set(provenance);
}

/// Get a reference to the global pipeline configuration.
///
/// Panics if `init()` has not been called. A missing config is a startup
/// bug, not a recoverable condition.
#[allow(clippy::expect_used)]
pub fn get() -> &'static PipelineConfig {
    PIPELINE_CONFIG
        .get()
        .expect("config::get() called before config::init(), this is a startup bug")
}

/// Provenance of the global config (empty if `init()` was never called).
pub fn provenance() -> ConfigProvenance {
    CONFIG_PROVENANCE.get().cloned().unwrap_or_default()
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    PIPELINE_CONFIG.get().is_some()
}
