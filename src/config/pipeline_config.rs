//! Pipeline Configuration - operator-tunable TOML values
//!
//! Each section implements `Default` so a missing file or a partial file
//! still yields a complete, valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;
use crate::alerts::AlertThresholds;
use crate::ingest::CanonicalField;
use crate::prediction::ProcessingMode;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "RUL_SENTINEL_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "rul_sentinel.toml";

// ============================================================================
// Config Provenance
// ============================================================================

/// Tracks which configuration keys were explicitly present in the TOML file.
///
/// After deserialization every `#[serde(default)]` field has a value whether
/// or not the operator wrote it. This keeps that distinction, so startup can
/// tell a chosen threshold scale apart from the built-in one.
#[derive(Debug, Clone, Default)]
pub struct ConfigProvenance {
    /// Dotted key paths explicitly present in the TOML file
    pub explicit_keys: HashSet<String>,
}

impl ConfigProvenance {
    /// Check whether a dotted key path was explicitly set.
    ///
    /// Example: `provenance.is_user_set("alerts.scale")`
    pub fn is_user_set(&self, dotted_key: &str) -> bool {
        self.explicit_keys.contains(dotted_key)
    }
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a pipeline deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Default subject (asset) for CLI runs
    #[serde(default)]
    pub subject: SubjectConfig,

    /// Prediction service location and transport
    #[serde(default)]
    pub service: ServiceConfig,

    /// Batch sizing
    #[serde(default)]
    pub batch: BatchConfig,

    /// Alert thresholds
    #[serde(default)]
    pub alerts: AlertConfig,

    /// Extra header spellings per canonical field
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,

    /// Record store
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP server
    #[serde(default)]
    pub server: ServerConfig,
}

impl PipelineConfig {
    /// Load configuration using the standard search order.
    pub fn load() -> Self {
        Self::load_with_provenance().0
    }

    /// Load configuration using the standard search order, returning provenance.
    ///
    /// 1. `$RUL_SENTINEL_CONFIG`
    /// 2. `./rul_sentinel.toml`
    /// 3. Built-in defaults
    pub fn load_with_provenance() -> (Self, ConfigProvenance) {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file_with_provenance(&p) {
                    Ok((config, provenance)) => {
                        info!(path = %p.display(), "Loaded pipeline config from {}", CONFIG_ENV_VAR);
                        return (config, provenance);
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file_with_provenance(&local) {
                Ok((config, provenance)) => {
                    info!("Loaded pipeline config from ./{}", LOCAL_CONFIG_FILE);
                    return (config, provenance);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        (Self::default(), ConfigProvenance::default())
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let (config, _provenance) = Self::load_from_file_with_provenance(path)?;
        Ok(config)
    }

    /// Load from a specific TOML file path, also returning provenance.
    pub fn load_from_file_with_provenance(
        path: &Path,
    ) -> Result<(Self, ConfigProvenance), ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys only produce warnings; invalid values are errors.
    pub fn from_toml_str(contents: &str) -> Result<(Self, ConfigProvenance), ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let provenance = ConfigProvenance {
            explicit_keys: super::validation::walk_toml_keys(
                &contents
                    .parse::<toml::Value>()
                    .unwrap_or_else(|_| toml::Value::Table(toml::map::Map::new())),
                "",
            )
            .into_iter()
            .collect(),
        };

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok((config, provenance))
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate values for internal consistency.
    ///
    /// Rules:
    /// - thresholds finite, positive, and `critical < warning`
    /// - `batch_size` within `1..=MAX_BATCH_SIZE`
    /// - `timeout_secs > 0`
    /// - `adjustment_factor` finite and positive
    /// - alias keys name a canonical field, alias spellings are non-blank
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let t = self.alerts.thresholds();
        if !t.critical.is_finite() || !t.warning.is_finite() {
            errors.push(format!(
                "alerts: thresholds must be finite (got critical={}, warning={})",
                t.critical, t.warning
            ));
        } else {
            if t.critical <= 0.0 {
                errors.push(format!(
                    "alerts.critical_threshold ({:.1}) must be > 0",
                    t.critical
                ));
            }
            if t.critical >= t.warning {
                errors.push(format!(
                    "alerts.critical_threshold ({:.1}) must be less than warning_threshold ({:.1})",
                    t.critical, t.warning
                ));
            }
        }

        let factor = self.alerts.adjustment_factor;
        if !factor.is_finite() || factor <= 0.0 {
            errors.push(format!(
                "alerts.adjustment_factor ({factor}) must be a finite number > 0"
            ));
        }

        if self.batch.batch_size == 0 || self.batch.batch_size > defaults::MAX_BATCH_SIZE {
            errors.push(format!(
                "batch.batch_size ({}) must be between 1 and {}",
                self.batch.batch_size,
                defaults::MAX_BATCH_SIZE
            ));
        }

        if self.service.timeout_secs == 0 {
            errors.push("service.timeout_secs must be > 0".to_string());
        }
        if self.service.base_url.trim().is_empty() {
            errors.push("service.base_url must not be empty".to_string());
        }

        for (field, spellings) in &self.aliases {
            if CanonicalField::from_name(field).is_none() {
                errors.push(format!(
                    "aliases.{field}: unknown canonical field (expected one of: {})",
                    CanonicalField::ALL
                        .iter()
                        .map(|f| f.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
            if spellings.iter().any(|s| s.trim().is_empty()) {
                errors.push(format!("aliases.{field}: alias spellings must not be blank"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Extra alias spellings keyed by canonical field, skipping unknown keys.
    pub fn extra_aliases(&self) -> Vec<(CanonicalField, String)> {
        self.aliases
            .iter()
            .filter_map(|(name, spellings)| {
                CanonicalField::from_name(name).map(|field| (field, spellings))
            })
            .flat_map(|(field, spellings)| spellings.iter().map(move |s| (field, s.clone())))
            .collect()
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Subject
// ============================================================================

/// Default subject for CLI runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectConfig {
    /// Asset identifier used when `--asset-id` is not given
    #[serde(default)]
    pub asset_id: String,
}

// ============================================================================
// Prediction Service
// ============================================================================

/// Where and how to reach the prediction service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL, e.g. `http://model:8000`
    #[serde(default = "default_service_url")]
    pub base_url: String,

    /// Bounded wait for each request (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Which bulk endpoint to call
    #[serde(default)]
    pub mode: ProcessingMode,
}

fn default_service_url() -> String {
    defaults::DEFAULT_SERVICE_URL.to_string()
}
fn default_timeout_secs() -> u64 {
    defaults::DEFAULT_TIMEOUT_SECS
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_service_url(),
            timeout_secs: default_timeout_secs(),
            mode: ProcessingMode::default(),
        }
    }
}

// ============================================================================
// Batch
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Sequences per bulk request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    defaults::DEFAULT_BATCH_SIZE
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

// ============================================================================
// Alerts
// ============================================================================

/// Unit scale the thresholds are expressed in.
///
/// The two presets are incompatible; picking one is an operator decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdScale {
    /// Raw model output units (critical 20 000, warning 60 000)
    #[default]
    Absolute,
    /// Hour-equivalents (critical 168, warning 720)
    Hours,
}

impl ThresholdScale {
    /// Built-in thresholds for this scale.
    pub const fn preset(self) -> AlertThresholds {
        match self {
            Self::Absolute => AlertThresholds {
                critical: defaults::ABSOLUTE_CRITICAL_RUL,
                warning: defaults::ABSOLUTE_WARNING_RUL,
            },
            Self::Hours => AlertThresholds {
                critical: defaults::HOURS_CRITICAL_RUL,
                warning: defaults::HOURS_WARNING_RUL,
            },
        }
    }
}

impl std::fmt::Display for ThresholdScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absolute => write!(f, "absolute"),
            Self::Hours => write!(f, "hours"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Preset the thresholds fall back to
    #[serde(default)]
    pub scale: ThresholdScale,

    /// Overrides the preset's critical cutoff
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_threshold: Option<f64>,

    /// Overrides the preset's warning cutoff
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning_threshold: Option<f64>,

    /// Multiplier applied to each RUL before classification
    #[serde(default = "default_adjustment_factor")]
    pub adjustment_factor: f64,
}

fn default_adjustment_factor() -> f64 {
    1.0
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            scale: ThresholdScale::default(),
            critical_threshold: None,
            warning_threshold: None,
            adjustment_factor: default_adjustment_factor(),
        }
    }
}

impl AlertConfig {
    /// Effective thresholds: explicit values win over the scale preset.
    pub fn thresholds(&self) -> AlertThresholds {
        let preset = self.scale.preset();
        AlertThresholds {
            critical: self.critical_threshold.unwrap_or(preset.critical),
            warning: self.warning_threshold.unwrap_or(preset.warning),
        }
    }
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Persist predictions and alerts to sled
    #[serde(default = "default_storage_enabled")]
    pub enabled: bool,

    /// sled database directory
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_storage_enabled() -> bool {
    true
}
fn default_store_path() -> String {
    defaults::DEFAULT_STORE_PATH.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: default_storage_enabled(),
            path: default_store_path(),
        }
    }
}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP API
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String {
    defaults::DEFAULT_SERVER_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}
