//! # Runner configuration
//!
//! ## Responsibility
//! Parse and validate the TOML configuration for a runner instance: engine
//! cycle settings, analysis thresholds, persistence location, and the
//! observability toggle. Every field has a documented default, so an empty
//! file (or no file) yields a working configuration.
//!
//! ## Guarantees
//! - A successfully loaded config is always validated
//! - I/O, parse, and validation errors are distinguished in the error type
//! - The file path is included in every error message
//! - The debug toggle changes log volume only, never behavior
//!
//! ## NOT Responsible For
//! - Building the runtime components from config (binaries own that)
//! - Hot-reloading on file changes (config is read once at startup)

use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::EngineConfig;
use crate::reflection::AnalysisConfig;

// ── Errors ────────────────────────────────────────────────────────────────

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config '{file}'")]
    Io {
        /// The file path.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file was not valid TOML.
    #[error("failed to parse config '{file}'")]
    Parse {
        /// The file path or source name.
        file: String,
        /// Underlying parse error.
        #[source]
        source: toml::de::Error,
    },

    /// A semantic constraint was violated.
    #[error("invalid config: {field}: {reason}")]
    Validation {
        /// The offending field.
        field: String,
        /// What was wrong with it.
        reason: String,
    },
}

// ── Sections ──────────────────────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// Where snapshots are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PersistenceSection {
    /// Directory for catalog and performance snapshot files.
    pub data_dir: PathBuf,
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Logging volume controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ObservabilitySection {
    /// Raise per-component log volume. Behavior is unchanged.
    pub debug: bool,
}

// ── Top-level config ──────────────────────────────────────────────────────

/// Root configuration for a runner instance.
///
/// # Example
///
/// ```toml
/// [engine]
/// cycle_interval_ms = 60000
///
/// [analysis]
/// slow_task_threshold_secs = 1.0
/// min_success_rate = 0.8
///
/// [persistence]
/// data_dir = "data"
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RunnerConfig {
    /// Execution engine settings.
    pub engine: EngineConfig,
    /// Self-reflection thresholds and analysis parameters.
    pub analysis: AnalysisConfig,
    /// Snapshot persistence settings.
    pub persistence: PersistenceSection,
    /// Observability toggles.
    pub observability: ObservabilitySection,
}

impl RunnerConfig {
    /// Check semantic constraints the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.cycle_interval_ms == 0 {
            return Err(ConfigError::Validation {
                field: "engine.cycle_interval_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.analysis.min_success_rate) {
            return Err(ConfigError::Validation {
                field: "analysis.min_success_rate".to_string(),
                reason: "must be within [0.0, 1.0]".to_string(),
            });
        }
        if self.analysis.slow_task_threshold_secs < 0.0 {
            return Err(ConfigError::Validation {
                field: "analysis.slow_task_threshold_secs".to_string(),
                reason: "must be non-negative".to_string(),
            });
        }
        if self.analysis.anomaly_z_threshold <= 0.0 {
            return Err(ConfigError::Validation {
                field: "analysis.anomaly_z_threshold".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.analysis.smoothing_alpha)
            || self.analysis.smoothing_alpha == 0.0
        {
            return Err(ConfigError::Validation {
                field: "analysis.smoothing_alpha".to_string(),
                reason: "must be within (0.0, 1.0]".to_string(),
            });
        }
        if self.analysis.max_history == 0 {
            return Err(ConfigError::Validation {
                field: "analysis.max_history".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

// ── Loaders ───────────────────────────────────────────────────────────────

/// Load a [`RunnerConfig`] from a TOML file, validating it.
///
/// # Errors
///
/// - [`ConfigError::Io`] if the file cannot be read.
/// - [`ConfigError::Parse`] if the TOML is malformed.
/// - [`ConfigError::Validation`] if semantic constraints are violated.
pub fn load_from_file(path: &Path) -> Result<RunnerConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        file: path.display().to_string(),
        source,
    })?;
    load_from_str(&content, &path.display().to_string())
}

/// Load a [`RunnerConfig`] from a TOML string, validating it.
///
/// `source_name` identifies the source in error messages.
///
/// # Errors
///
/// - [`ConfigError::Parse`] if the TOML is malformed.
/// - [`ConfigError::Validation`] if semantic constraints are violated.
pub fn load_from_str(content: &str, source_name: &str) -> Result<RunnerConfig, ConfigError> {
    let config: RunnerConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
        file: source_name.to_string(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}
