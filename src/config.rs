//! Layered configuration.
//!
//! Defaults, then an optional TOML file, then environment variables win, in
//! that order. Environment variables are prefixed `CI_` and use double
//! underscores for nesting: `CI_INDEXING__CLEANUP_THRESHOLD=50` sets
//! `indexing.cleanup_threshold`.
//!
//! The propagation rule-set is part of the settings and round-trips through
//! serde; validation runs on load and rejects out-of-range thresholds and
//! malformed custom rules as fatal configuration errors.

use crate::context::ContextConfig;
use crate::effects::SideEffectConfig;
use crate::error::{IndexError, IndexResult};
use crate::propagate::PropagationConfig;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema.
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub propagation: PropagationConfig,

    #[serde(default)]
    pub effects: SideEffectConfig,

    #[serde(default)]
    pub context: ContextConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for every module.
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `tracker = "debug"`.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct IndexingConfig {
    /// Deferred trigram cleanup threshold.
    #[serde(default = "default_cleanup_threshold")]
    pub cleanup_threshold: usize,

    /// Include test files in the index.
    #[serde(default = "default_true")]
    pub include_tests: bool,
}

fn default_version() -> u32 {
    1
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_cleanup_threshold() -> usize {
    crate::trigram::DEFAULT_CLEANUP_THRESHOLD
}
fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            logging: LoggingConfig::default(),
            indexing: IndexingConfig::default(),
            propagation: PropagationConfig::default(),
            effects: SideEffectConfig::default(),
            context: ContextConfig::standard(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            cleanup_threshold: default_cleanup_threshold(),
            include_tests: true,
        }
    }
}

impl Settings {
    /// Defaults merged with an optional TOML file and `CI_` env overrides.
    pub fn load(config_path: Option<&Path>) -> IndexResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        let settings: Settings = figment
            .merge(Env::prefixed("CI_").split("__"))
            .extract()
            .map_err(|e| IndexError::ConfigError {
                reason: e.to_string(),
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> IndexResult<()> {
        self.propagation
            .validate()
            .map_err(|e| IndexError::ConfigError {
                reason: e.to_string(),
            })?;
        if self.effects.decay_factor <= 0.0 || self.effects.decay_factor > 1.0 {
            return Err(IndexError::ConfigError {
                reason: format!(
                    "effects.decay_factor {} is outside (0, 1]",
                    self.effects.decay_factor
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.effects.min_confidence) {
            return Err(IndexError::ConfigError {
                reason: format!(
                    "effects.min_confidence {} is outside [0, 1]",
                    self.effects.min_confidence
                ),
            });
        }
        if self.indexing.cleanup_threshold == 0 {
            return Err(IndexError::ConfigError {
                reason: "indexing.cleanup_threshold must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
