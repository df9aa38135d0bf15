//! Configuration management for rate-limit annotation processing.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Prefix of environment variables overriding file settings.
///
/// Nested keys are separated by a double underscore, e.g.
/// `RATELIMIT_MAPS__DIR=/etc/haproxy/maps`.
pub const ENV_PREFIX: &str = "RATELIMIT";

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Map storage configuration
    #[serde(default)]
    pub maps: MapsConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Map storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapsConfig {
    /// Directory whitelist maps are written to
    #[serde(default = "default_maps_dir")]
    pub dir: PathBuf,
}

impl Default for MapsConfig {
    fn default() -> Self {
        Self {
            dir: default_maps_dir(),
        }
    }
}

fn default_maps_dir() -> PathBuf {
    PathBuf::from("/etc/haproxy/maps")
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Fail period, size and status-code annotations that arrive before
    /// rate-limit-requests instead of skipping them
    #[serde(default)]
    pub strict_prerequisites: bool,

    /// Status returned to limited clients when no status-code annotation is set
    #[serde(default = "default_status_code")]
    pub default_status_code: u16,

    /// Table size used when no size annotation is set
    #[serde(default = "default_table_size")]
    pub default_table_size: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            strict_prerequisites: false,
            default_status_code: default_status_code(),
            default_table_size: default_table_size(),
        }
    }
}

fn default_status_code() -> u16 {
    403
}

fn default_table_size() -> u64 {
    100 * 1024
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

impl Settings {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load configuration from an optional file, then apply environment
    /// overrides (see [`ENV_PREFIX`]).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::Config(e.to_string()))
    }
}
