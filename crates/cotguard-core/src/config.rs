//! Configuration for the cotguard codec.
//!
//! Supports:
//! - Loading from YAML files
//! - Environment variable overrides (`COTGUARD__SECTION__FIELD`)
//! - Validation of limits and validation windows

use crate::error::{ConfigError, Result};
use crate::limits::{
    DEFAULT_MAX_ATTRIBUTES, DEFAULT_MAX_DEPTH, DEFAULT_MAX_DOCUMENT_SIZE, DEFAULT_MAX_ELEMENT_COUNT,
    DEFAULT_MAX_TOKEN_LEN, DEFAULT_MAX_VALUE_LEN, MIN_ATTRIBUTES, MIN_DEPTH, MIN_DOCUMENT_SIZE,
    MIN_ELEMENT_COUNT, MIN_TOKEN_LEN, MIN_VALUE_LEN,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The only event version the codec accepts.
pub const SUPPORTED_VERSION: &str = "2.0";

/// Root configuration for a codec instance.
///
/// # Examples
///
/// ```
/// use cotguard_core::config::CodecConfig;
///
/// let config = CodecConfig::from_yaml("limits:\n  max_depth: 16\n").unwrap();
/// assert_eq!(config.limits.max_depth, 16);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Token stream ceilings
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Event validation policy
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Extra type catalog sources
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl CodecConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Loads configuration using the `config` crate: the file, then
    /// `COTGUARD__*` environment overrides.
    pub fn from_config_builder<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = config::Config::builder()
            .add_source(config::File::from(path).required(true))
            .add_source(
                config::Environment::with_prefix("COTGUARD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        config.try_deserialize().map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Validates the configuration.
    ///
    /// Limits below their floors are rejected here rather than silently
    /// clamped, so a typo in a config file is visible.
    pub fn validate(&self) -> Result<()> {
        self.limits.validate()?;
        self.validation.validate()?;
        Ok(())
    }
}

/// Token stream ceilings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_document_size")]
    pub max_document_size: usize,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default = "default_max_element_count")]
    pub max_element_count: usize,

    #[serde(default = "default_max_token_len")]
    pub max_token_len: usize,

    #[serde(default = "default_max_value_len")]
    pub max_value_len: usize,

    #[serde(default = "default_max_attributes")]
    pub max_attributes: usize,
}

impl LimitsConfig {
    fn validate(&self) -> Result<()> {
        let checks = [
            ("limits.max_document_size", self.max_document_size, MIN_DOCUMENT_SIZE),
            ("limits.max_depth", self.max_depth, MIN_DEPTH),
            ("limits.max_element_count", self.max_element_count, MIN_ELEMENT_COUNT),
            ("limits.max_token_len", self.max_token_len, MIN_TOKEN_LEN),
            ("limits.max_value_len", self.max_value_len, MIN_VALUE_LEN),
            ("limits.max_attributes", self.max_attributes, MIN_ATTRIBUTES),
        ];
        for (field, value, floor) in checks {
            if value < floor {
                return Err(ConfigError::invalid_value(
                    field,
                    format!("{} is below the minimum of {}", value, floor),
                )
                .into());
            }
        }
        Ok(())
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_document_size: default_max_document_size(),
            max_depth: default_max_depth(),
            max_element_count: default_max_element_count(),
            max_token_len: default_max_token_len(),
            max_value_len: default_max_value_len(),
            max_attributes: default_max_attributes(),
        }
    }
}

/// Event validation policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Required event version
    #[serde(default = "default_version")]
    pub version: String,

    /// Minimum distance between time and stale
    #[serde(default = "default_min_stale_offset", with = "duration_secs")]
    pub min_stale_offset: Duration,

    /// Maximum distance between time and stale
    #[serde(default = "default_max_stale_offset", with = "duration_secs")]
    pub max_stale_offset: Duration,

    /// How far time may be from the validating clock in either direction
    #[serde(default = "default_clock_window", with = "duration_secs")]
    pub clock_window: Duration,
}

impl ValidationConfig {
    fn validate(&self) -> Result<()> {
        if self.version.is_empty() {
            return Err(ConfigError::invalid_value("validation.version", "must not be empty").into());
        }
        if self.min_stale_offset > self.max_stale_offset {
            return Err(ConfigError::invalid_value(
                "validation.min_stale_offset",
                "must not exceed max_stale_offset",
            )
            .into());
        }
        if self.clock_window.is_zero() {
            return Err(
                ConfigError::invalid_value("validation.clock_window", "must be positive").into(),
            );
        }
        Ok(())
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            min_stale_offset: default_min_stale_offset(),
            max_stale_offset: default_max_stale_offset(),
            clock_window: default_clock_window(),
        }
    }
}

/// Additional type datasets loaded after the bundled ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Dataset files, loaded in order; later files win on conflicts
    #[serde(default)]
    pub extra_sources: Vec<PathBuf>,
}

fn default_max_document_size() -> usize {
    DEFAULT_MAX_DOCUMENT_SIZE
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_max_element_count() -> usize {
    DEFAULT_MAX_ELEMENT_COUNT
}

fn default_max_token_len() -> usize {
    DEFAULT_MAX_TOKEN_LEN
}

fn default_max_value_len() -> usize {
    DEFAULT_MAX_VALUE_LEN
}

fn default_max_attributes() -> usize {
    DEFAULT_MAX_ATTRIBUTES
}

fn default_version() -> String {
    SUPPORTED_VERSION.to_string()
}

fn default_min_stale_offset() -> Duration {
    Duration::from_secs(5)
}

fn default_max_stale_offset() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}

fn default_clock_window() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

/// Serde helper for durations expressed as whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
