//! Loader configuration module.
//!
//! Handles loading and validating the TOML file passed with `--config`.
//! Without a file, stock defaults apply.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [encoding]
//! lossy_quality = 90        # JPEG quality (1-100)
//! lossless_ratio = 2.0      # Keep PNG while png_size < jpeg_size * ratio
//!
//! [network]
//! timeout_secs = 30         # Whole-request timeout for HTTP fetches
//! user_agent = "image-loader/<version>"
//!
//! [cache]
//! dir = ".image-loader-cache"
//! enabled = true            # false: use an in-memory cache for this run only
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse. Override just the values you want:
//!
//! ```toml
//! [encoding]
//! lossy_quality = 75
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{EncodePolicy, Quality};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Loader configuration.
///
/// All fields have sensible defaults. Config files need only specify the
/// values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    /// Lossless/lossy selection policy.
    pub encoding: EncodingConfig,
    /// HTTP client settings.
    pub network: NetworkConfig,
    /// Persistent cache location.
    pub cache: CacheConfig,
}

impl LoaderConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.encoding.lossy_quality) {
            return Err(ConfigError::Validation(
                "encoding.lossy_quality must be 1-100".into(),
            ));
        }
        if !(self.encoding.lossless_ratio.is_finite() && self.encoding.lossless_ratio > 0.0) {
            return Err(ConfigError::Validation(
                "encoding.lossless_ratio must be a positive number".into(),
            ));
        }
        if self.network.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "network.timeout_secs must be non-zero".into(),
            ));
        }
        if self.cache.enabled && self.cache.dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "cache.dir must not be empty when the cache is enabled".into(),
            ));
        }
        Ok(())
    }

    pub fn encode_policy(&self) -> EncodePolicy {
        EncodePolicy {
            lossy_quality: Quality::new(self.encoding.lossy_quality),
            lossless_ratio: self.encoding.lossless_ratio,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodingConfig {
    pub lossy_quality: u8,
    pub lossless_ratio: f64,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            lossy_quality: 90,
            lossless_ratio: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: default_user_agent(),
        }
    }
}

fn default_user_agent() -> String {
    concat!("image-loader/", env!("CARGO_PKG_VERSION")).to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".image-loader-cache"),
            enabled: true,
        }
    }
}

// =============================================================================
// Config loading
// =============================================================================

/// Parse and validate config from a TOML string.
pub fn parse_config(content: &str) -> Result<LoaderConfig, ConfigError> {
    let config: LoaderConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load config from a TOML file. A missing file is an error.
pub fn load_config(path: &Path) -> Result<LoaderConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> String {
    format!(
        r##"# Image Loader Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Encoding
# ---------------------------------------------------------------------------
# Every rendered image is encoded both as PNG (lossless) and as JPEG.
# PNG is kept while png_size < jpeg_size * lossless_ratio.
[encoding]
# JPEG quality (1-100).
lossy_quality = 90
# Higher values favor PNG. Must be positive.
lossless_ratio = 2.0

# ---------------------------------------------------------------------------
# Network
# ---------------------------------------------------------------------------
[network]
# Whole-request timeout for HTTP fetches, in seconds. Must be non-zero.
timeout_secs = 30
user_agent = "{user_agent}"

# ---------------------------------------------------------------------------
# Cache
# ---------------------------------------------------------------------------
# Rendered images are cached on disk, keyed by source and transform.
# With enabled = false an in-memory cache is used for the current run only.
[cache]
dir = ".image-loader-cache"
enabled = true
"##,
        user_agent = default_user_agent()
    )
}
