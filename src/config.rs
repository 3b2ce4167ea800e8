//! Bridge configuration module.
//!
//! Handles loading, validating, and merging `imgbridge.toml`. Stock defaults
//! form the base layer; a user file overrides any subset of keys on top.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [encoding]
//! jpeg_quality = 80             # JPEG output quality (1-100)
//!
//! [resources]
//! bundle_dir = "assets"         # Root searched for `bundle:` inputs
//! extensions = ["png", "jpg", "jpeg"]
//!
//! [processing]
//! max_processes = 4             # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse. Override just the values you want:
//!
//! ```toml
//! [encoding]
//! jpeg_quality = 92
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "imgbridge.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Bridge configuration loaded from `imgbridge.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Output encoding settings.
    pub encoding: EncodingConfig,
    /// Bundle resource lookup.
    pub resources: ResourcesConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl BridgeConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.encoding.jpeg_quality) {
            return Err(ConfigError::Validation(
                "encoding.jpeg_quality must be 1-100".into(),
            ));
        }
        if self.resources.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "resources.extensions must not be empty".into(),
            ));
        }
        if let Some(bad) = self
            .resources
            .extensions
            .iter()
            .find(|ext| ext.is_empty() || ext.starts_with('.'))
        {
            return Err(ConfigError::Validation(format!(
                "resources.extensions entries must be bare extensions, got {bad:?}"
            )));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncodingConfig {
    pub jpeg_quality: u32,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self { jpeg_quality: 80 }
    }
}

/// Where `bundle:` inputs are resolved from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourcesConfig {
    /// Directory searched for bundled resources. Relative paths resolve
    /// against the working directory.
    pub bundle_dir: PathBuf,
    /// Extensions tried, in order, when a bundle name has none.
    pub extensions: Vec<String>,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            bundle_dir: PathBuf::from("assets"),
            extensions: vec!["png".into(), "jpg".into(), "jpeg".into()],
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel request workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(BridgeConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<BridgeConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: BridgeConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to stock defaults if it is absent.
pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    resolve_config(stock_defaults_value(), load_raw_config(path)?)
}

/// Returns a fully-commented stock `imgbridge.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# imgbridge Configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Output encoding
# ---------------------------------------------------------------------------
[encoding]
# JPEG quality for .jpg/.jpeg outputs (1 = smallest, 100 = best).
# PNG, TIFF, BMP and WebP outputs are lossless and ignore this.
jpeg_quality = 80

# ---------------------------------------------------------------------------
# Bundled resources
# ---------------------------------------------------------------------------
[resources]
# Inputs written as `bundle:name` or `bundle:name.ext` are looked up here.
bundle_dir = "assets"

# Extensions tried in order when a bundle name has no extension.
extensions = ["png", "jpg", "jpeg"]

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel request workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
