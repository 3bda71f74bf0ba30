//! Run configuration module.
//!
//! Handles loading, validating, and merging `wallfit.toml`. Stock defaults
//! are the base layer; the user file only needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [upscale]
//! mode = "auto"                  # auto | upscale2x | upscale4x | aurasr | usdu | none
//! enabled_buckets = [0, 1, 2, 3] # Buckets base images exist for
//!
//! [methods.usdu]                 # Strategy table entries, one per method
//! scale = "variable"             # "variable" or { fixed = N }
//! max_factor = 4.0
//! cost = "expensive"             # free | cheap | expensive
//!
//! [output]
//! quality = 95                   # JPEG quality of finals (1-100)
//!
//! [dispatch]
//! concurrency = 1                # Parallel enlargements per method group
//! max_attempts = 2               # Attempts per enlargement, including the first
//!
//! [processing]
//! max_processes = 4              # Finalization workers (omit for auto = CPU cores)
//!
//! [retention]
//! intermediates = "keep"         # keep | delete
//!
//! [[devices]]
//! id = "iphone-15-pro"
//! width = 1179
//! height = 2556
//! ```
//!
//! ## Partial Configuration
//!
//! Tables merge key by key, so a single override is enough:
//!
//! ```toml
//! [methods.upscale2x]
//! max_factor = 2.5
//! ```
//!
//! Arrays (`enabled_buckets`, `[[devices]]`) replace the stock value whole.
//! Unknown keys are rejected to catch typos early.

use crate::bucket::Bucket;
use crate::device::Device;
use crate::dispatch::DispatchOptions;
use crate::imaging::Quality;
use crate::method::{MAX_FIXED_SCALE, Method, MethodSpec, MethodTable, Scale};
use crate::plan::UpscaleMode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Run configuration loaded from `wallfit.toml`.
///
/// All fields have sensible defaults. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WallfitConfig {
    /// Method selection and enabled buckets.
    pub upscale: UpscaleConfig,
    /// Strategy table, one entry per method.
    pub methods: BTreeMap<Method, MethodSpec>,
    /// Final image encoding.
    pub output: OutputConfig,
    /// Enlargement batch settings.
    pub dispatch: DispatchConfig,
    /// Parallel finalization settings.
    pub processing: ProcessingConfig,
    /// What happens to intermediates after a run.
    pub retention: RetentionConfig,
    /// Target screens, in output order.
    pub devices: Vec<Device>,
}

impl Default for WallfitConfig {
    fn default() -> Self {
        let table = MethodTable::stock();
        Self {
            upscale: UpscaleConfig::default(),
            methods: Method::ALL.into_iter().map(|m| (m, table.get(m))).collect(),
            output: OutputConfig::default(),
            dispatch: DispatchConfig::default(),
            processing: ProcessingConfig::default(),
            retention: RetentionConfig::default(),
            devices: default_devices(),
        }
    }
}

fn default_devices() -> Vec<Device> {
    vec![
        Device::new("iphone-15-pro", 1179, 2556),
        Device::new("ipad-air", 1640, 2360),
        Device::new("macbook-pro", 3024, 1964),
        Device::new("ultrawide", 3440, 1440),
        Device::new("uhd-tv", 3840, 2160),
    ]
}

impl WallfitConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output.quality == 0 || self.output.quality > 100 {
            return Err(ConfigError::Validation(
                "output.quality must be 1-100".into(),
            ));
        }
        if self.dispatch.concurrency == 0 {
            return Err(ConfigError::Validation(
                "dispatch.concurrency must be at least 1".into(),
            ));
        }
        if self.dispatch.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "dispatch.max_attempts must be at least 1".into(),
            ));
        }
        if self.upscale.enabled_buckets.is_empty() {
            return Err(ConfigError::Validation(
                "upscale.enabled_buckets must not be empty".into(),
            ));
        }
        for (method, spec) in &self.methods {
            if !spec.max_factor.is_finite() || spec.max_factor < 1.0 {
                return Err(ConfigError::Validation(format!(
                    "methods.{method}.max_factor must be a number >= 1"
                )));
            }
            if let Scale::Fixed(n) = spec.scale
                && !(1..=MAX_FIXED_SCALE).contains(&n)
            {
                return Err(ConfigError::Validation(format!(
                    "methods.{method}.scale must be 1-{MAX_FIXED_SCALE}"
                )));
            }
        }
        let mut seen = HashSet::new();
        for device in &self.devices {
            device.validate().map_err(ConfigError::Validation)?;
            if !seen.insert(device.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate device id '{}'",
                    device.id
                )));
            }
        }
        Ok(())
    }

    /// The strategy table with this config's entries.
    pub fn method_table(&self) -> MethodTable {
        MethodTable::with_overrides(&self.methods)
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            concurrency: self.dispatch.concurrency,
            max_attempts: self.dispatch.max_attempts,
        }
    }

    pub fn quality(&self) -> Quality {
        Quality::new(self.output.quality)
    }
}

/// Method selection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpscaleConfig {
    pub mode: UpscaleMode,
    /// Buckets for which base images are generated. Devices in other
    /// buckets are reported and skipped.
    pub enabled_buckets: Vec<Bucket>,
}

impl Default for UpscaleConfig {
    fn default() -> Self {
        Self {
            mode: UpscaleMode::Auto,
            enabled_buckets: Bucket::ALL.to_vec(),
        }
    }
}

/// Final image encoding settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub quality: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { quality: 95 }
    }
}

/// Enlargement batch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    pub concurrency: usize,
    pub max_attempts: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        let options = DispatchOptions::default();
        Self {
            concurrency: options.concurrency,
            max_attempts: options.max_attempts,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel finalization workers.
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

/// Intermediate artifact policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Retention {
    /// Leave base and enlarged images in place.
    #[default]
    Keep,
    /// Remove them once every final of their content id exists.
    Delete,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetentionConfig {
    pub intermediates: Retention,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(WallfitConfig::default())?)
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

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
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
) -> Result<WallfitConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: WallfitConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the file at `path`.
///
/// A missing file yields the stock configuration. Otherwise user values are
/// merged on top of stock defaults, unknown keys are rejected and the result
/// is validated.
pub fn load_config(path: &Path) -> Result<WallfitConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `wallfit.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# wallfit Configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Tables merge key by key with these defaults, so an override only needs
# the keys it changes. Arrays ([[devices]], enabled_buckets) replace the
# default list entirely. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Upscale strategy
# ---------------------------------------------------------------------------
[upscale]
# How enlargement methods are picked:
#   "auto"      - upscale2x up to its max_factor, aurasr beyond
#   "upscale2x", "upscale4x", "aurasr", "usdu"
#               - every device uses that method
#   "none"      - no enlargement; finals are cut straight from base images
mode = "auto"

# Buckets with base images. 0 = 896x1920, 1 = 1088x1472,
# 2 = 1536x1024, 3 = 1728x960. Devices mapping to a bucket not listed
# here are skipped with an error.
enabled_buckets = [0, 1, 2, 3]

# ---------------------------------------------------------------------------
# Method strategy table
# ---------------------------------------------------------------------------
# scale:      { fixed = N } always magnifies by N; "variable" follows
#             the device factor up to max_factor.
# max_factor: devices needing more than this get a forced-magnification
#             warning (the final is still produced).
# cost:       "free", "cheap" or "expensive" (informational).

[methods.upscale2x]
scale = { fixed = 2 }
max_factor = 2.0
cost = "cheap"

[methods.upscale4x]
scale = { fixed = 4 }
max_factor = 4.0
cost = "cheap"

[methods.aurasr]
scale = { fixed = 4 }
max_factor = 4.0
cost = "cheap"

[methods.usdu]
scale = "variable"
max_factor = 4.0
cost = "expensive"

[methods.none]
scale = { fixed = 1 }
max_factor = 1.0
cost = "free"

# ---------------------------------------------------------------------------
# Final images
# ---------------------------------------------------------------------------
[output]
# JPEG quality (1-100).
quality = 95

# ---------------------------------------------------------------------------
# Enlargement dispatch
# ---------------------------------------------------------------------------
[dispatch]
# Enlargements running at once within one method group.
concurrency = 1
# Attempts per enlargement before it is recorded as failed.
max_attempts = 2

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel finalization workers. Omit to use all CPU cores.
# Values above the core count are clamped down.
# max_processes = 4

# ---------------------------------------------------------------------------
# Retention
# ---------------------------------------------------------------------------
[retention]
# "keep" leaves base and enlarged images in the output directory.
# "delete" removes them once every final of their content id exists.
intermediates = "keep"

# ---------------------------------------------------------------------------
# Device table
# ---------------------------------------------------------------------------
# id: letters, digits, '-', '_' and '.'; must not start with "base_" or
# "upscaled_". Finals are written as {seq}_{batch}_{id}.jpg.

[[devices]]
id = "iphone-15-pro"
width = 1179
height = 2556

[[devices]]
id = "ipad-air"
width = 1640
height = 2360

[[devices]]
id = "macbook-pro"
width = 3024
height = 1964

[[devices]]
id = "ultrawide"
width = 3440
height = 1440

[[devices]]
id = "uhd-tv"
width = 3840
height = 2160
"##
}
