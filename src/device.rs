//! Device table resolution.
//!
//! Turns the configured device table into per-device [`DeviceAssignment`]s:
//! which bucket the device's wallpapers are cut from and how much that
//! bucket's base image must be magnified to cover the device screen.
//!
//! Resolution is a pure planning step. A device whose bucket is not enabled
//! for this run is reported as a [`MissingBucketError`] rather than silently
//! falling back to a neighbouring bucket, which would distort its aspect ratio.

use crate::bucket::{Bucket, classify};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Artifact-name markers a device id must not start with, so final
/// filenames never collide with base or enlarged ones.
pub const RESERVED_PREFIXES: &[&str] = &["base_", "upscaled_"];

/// A target screen from the device table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Device {
    pub id: String,
    pub width: u32,
    pub height: u32,
}

impl Device {
    pub fn new(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
        }
    }

    /// Check the id and dimensions are usable; returns a description of the
    /// first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("device id must not be empty".into());
        }
        if let Some(c) = self
            .id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(format!(
                "device id '{}' contains '{c}' (allowed: A-Z a-z 0-9 - _ .)",
                self.id
            ));
        }
        if let Some(prefix) = RESERVED_PREFIXES.iter().find(|p| self.id.starts_with(**p)) {
            return Err(format!(
                "device id '{}' must not start with '{prefix}'",
                self.id
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "device '{}' has zero dimension {}x{}",
                self.id, self.width, self.height
            ));
        }
        Ok(())
    }
}

/// A device together with the bucket it draws from and the magnification the
/// bucket's base image needs to cover it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceAssignment {
    pub device: Device,
    pub bucket: Bucket,
    /// `max(device.width / bucket.width, device.height / bucket.height)`.
    pub factor: f64,
}

/// A device maps to a bucket that this run does not have enabled.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("device '{device_id}' needs {bucket}, which is not enabled for this run; generate it first")]
pub struct MissingBucketError {
    pub device_id: String,
    pub bucket: Bucket,
}

/// Outcome of resolving a whole device table.
#[derive(Debug, Clone, Default)]
pub struct Resolved {
    /// Assignments in device-table order.
    pub assignments: Vec<DeviceAssignment>,
    /// Devices that could not be assigned.
    pub missing: Vec<MissingBucketError>,
}

impl Resolved {
    /// Distinct buckets used by the resolved assignments, ascending.
    pub fn buckets(&self) -> Vec<Bucket> {
        let mut buckets: Vec<Bucket> = self.assignments.iter().map(|a| a.bucket).collect();
        buckets.sort();
        buckets.dedup();
        buckets
    }
}

/// Minimum uniform magnification of a `bucket` render that covers a
/// `width × height` target on both axes.
pub fn cover_factor(bucket: Bucket, width: u32, height: u32) -> f64 {
    let (bw, bh) = bucket.resolution();
    (width as f64 / bw as f64).max(height as f64 / bh as f64)
}

/// Resolve one device against the enabled bucket set.
pub fn resolve_device(
    device: &Device,
    enabled: &[Bucket],
) -> Result<DeviceAssignment, MissingBucketError> {
    let bucket = classify(device.width, device.height);
    if !enabled.contains(&bucket) {
        return Err(MissingBucketError {
            device_id: device.id.clone(),
            bucket,
        });
    }
    Ok(DeviceAssignment {
        device: device.clone(),
        bucket,
        factor: cover_factor(bucket, device.width, device.height),
    })
}

/// Resolve every device. Failures are per device; the rest still resolve.
pub fn resolve(devices: &[Device], enabled: &[Bucket]) -> Resolved {
    let mut resolved = Resolved::default();
    for device in devices {
        match resolve_device(device, enabled) {
            Ok(assignment) => resolved.assignments.push(assignment),
            Err(e) => resolved.missing.push(e),
        }
    }
    resolved
}
