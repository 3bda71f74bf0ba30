//! Task planning: which enlargements and finals a run needs.
//!
//! Input is the list of content ids, the resolved device assignments, the
//! upscale mode and the method table. Output is a [`Plan`]:
//!
//! - one [`EnlargeTask`] per `(content id, bucket, method)`, no matter how
//!   many devices share it;
//! - one [`FinalJob`] per `(content id, device)`;
//! - per-content [`MissingBaseImageError`]s, [`InvalidEnlargementError`]s
//!   for sizes out of range, and per-final [`ForcedMagnificationWarning`]s.
//!
//! Planning consults the cache only for presence checks. A content id whose
//! finals all exist needs nothing, not even its base images, so intermediates
//! swept after an earlier run do not turn into errors.

use crate::bucket::Bucket;
use crate::cache::ArtifactCache;
use crate::device::{Device, DeviceAssignment};
use crate::method::{Method, MethodTable, OutputSizeError};
use crate::types::{ArtifactKey, ContentId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// How enlargement methods are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum UpscaleMode {
    /// Cheapest adequate method per device factor.
    #[default]
    Auto,
    /// Every device uses this method. `Locked(Method::None)` skips enlargement.
    Locked(Method),
}

impl fmt::Display for UpscaleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpscaleMode::Auto => f.write_str("auto"),
            UpscaleMode::Locked(method) => write!(f, "{method}"),
        }
    }
}

impl FromStr for UpscaleMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "auto" {
            return Ok(UpscaleMode::Auto);
        }
        s.parse::<Method>()
            .map(UpscaleMode::Locked)
            .map_err(|e| format!("{e}, or 'auto'"))
    }
}

impl TryFrom<String> for UpscaleMode {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<UpscaleMode> for String {
    fn from(mode: UpscaleMode) -> String {
        mode.to_string()
    }
}

/// Pick the method for a device needing `factor` magnification.
///
/// In auto mode anything `upscale2x` can deliver goes to `upscale2x`;
/// everything else goes to `aurasr`.
pub fn select_method(mode: UpscaleMode, factor: f64, methods: &MethodTable) -> Method {
    match mode {
        UpscaleMode::Locked(method) => method,
        UpscaleMode::Auto => {
            if factor <= methods.get(Method::Upscale2x).max_factor {
                Method::Upscale2x
            } else {
                Method::AuraSr
            }
        }
    }
}

/// One deduplicated enlargement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnlargeTask {
    pub content: ContentId,
    pub bucket: Bucket,
    pub method: Method,
    pub width: u32,
    pub height: u32,
    /// Magnification actually applied.
    pub factor: f64,
    /// Devices whose finals are cut from this task's output, table order.
    pub dependents: Vec<String>,
    /// The artifact already exists; nothing to do.
    pub cached: bool,
}

impl EnlargeTask {
    pub fn key(&self) -> ArtifactKey {
        ArtifactKey::Enlarged {
            content: self.content,
            method: self.method,
            width: self.width,
            height: self.height,
        }
    }

    pub fn source_key(&self) -> ArtifactKey {
        ArtifactKey::Base {
            content: self.content,
            bucket: self.bucket,
        }
    }
}

/// One final wallpaper to produce.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalJob {
    pub content: ContentId,
    pub device: Device,
    pub bucket: Bucket,
    pub method: Method,
    /// Enlarged artifact (or base image for `none`) the final is cut from.
    pub source: ArtifactKey,
    /// The final already exists.
    pub done: bool,
}

impl FinalJob {
    pub fn key(&self) -> ArtifactKey {
        ArtifactKey::Final {
            content: self.content,
            device_id: self.device.id.clone(),
        }
    }
}

/// A content id lacks the base image for a bucket some device needs.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{content}: missing base image for {bucket} (expected {})", .path.display())]
pub struct MissingBaseImageError {
    pub content: ContentId,
    pub bucket: Bucket,
    pub path: PathBuf,
}

/// A planned enlargement whose output size is out of range.
///
/// Its dependents get no final for this content id.
/// A group's enlargement would be too large to produce. None of its
/// dependents get a final.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{content}: {method} enlargement of {bucket} rejected: {reason}")]
pub struct InvalidEnlargementError {
    pub content: ContentId,
    pub bucket: Bucket,
    pub method: Method,
    pub dependents: Vec<String>,
    pub reason: OutputSizeError,
}

/// A device needs more magnification than its method is trusted with.
///
/// The final is still produced; the cover-fit stretches the remainder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForcedMagnificationWarning {
    pub content: ContentId,
    pub device_id: String,
    pub method: Method,
    pub factor: f64,
    pub max_factor: f64,
}

impl fmt::Display for ForcedMagnificationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: device '{}' needs {:.3}x but {} is trusted up to {}x",
            self.content, self.device_id, self.factor, self.method, self.max_factor
        )
    }
}

/// Everything a run has to do, derived from the device table and the cache.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Sorted by `(content, bucket, method)`.
    pub tasks: Vec<EnlargeTask>,
    /// Content ids ascending, devices in table order within each.
    pub finals: Vec<FinalJob>,
    pub missing_bases: Vec<MissingBaseImageError>,
    pub invalid_tasks: Vec<InvalidEnlargementError>,
    pub warnings: Vec<ForcedMagnificationWarning>,
}

impl Plan {
    pub fn pending_tasks(&self) -> impl Iterator<Item = &EnlargeTask> {
        self.tasks.iter().filter(|t| !t.cached)
    }

    pub fn pending_finals(&self) -> impl Iterator<Item = &FinalJob> {
        self.finals.iter().filter(|f| !f.done)
    }

    /// Whether there is no work left.
    pub fn is_complete(&self) -> bool {
        self.pending_tasks().next().is_none() && self.pending_finals().next().is_none()
    }
}

/// Factor each `(bucket, method)` group is enlarged for: the largest factor
/// among its devices.
pub fn group_factors(
    assignments: &[DeviceAssignment],
    mode: UpscaleMode,
    methods: &MethodTable,
) -> BTreeMap<(Bucket, Method), f64> {
    let mut factors: BTreeMap<(Bucket, Method), f64> = BTreeMap::new();
    for a in assignments {
        let method = select_method(mode, a.factor, methods);
        let entry = factors.entry((a.bucket, method)).or_insert(a.factor);
        *entry = entry.max(a.factor);
    }
    factors
}

/// Build the plan for `content_ids` × `assignments`.
pub fn plan(
    content_ids: &[ContentId],
    assignments: &[DeviceAssignment],
    mode: UpscaleMode,
    methods: &MethodTable,
    cache: &ArtifactCache,
) -> Plan {
    let mut ids = content_ids.to_vec();
    ids.sort();
    ids.dedup();

    let choices: Vec<Method> = assignments
        .iter()
        .map(|a| select_method(mode, a.factor, methods))
        .collect();

    // (bucket, method) -> indexes into `assignments`, shared by every content id
    let mut groups: BTreeMap<(Bucket, Method), Vec<usize>> = BTreeMap::new();
    for (i, (a, method)) in assignments.iter().zip(&choices).enumerate() {
        groups.entry((a.bucket, *method)).or_default().push(i);
    }

    let mut plan = Plan::default();
    for content in ids {
        plan_content(content, assignments, &choices, &groups, methods, cache, &mut plan);
    }
    plan
}

fn plan_content(
    content: ContentId,
    assignments: &[DeviceAssignment],
    choices: &[Method],
    groups: &BTreeMap<(Bucket, Method), Vec<usize>>,
    methods: &MethodTable,
    cache: &ArtifactCache,
    plan: &mut Plan,
) {
    let final_done = |a: &DeviceAssignment| {
        cache.is_cached(&ArtifactKey::Final {
            content,
            device_id: a.device.id.clone(),
        })
    };

    // Groups with at least one final still to make
    let active: Vec<(&(Bucket, Method), &Vec<usize>)> = groups
        .iter()
        .filter(|(_, members)| members.iter().any(|&i| !final_done(&assignments[i])))
        .collect();

    let mut missing: Vec<Bucket> = active
        .iter()
        .map(|((bucket, _), _)| *bucket)
        .filter(|bucket| {
            !cache.is_cached(&ArtifactKey::Base {
                content,
                bucket: *bucket,
            })
        })
        .collect();
    missing.dedup();
    if !missing.is_empty() {
        for bucket in missing {
            plan.missing_bases.push(MissingBaseImageError {
                content,
                bucket,
                path: cache.path(&ArtifactKey::Base { content, bucket }),
            });
        }
        return;
    }

    // Source artifact per (bucket, method) for this content id
    let mut sources: BTreeMap<(Bucket, Method), ArtifactKey> = BTreeMap::new();
    for ((bucket, method), members) in groups {
        let base_key = ArtifactKey::Base {
            content,
            bucket: *bucket,
        };
        if !method.enlarges() {
            sources.insert((*bucket, *method), base_key);
            continue;
        }
        let spec = methods.get(*method);
        let needed = members
            .iter()
            .map(|&i| assignments[i].factor)
            .fold(f64::MIN, f64::max);
        let dependents: Vec<String> = members
            .iter()
            .map(|&i| assignments[i].device.id.clone())
            .collect();
        let is_active = active.iter().any(|(g, _)| **g == (*bucket, *method));
        let (width, height) = match spec.output_size(bucket.resolution(), needed) {
            Ok(size) => size,
            Err(reason) => {
                if is_active {
                    plan.invalid_tasks.push(InvalidEnlargementError {
                        content,
                        bucket: *bucket,
                        method: *method,
                        dependents,
                        reason,
                    });
                }
                continue;
            }
        };
        let task = EnlargeTask {
            content,
            bucket: *bucket,
            method: *method,
            width,
            height,
            factor: spec.applied_factor(needed),
            dependents,
            cached: false,
        };
        let key = task.key();
        let cached = cache.is_cached(&key);
        sources.insert((*bucket, *method), key);
        // Finished groups only list an enlargement that is still on disk
        if is_active || cached {
            plan.tasks.push(EnlargeTask { cached, ..task });
        }
    }

    for (a, method) in assignments.iter().zip(choices) {
        let max_factor = methods.get(*method).max_factor;
        if a.factor > max_factor {
            plan.warnings.push(ForcedMagnificationWarning {
                content,
                device_id: a.device.id.clone(),
                method: *method,
                factor: a.factor,
                max_factor,
            });
        }
        let Some(source) = sources.get(&(a.bucket, *method)) else {
            continue;
        };
        plan.finals.push(FinalJob {
            content,
            device: a.device.clone(),
            bucket: a.bucket,
            method: *method,
            source: source.clone(),
            done: final_done(a),
        });
    }
}
