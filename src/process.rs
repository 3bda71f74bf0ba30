//! Pipeline driver.
//!
//! Runs one resume-aware pass over the output directory:
//!
//! ```text
//! stale .tmp-* cleanup
//!   → device resolution      (device table → bucket + factor per device)
//!   → discovery              (content ids from base image filenames)
//!   → planning               (deduplicated enlargement tasks + final jobs)
//!   → dispatch               (enlargements, method group by method group)
//!   → finalization           (cover-fit + JPEG, parallel)
//!   → retention sweep        (only with intermediates = "delete")
//!   → .wallfit-report.json
//! ```
//!
//! Every phase skips artifacts that already exist, so running twice
//! performs no new work the second time. Progress is reported as
//! [`ProcessEvent`]s on an optional channel; nothing here prints.
//!
//! [`generate_and_run`] prepends the base-generation phase for callers that
//! have a [`BaseGenerator`].

use crate::bucket::Bucket;
use crate::cache::{ArtifactCache, RunStats};
use crate::config::{Retention, WallfitConfig};
use crate::device::{self, Device, MissingBucketError};
use crate::dispatch::{DispatchError, DispatchOptions, DispatchReport, dispatch};
use crate::finalize::{FinalizeReport, finalize_all};
use crate::generate::{GenerateReport, GenerationJob, generate_bases};
use crate::imaging::{BaseGenerator, Enlarger, Quality};
use crate::method::{Method, MethodTable};
use crate::plan::{
    ForcedMagnificationWarning, InvalidEnlargementError, MissingBaseImageError, Plan, UpscaleMode,
    plan,
};
use crate::types::{ArtifactKey, ContentId};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::time::Duration;
use thiserror::Error;

/// Name of the run report within the output directory.
pub const REPORT_FILENAME: &str = ".wallfit-report.json";

/// Temporary files older than this are left over from a dead run.
pub const STALE_TEMP_AGE: Duration = Duration::from_secs(60 * 60);

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Outcome of one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "lowercase")]
pub enum UnitStatus {
    /// The artifact already existed.
    Cached,
    /// The artifact was produced in this run.
    Done,
    /// No artifact was produced; the next run retries.
    Failed(String),
}

/// Progress events emitted during a run.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// A device maps to a bucket that is not enabled.
    DeviceSkipped(MissingBucketError),
    /// Planning finished.
    Planned {
        content_ids: usize,
        devices: usize,
        tasks: usize,
        cached_tasks: usize,
        finals: usize,
        done_finals: usize,
    },
    /// A content id lacks a base image and is skipped.
    ContentSkipped(MissingBaseImageError),
    /// An enlargement would exceed the output size limit; its devices get no final.
    EnlargementRejected(InvalidEnlargementError),
    ForcedMagnification(ForcedMagnificationWarning),
    Generated {
        key: ArtifactKey,
        seed: u64,
        status: UnitStatus,
    },
    /// A method group is about to run.
    MethodStarted { method: Method, tasks: usize },
    Enlarged {
        key: ArtifactKey,
        dependents: Vec<String>,
        status: UnitStatus,
    },
    Finalized { key: ArtifactKey, status: UnitStatus },
    /// Intermediates of a finished content id were removed.
    Swept { content: ContentId, removed: usize },
}

/// Settings for one run, flattened from [`WallfitConfig`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: UpscaleMode,
    pub methods: MethodTable,
    pub enabled_buckets: Vec<Bucket>,
    pub dispatch: DispatchOptions,
    pub quality: Quality,
    pub retention: Retention,
}

impl RunOptions {
    pub fn from_config(config: &WallfitConfig) -> Self {
        Self {
            mode: config.upscale.mode,
            methods: config.method_table(),
            enabled_buckets: config.upscale.enabled_buckets.clone(),
            dispatch: config.dispatch_options(),
            quality: config.quality(),
            retention: config.retention.intermediates,
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&WallfitConfig::default())
    }
}

/// Everything that happened in a run. Written to [`REPORT_FILENAME`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessReport {
    pub mode: String,
    pub content_ids: Vec<ContentId>,
    pub missing_buckets: Vec<MissingBucketError>,
    pub missing_bases: Vec<MissingBaseImageError>,
    pub invalid_tasks: Vec<InvalidEnlargementError>,
    pub warnings: Vec<ForcedMagnificationWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerateReport>,
    pub dispatch: DispatchReport,
    pub finalize: FinalizeReport,
    /// Intermediates removed by the retention sweep.
    pub swept: Vec<ArtifactKey>,
    pub stats: RunStats,
}

impl ProcessReport {
    /// True when every unit either existed or was produced.
    pub fn is_clean(&self) -> bool {
        self.stats.failed == 0
            && self.missing_bases.is_empty()
            && self.invalid_tasks.is_empty()
            && self.missing_buckets.is_empty()
    }
}

/// Snapshot of the output directory against the device table.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    pub bases: usize,
    pub enlarged: usize,
    pub finals: usize,
    pub content_ids: Vec<ContentId>,
    pub missing_buckets: Vec<MissingBucketError>,
    pub plan: Plan,
}

fn emit(events: Option<&Sender<ProcessEvent>>, event: ProcessEvent) {
    if let Some(tx) = events {
        tx.send(event).ok();
    }
}

/// Inspect the output directory without doing any image work.
pub fn status(
    cache: &ArtifactCache,
    devices: &[Device],
    options: &RunOptions,
) -> Result<StatusReport, ProcessError> {
    let keys = cache.scan()?;
    let resolved = device::resolve(devices, &options.enabled_buckets);
    let content_ids = cache.content_ids()?;
    let plan = plan(
        &content_ids,
        &resolved.assignments,
        options.mode,
        &options.methods,
        cache,
    );
    Ok(StatusReport {
        bases: count(&keys, |k| matches!(k, ArtifactKey::Base { .. })),
        enlarged: count(&keys, |k| matches!(k, ArtifactKey::Enlarged { .. })),
        finals: count(&keys, |k| matches!(k, ArtifactKey::Final { .. })),
        content_ids,
        missing_buckets: resolved.missing,
        plan,
    })
}

fn count(keys: &BTreeSet<ArtifactKey>, pred: impl Fn(&ArtifactKey) -> bool) -> usize {
    keys.iter().filter(|k| pred(k)).count()
}

/// Run the pipeline over the base images already in the output directory.
pub fn run(
    enlarger: &impl Enlarger,
    cache: &ArtifactCache,
    devices: &[Device],
    options: &RunOptions,
    events: Option<Sender<ProcessEvent>>,
) -> Result<ProcessReport, ProcessError> {
    let events = events.as_ref();
    std::fs::create_dir_all(cache.root())?;
    cache.remove_stale_temp_files(STALE_TEMP_AGE)?;

    let resolved = device::resolve(devices, &options.enabled_buckets);
    for missing in &resolved.missing {
        emit(events, ProcessEvent::DeviceSkipped(missing.clone()));
    }

    let content_ids = cache.content_ids()?;
    let plan = plan(
        &content_ids,
        &resolved.assignments,
        options.mode,
        &options.methods,
        cache,
    );
    emit(
        events,
        ProcessEvent::Planned {
            content_ids: content_ids.len(),
            devices: resolved.assignments.len(),
            tasks: plan.tasks.len(),
            cached_tasks: plan.tasks.iter().filter(|t| t.cached).count(),
            finals: plan.finals.len(),
            done_finals: plan.finals.iter().filter(|f| f.done).count(),
        },
    );
    for missing in &plan.missing_bases {
        emit(events, ProcessEvent::ContentSkipped(missing.clone()));
    }
    for invalid in &plan.invalid_tasks {
        emit(events, ProcessEvent::EnlargementRejected(invalid.clone()));
    }
    for warning in &plan.warnings {
        emit(events, ProcessEvent::ForcedMagnification(warning.clone()));
    }

    let dispatch_report = dispatch(enlarger, &plan, cache, &options.dispatch, events)?;
    let finalize_report = finalize_all(cache, &plan.finals, options.quality, events);

    let swept = match options.retention {
        Retention::Keep => Vec::new(),
        Retention::Delete => sweep_intermediates(cache, &plan, events)?,
    };

    let mut stats = dispatch_report.stats();
    stats.merge(finalize_report.stats());

    let report = ProcessReport {
        mode: options.mode.to_string(),
        content_ids,
        missing_buckets: resolved.missing,
        missing_bases: plan.missing_bases,
        invalid_tasks: plan.invalid_tasks,
        warnings: plan.warnings,
        generation: None,
        dispatch: dispatch_report,
        finalize: finalize_report,
        swept,
        stats,
    };
    write_report(cache, &report)?;
    Ok(report)
}

/// Generate missing base images for `jobs`, then [`run`].
///
/// Only buckets that some device in the table resolves to are generated.
pub fn generate_and_run(
    generator: &impl BaseGenerator,
    enlarger: &impl Enlarger,
    jobs: &[GenerationJob],
    cache: &ArtifactCache,
    devices: &[Device],
    options: &RunOptions,
    events: Option<Sender<ProcessEvent>>,
) -> Result<ProcessReport, ProcessError> {
    let buckets = device::resolve(devices, &options.enabled_buckets).buckets();
    let generation = generate_bases(generator, cache, jobs, &buckets, events.as_ref());
    let mut report = run(enlarger, cache, devices, options, events)?;
    report.stats.merge(generation.stats());
    report.generation = Some(generation);
    write_report(cache, &report)?;
    Ok(report)
}

/// Remove base and enlarged images of content ids whose finals all exist.
///
/// Content ids blocked by a missing base image or a rejected enlargement are
/// left alone.
pub fn sweep_intermediates(
    cache: &ArtifactCache,
    plan: &Plan,
    events: Option<&Sender<ProcessEvent>>,
) -> Result<Vec<ArtifactKey>, ProcessError> {
    let blocked: BTreeSet<ContentId> = plan
        .missing_bases
        .iter()
        .map(|m| m.content)
        .chain(plan.invalid_tasks.iter().map(|i| i.content))
        .collect();
    let planned: BTreeSet<ContentId> = plan.finals.iter().map(|f| f.content).collect();
    let finished: BTreeSet<ContentId> = planned
        .into_iter()
        .filter(|c| !blocked.contains(c))
        .filter(|c| {
            plan.finals
                .iter()
                .filter(|f| f.content == *c)
                .all(|f| cache.is_cached(&f.key()))
        })
        .collect();
    if finished.is_empty() {
        return Ok(Vec::new());
    }

    let mut removed = Vec::new();
    for content in finished {
        let intermediates: Vec<ArtifactKey> = cache
            .scan()?
            .into_iter()
            .filter(|k| k.content() == content && !matches!(k, ArtifactKey::Final { .. }))
            .collect();
        let mut count = 0;
        for key in intermediates {
            if cache.remove(&key)? {
                count += 1;
                removed.push(key);
            }
        }
        emit(
            events,
            ProcessEvent::Swept {
                content,
                removed: count,
            },
        );
    }
    Ok(removed)
}

/// Path of the run report for `cache`.
pub fn report_path(cache: &ArtifactCache) -> PathBuf {
    cache.root().join(REPORT_FILENAME)
}

fn write_report(cache: &ArtifactCache, report: &ProcessReport) -> Result<(), ProcessError> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(report_path(cache), json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockEnlarger, MockGenerator, gradient};
    use crate::imaging::encode_png;
    use std::fs;
    use std::time::SystemTime;
    use tempfile::TempDir;

    /// Small fake base: real bucket name, tiny pixels.
    fn seed_base(cache: &ArtifactCache, seq: u32, bucket: Bucket) {
        let key = ArtifactKey::Base {
            content: ContentId::new(seq, 0),
            bucket,
        };
        let (w, h) = bucket.resolution();
        cache
            .write_atomic(&key, &encode_png(&gradient(w / 64, h / 64)).unwrap())
            .unwrap();
    }

    fn small_devices() -> Vec<Device> {
        vec![
            Device::new("phone-a", 20, 42),
            Device::new("phone-b", 18, 40),
            Device::new("tv", 40, 22),
        ]
    }

    fn options() -> RunOptions {
        RunOptions {
            quality: Quality::new(90),
            ..RunOptions::default()
        }
    }

    fn setup() -> (TempDir, ArtifactCache) {
        let tmp = TempDir::new().unwrap();
        let cache = ArtifactCache::new(tmp.path());
        seed_base(&cache, 0, Bucket::TallPortrait);
        seed_base(&cache, 0, Bucket::Wide);
        (tmp, cache)
    }

    #[test]
    fn run_produces_every_final() {
        let (tmp, cache) = setup();
        let backend = MockEnlarger::new();

        let report = run(&backend, &cache, &small_devices(), &options(), None).unwrap();

        for id in ["phone-a", "phone-b", "tv"] {
            assert!(tmp.path().join(format!("000_00_{id}.jpg")).exists(), "{id}");
        }
        // Devices are far smaller than their bucket: factor < 1 → upscale2x, one task per bucket
        assert_eq!(report.dispatch.performed.len(), 2);
        assert_eq!(report.finalize.written.len(), 3);
        assert!(report.is_clean());
        assert!(report_path(&cache).exists());
    }

    #[test]
    fn second_run_performs_nothing() {
        let (tmp, cache) = setup();
        let backend = MockEnlarger::new();
        run(&backend, &cache, &small_devices(), &options(), None).unwrap();
        let first = fs::read(tmp.path().join("000_00_tv.jpg")).unwrap();

        let again = MockEnlarger::new();
        let report = run(&again, &cache, &small_devices(), &options(), None).unwrap();

        assert!(again.get_operations().is_empty());
        assert_eq!(report.stats.performed, 0);
        assert_eq!(report.finalize.cached.len(), 3);
        // 2 enlargements still on disk + 3 finals
        assert_eq!(report.stats.cached, 5);
        assert_eq!(fs::read(tmp.path().join("000_00_tv.jpg")).unwrap(), first);
    }

    #[test]
    fn missing_bucket_and_base_are_reported() {
        let tmp = TempDir::new().unwrap();
        let cache = ArtifactCache::new(tmp.path());
        seed_base(&cache, 0, Bucket::TallPortrait);
        seed_base(&cache, 1, Bucket::TallPortrait);
        seed_base(&cache, 1, Bucket::Wide);
        let devices = vec![
            Device::new("phone", 20, 42),
            Device::new("tv", 40, 22),
            Device::new("square", 30, 30),
        ];
        let opts = RunOptions {
            enabled_buckets: vec![Bucket::TallPortrait, Bucket::Wide],
            ..options()
        };
        let (tx, rx) = std::sync::mpsc::channel();

        let report = run(&MockEnlarger::new(), &cache, &devices, &opts, Some(tx)).unwrap();

        assert_eq!(report.missing_buckets.len(), 1);
        assert_eq!(report.missing_buckets[0].device_id, "square");
        assert_eq!(report.missing_bases.len(), 1);
        assert_eq!(report.missing_bases[0].content, ContentId::new(0, 0));
        assert!(!tmp.path().join("000_00_phone.jpg").exists());
        assert!(tmp.path().join("001_00_phone.jpg").exists());
        assert!(!report.is_clean());

        let events: Vec<ProcessEvent> = rx.into_iter().collect();
        assert!(matches!(events[0], ProcessEvent::DeviceSkipped(_)));
        assert!(
            events
                .iter()
                .any(|e| matches!(e, ProcessEvent::ContentSkipped(_)))
        );
    }

    #[test]
    fn failed_enlargement_fails_only_its_dependents() {
        let (tmp, cache) = setup();
        let backend = MockEnlarger::failing_on("000_00_base_1728x960.png");

        let report = run(&backend, &cache, &small_devices(), &options(), None).unwrap();

        assert_eq!(report.dispatch.failures.len(), 1);
        assert_eq!(report.finalize.failures.len(), 1);
        assert_eq!(report.finalize.failures[0].device_id, "tv");
        assert!(tmp.path().join("000_00_phone-a.jpg").exists());
        assert!(!tmp.path().join("000_00_tv.jpg").exists());

        // The next run retries exactly the failed task
        let healthy = MockEnlarger::new();
        let report = run(&healthy, &cache, &small_devices(), &options(), None).unwrap();
        assert_eq!(healthy.enlarge_count(), 1);
        assert_eq!(report.finalize.written.len(), 1);
        assert!(tmp.path().join("000_00_tv.jpg").exists());
    }

    #[test]
    fn delete_retention_sweeps_finished_content() {
        let (tmp, cache) = setup();
        let opts = RunOptions {
            retention: Retention::Delete,
            ..options()
        };

        let report = run(&MockEnlarger::new(), &cache, &small_devices(), &opts, None).unwrap();

        // 2 bases + 2 enlargements
        assert_eq!(report.swept.len(), 4);
        let keys = cache.scan().unwrap();
        assert!(keys.iter().all(|k| matches!(k, ArtifactKey::Final { .. })));
        assert!(tmp.path().join("000_00_tv.jpg").exists());

        // Nothing left to discover; a rerun is a no-op
        let rerun = MockEnlarger::new();
        let report = run(&rerun, &cache, &small_devices(), &opts, None).unwrap();
        assert!(rerun.get_operations().is_empty());
        assert!(report.content_ids.is_empty());
    }

    #[test]
    fn keep_retention_leaves_intermediates() {
        let (_tmp, cache) = setup();
        let report = run(&MockEnlarger::new(), &cache, &small_devices(), &options(), None).unwrap();
        assert!(report.swept.is_empty());
        assert_eq!(cache.content_ids().unwrap(), vec![ContentId::new(0, 0)]);
    }

    #[test]
    fn sweep_skips_content_with_failed_finals() {
        let (tmp, cache) = setup();
        let opts = RunOptions {
            retention: Retention::Delete,
            ..options()
        };
        let backend = MockEnlarger::failing_on("000_00_base_1728x960.png");

        let report = run(&backend, &cache, &small_devices(), &opts, None).unwrap();

        assert!(report.swept.is_empty());
        assert!(tmp.path().join("000_00_base_1728x960.png").exists());
    }

    #[test]
    fn stale_temp_files_are_cleared_before_run() {
        let (tmp, cache) = setup();
        let dead = tmp.path().join(".tmp-dead-000_00_tv.jpg");
        let live = tmp.path().join(".tmp-live-000_00_phone-a.jpg");
        fs::write(&dead, b"partial").unwrap();
        fs::File::options()
            .write(true)
            .open(&dead)
            .unwrap()
            .set_modified(SystemTime::now() - 2 * STALE_TEMP_AGE)
            .unwrap();
        fs::write(&live, b"partial").unwrap();

        run(&MockEnlarger::new(), &cache, &small_devices(), &options(), None).unwrap();

        assert!(!dead.exists());
        // Young enough to belong to another writer
        assert!(live.exists());
    }

    #[test]
    fn oversized_enlargement_blocks_its_devices_only() {
        let (tmp, cache) = setup();
        let mut overrides = std::collections::BTreeMap::new();
        overrides.insert(
            Method::Usdu,
            crate::method::MethodSpec {
                scale: crate::method::Scale::Variable,
                max_factor: 100.0,
                cost: crate::method::CostClass::Expensive,
            },
        );
        let opts = RunOptions {
            mode: UpscaleMode::Locked(Method::Usdu),
            methods: MethodTable::with_overrides(&overrides),
            retention: Retention::Delete,
            ..options()
        };
        let mut devices = small_devices();
        devices.push(Device::new("wall", 100_000, 50_000));
        let (tx, rx) = std::sync::mpsc::channel();

        let report = run(&MockEnlarger::new(), &cache, &devices, &opts, Some(tx)).unwrap();

        assert_eq!(report.invalid_tasks.len(), 1);
        assert_eq!(report.invalid_tasks[0].dependents, vec!["tv", "wall"]);
        assert!(!report.is_clean());
        assert!(tmp.path().join("000_00_phone-a.jpg").exists());
        assert!(!tmp.path().join("000_00_tv.jpg").exists());
        // Content with a rejected enlargement is never swept
        assert!(report.swept.is_empty());
        assert!(
            rx.into_iter()
                .any(|e| matches!(e, ProcessEvent::EnlargementRejected(_)))
        );
    }

    #[test]
    fn status_counts_artifacts_and_pending_work() {
        let (_tmp, cache) = setup();
        let before = status(&cache, &small_devices(), &options()).unwrap();
        assert_eq!(before.bases, 2);
        assert_eq!(before.finals, 0);
        assert_eq!(before.plan.pending_finals().count(), 3);

        run(&MockEnlarger::new(), &cache, &small_devices(), &options(), None).unwrap();

        let after = status(&cache, &small_devices(), &options()).unwrap();
        assert_eq!(after.enlarged, 2);
        assert_eq!(after.finals, 3);
        assert!(after.plan.is_complete());
    }

    #[test]
    fn generate_and_run_renders_needed_buckets_only() {
        let tmp = TempDir::new().unwrap();
        let cache = ArtifactCache::new(tmp.path());
        let generator = MockGenerator::new();
        let jobs = vec![GenerationJob {
            content: ContentId::new(0, 0),
            prompt: "lighthouse".into(),
        }];
        let devices = vec![Device::new("tv", 1920, 1080)];

        let report = generate_and_run(
            &generator,
            &MockEnlarger::new(),
            &jobs,
            &cache,
            &devices,
            &options(),
            None,
        )
        .unwrap();

        let buckets: Vec<Bucket> = generator.get_requests().iter().map(|r| r.1).collect();
        assert_eq!(buckets, vec![Bucket::Wide]);
        assert!(tmp.path().join("000_00_tv.jpg").exists());
        let generation = report.generation.unwrap();
        assert_eq!(generation.generated.len(), 1);
        // generation + enlargement + final
        assert_eq!(report.stats.performed, 3);
    }

    #[test]
    fn report_is_written_as_json() {
        let (_tmp, cache) = setup();
        run(&MockEnlarger::new(), &cache, &small_devices(), &options(), None).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(report_path(&cache)).unwrap()).unwrap();
        assert_eq!(json["mode"], "auto");
        assert_eq!(json["stats"]["performed"], 5);
        assert_eq!(json["content_ids"][0]["sequence"], 0);
    }
}
