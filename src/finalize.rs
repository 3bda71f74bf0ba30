//! Final wallpaper production.
//!
//! Each [`FinalJob`] turns a cached enlargement (or, in `none` mode, the base
//! image) into an exact-size JPEG for one device: decode, cover-fit, flatten
//! alpha onto white, encode, write atomically.
//!
//! Jobs are CPU-bound and independent, so [`finalize_all`] spreads them over
//! the global rayon pool (sized by `processing.max_processes`).

use crate::cache::{ArtifactCache, RunStats};
use crate::imaging::{BackendError, Quality, cover_fit, encode_jpeg, load_image};
use crate::naming::file_name;
use crate::plan::FinalJob;
use crate::process::{ProcessEvent, UnitStatus};
use crate::types::{ArtifactKey, ContentId};
use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use thiserror::Error;

/// A final that could not be produced.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{file}: {message}")]
pub struct FinalizationFailure {
    pub content: ContentId,
    pub device_id: String,
    pub file: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FinalOutcome {
    /// The final already existed.
    Cached,
    Written(PathBuf),
    Failed(FinalizationFailure),
}

/// Outcome of [`finalize_all`].
#[derive(Debug, Default, Clone, Serialize)]
pub struct FinalizeReport {
    pub written: Vec<ArtifactKey>,
    pub cached: Vec<ArtifactKey>,
    pub failures: Vec<FinalizationFailure>,
}

impl FinalizeReport {
    pub fn stats(&self) -> RunStats {
        RunStats {
            cached: self.cached.len() as u32,
            performed: self.written.len() as u32,
            failed: self.failures.len() as u32,
        }
    }
}

/// Produce the final for one job unless it already exists.
pub fn finalize(cache: &ArtifactCache, job: &FinalJob, quality: Quality) -> FinalOutcome {
    let key = job.key();
    if cache.is_cached(&key) {
        return FinalOutcome::Cached;
    }
    match render(cache, job, &key, quality) {
        Ok(path) => FinalOutcome::Written(path),
        Err(e) => FinalOutcome::Failed(FinalizationFailure {
            content: job.content,
            device_id: job.device.id.clone(),
            file: file_name(&key),
            message: e.to_string(),
        }),
    }
}

fn render(
    cache: &ArtifactCache,
    job: &FinalJob,
    key: &ArtifactKey,
    quality: Quality,
) -> Result<PathBuf, BackendError> {
    let source = cache.path(&job.source);
    if !source.is_file() {
        return Err(BackendError::ProcessingFailed(format!(
            "source {} is not available",
            file_name(&job.source)
        )));
    }
    let img = load_image(&source)?;
    let fitted = cover_fit(&img, job.device.width, job.device.height);
    let bytes = encode_jpeg(&fitted, quality)?;
    Ok(cache.write_atomic(key, &bytes)?)
}

/// Finalize every job in parallel; events and report follow job order.
pub fn finalize_all(
    cache: &ArtifactCache,
    jobs: &[FinalJob],
    quality: Quality,
    events: Option<&Sender<ProcessEvent>>,
) -> FinalizeReport {
    let outcomes: Vec<FinalOutcome> = jobs
        .par_iter()
        .map(|job| finalize(cache, job, quality))
        .collect();

    let mut report = FinalizeReport::default();
    for (job, outcome) in jobs.iter().zip(outcomes) {
        let key = job.key();
        let status = match outcome {
            FinalOutcome::Cached => {
                report.cached.push(key.clone());
                UnitStatus::Cached
            }
            FinalOutcome::Written(_) => {
                report.written.push(key.clone());
                UnitStatus::Done
            }
            FinalOutcome::Failed(f) => {
                let message = f.message.clone();
                report.failures.push(f);
                UnitStatus::Failed(message)
            }
        };
        if let Some(tx) = events {
            tx.send(ProcessEvent::Finalized { key, status }).ok();
        }
    }
    report
}
