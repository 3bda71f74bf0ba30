//! Batch dispatch of enlargement tasks.
//!
//! Pending tasks are grouped by method and the groups run one after another
//! in [`Method`] declaration order. Real backends swap models when the
//! method changes, so [`Enlarger::prepare`] is called once per group and a
//! group is fully attempted before the next begins.
//!
//! Inside a group, tasks are independent. They run on a dedicated rayon pool
//! of `concurrency` workers. Each result is reported as soon as it and every
//! result before it in ascending `(content, bucket)` order are in, so
//! progress streams while the group is still running.
//!
//! A failed task is retried up to `max_attempts` total attempts, then
//! recorded as an [`EnlargementFailure`]. Nothing is written for it, so the
//! next run retries it automatically.

use crate::bucket::Bucket;
use crate::cache::{ArtifactCache, RunStats};
use crate::imaging::{BackendError, EnlargeRequest, Enlarger, encode_png};
use crate::method::Method;
use crate::naming::file_name;
use crate::plan::{EnlargeTask, Plan};
use crate::process::{ProcessEvent, UnitStatus};
use crate::types::{ArtifactKey, ContentId};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::mpsc::{self, Sender};
use thiserror::Error;

/// Tuning knobs for [`dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Parallel enlargements within one method group.
    pub concurrency: usize,
    /// Total attempts per task, including the first.
    pub max_attempts: u32,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            max_attempts: 2,
        }
    }
}

/// A task that failed every attempt.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{file}: {method} failed after {attempts} attempt(s): {message}")]
pub struct EnlargementFailure {
    pub content: ContentId,
    pub bucket: Bucket,
    pub method: Method,
    /// Artifact that was not produced.
    pub file: String,
    pub attempts: u32,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Outcome of one dispatch.
#[derive(Debug, Default, Clone, Serialize)]
pub struct DispatchReport {
    /// New artifacts, in dispatch order.
    pub performed: Vec<ArtifactKey>,
    /// Tasks skipped because their artifact already existed.
    pub cached: Vec<ArtifactKey>,
    pub failures: Vec<EnlargementFailure>,
}

impl DispatchReport {
    pub fn stats(&self) -> RunStats {
        RunStats {
            cached: self.cached.len() as u32,
            performed: self.performed.len() as u32,
            failed: self.failures.len() as u32,
        }
    }
}

/// Execute every pending task in `plan` against `enlarger`.
pub fn dispatch(
    enlarger: &impl Enlarger,
    plan: &Plan,
    cache: &ArtifactCache,
    options: &DispatchOptions,
    events: Option<&Sender<ProcessEvent>>,
) -> Result<DispatchReport, DispatchError> {
    let emit = |event: ProcessEvent| {
        if let Some(tx) = events {
            tx.send(event).ok();
        }
    };

    let mut report = DispatchReport::default();
    let mut groups: BTreeMap<Method, Vec<&EnlargeTask>> = BTreeMap::new();
    for task in &plan.tasks {
        if task.cached {
            report.cached.push(task.key());
            emit(ProcessEvent::Enlarged {
                key: task.key(),
                dependents: task.dependents.clone(),
                status: UnitStatus::Cached,
            });
        } else {
            groups.entry(task.method).or_default().push(task);
        }
    }
    if groups.is_empty() {
        return Ok(report);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.concurrency.max(1))
        .build()?;
    let max_attempts = options.max_attempts.max(1);

    for (method, mut tasks) in groups {
        tasks.sort_by_key(|t| (t.content, t.bucket));
        emit(ProcessEvent::MethodStarted {
            method,
            tasks: tasks.len(),
        });

        if let Err(e) = enlarger.prepare(method) {
            for task in &tasks {
                let result = Err(failure(task, 0, format!("prepare failed: {e}")));
                emit(record(&mut report, task, result));
            }
            continue;
        }

        let (tx, rx) = mpsc::channel();
        std::thread::scope(|s| {
            s.spawn(|| {
                pool.install(|| {
                    tasks
                        .par_iter()
                        .enumerate()
                        .for_each_with(tx, |tx, (i, task)| {
                            tx.send((i, run_task(enlarger, task, cache, max_attempts)))
                                .ok();
                        })
                })
            });

            // Out-of-order completions wait here until their predecessors finish
            let mut done = BTreeMap::new();
            let mut next = 0;
            for (i, result) in rx {
                done.insert(i, result);
                while let Some(result) = done.remove(&next) {
                    emit(record(&mut report, tasks[next], result));
                    next += 1;
                }
            }
        });
    }

    Ok(report)
}

/// Add one task outcome to `report` and build its event.
fn record(
    report: &mut DispatchReport,
    task: &EnlargeTask,
    result: Result<ArtifactKey, EnlargementFailure>,
) -> ProcessEvent {
    let status = match result {
        Ok(key) => {
            report.performed.push(key);
            UnitStatus::Done
        }
        Err(f) => {
            let message = f.to_string();
            report.failures.push(f);
            UnitStatus::Failed(message)
        }
    };
    ProcessEvent::Enlarged {
        key: task.key(),
        dependents: task.dependents.clone(),
        status,
    }
}

fn run_task(
    enlarger: &impl Enlarger,
    task: &EnlargeTask,
    cache: &ArtifactCache,
    max_attempts: u32,
) -> Result<ArtifactKey, EnlargementFailure> {
    let request = EnlargeRequest {
        source: cache.path(&task.source_key()),
        method: task.method,
        width: task.width,
        height: task.height,
        factor: task.factor,
    };
    let mut last_error = String::new();
    for _ in 0..max_attempts {
        match enlarge_once(enlarger, &request, task, cache) {
            Ok(key) => return Ok(key),
            Err(e) => last_error = e.to_string(),
        }
    }
    Err(failure(task, max_attempts, last_error))
}

fn enlarge_once(
    enlarger: &impl Enlarger,
    request: &EnlargeRequest,
    task: &EnlargeTask,
    cache: &ArtifactCache,
) -> Result<ArtifactKey, BackendError> {
    let img = enlarger.enlarge(request)?;
    if (img.width(), img.height()) != (request.width, request.height) {
        return Err(BackendError::ProcessingFailed(format!(
            "backend returned {}x{}, expected {}x{}",
            img.width(),
            img.height(),
            request.width,
            request.height
        )));
    }
    let key = task.key();
    cache.write_atomic(&key, &encode_png(&img)?)?;
    Ok(key)
}

fn failure(task: &EnlargeTask, attempts: u32, message: String) -> EnlargementFailure {
    EnlargementFailure {
        content: task.content,
        bucket: task.bucket,
        method: task.method,
        file: file_name(&task.key()),
        attempts,
        message,
    }
}
