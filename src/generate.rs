//! Base-image generation phase.
//!
//! Renders the base image of every content id at every bucket the device
//! table needs, through a [`BaseGenerator`]. All buckets of one content id
//! share one seed so they show the same picture at different aspect ratios.
//!
//! Seeds are derived, not drawn: [`derive_seed`] hashes the prompt and the
//! content id with SHA-256. A resumed run that finds one bucket missing
//! regenerates it with the seed its siblings were rendered with.
//!
//! Existing base files are never regenerated or overwritten.

use crate::bucket::Bucket;
use crate::cache::{ArtifactCache, RunStats};
use crate::imaging::{BackendError, BaseGenerator, GenerateRequest, encode_png};
use crate::naming::file_name;
use crate::process::{ProcessEvent, UnitStatus};
use crate::types::{ArtifactKey, ContentId};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::mpsc::Sender;
use thiserror::Error;

/// One content id to render, with the prompt it is rendered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationJob {
    pub content: ContentId,
    pub prompt: String,
}

/// Jobs for `batches` renders of each prompt; prompt index is the sequence.
pub fn jobs_for_prompts(prompts: &[String], batches: u32) -> Vec<GenerationJob> {
    prompts
        .iter()
        .enumerate()
        .flat_map(|(sequence, prompt)| {
            (0..batches).map(move |batch| GenerationJob {
                content: ContentId::new(sequence as u32, batch),
                prompt: prompt.clone(),
            })
        })
        .collect()
}

/// Deterministic seed for a content id.
pub fn derive_seed(prompt: &str, content: ContentId) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(b"seed\0");
    hasher.update(prompt.as_bytes());
    hasher.update(b"\0");
    hasher.update(content.sequence.to_le_bytes());
    hasher.update(content.batch.to_le_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// A base image that could not be generated.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{file}: {message}")]
pub struct GenerationFailure {
    pub content: ContentId,
    pub bucket: Bucket,
    pub file: String,
    pub message: String,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct GenerateReport {
    pub generated: Vec<ArtifactKey>,
    pub cached: Vec<ArtifactKey>,
    pub failures: Vec<GenerationFailure>,
}

impl GenerateReport {
    pub fn stats(&self) -> RunStats {
        RunStats {
            cached: self.cached.len() as u32,
            performed: self.generated.len() as u32,
            failed: self.failures.len() as u32,
        }
    }
}

/// Generate every missing base image for `jobs` × `buckets`.
///
/// Runs sequentially; generation backends serve one request at a time.
pub fn generate_bases(
    generator: &impl BaseGenerator,
    cache: &ArtifactCache,
    jobs: &[GenerationJob],
    buckets: &[Bucket],
    events: Option<&Sender<ProcessEvent>>,
) -> GenerateReport {
    let mut buckets = buckets.to_vec();
    buckets.sort();
    buckets.dedup();

    let mut report = GenerateReport::default();
    for job in jobs {
        let seed = derive_seed(&job.prompt, job.content);
        for &bucket in &buckets {
            let key = ArtifactKey::Base {
                content: job.content,
                bucket,
            };
            let status = if cache.is_cached(&key) {
                report.cached.push(key.clone());
                UnitStatus::Cached
            } else {
                match generate_one(generator, cache, job, bucket, seed, &key) {
                    Ok(()) => {
                        report.generated.push(key.clone());
                        UnitStatus::Done
                    }
                    Err(e) => {
                        let message = e.to_string();
                        report.failures.push(GenerationFailure {
                            content: job.content,
                            bucket,
                            file: file_name(&key),
                            message: message.clone(),
                        });
                        UnitStatus::Failed(message)
                    }
                }
            };
            if let Some(tx) = events {
                tx.send(ProcessEvent::Generated { key, seed, status }).ok();
            }
        }
    }
    report
}

fn generate_one(
    generator: &impl BaseGenerator,
    cache: &ArtifactCache,
    job: &GenerationJob,
    bucket: Bucket,
    seed: u64,
    key: &ArtifactKey,
) -> Result<(), BackendError> {
    let (width, height) = bucket.resolution();
    let img = generator.generate(&GenerateRequest {
        content: job.content,
        bucket,
        seed,
        prompt: job.prompt.clone(),
        width,
        height,
    })?;
    if (img.width(), img.height()) != (width, height) {
        return Err(BackendError::ProcessingFailed(format!(
            "generator returned {}x{}, expected {width}x{height}",
            img.width(),
            img.height()
        )));
    }
    cache.write_atomic(key, &encode_png(&img)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockGenerator;
    use tempfile::TempDir;

    fn one_job() -> Vec<GenerationJob> {
        vec![GenerationJob {
            content: ContentId::new(0, 0),
            prompt: "misty fjord at dawn".into(),
        }]
    }

    #[test]
    fn seed_is_stable_and_content_specific() {
        let a = derive_seed("fjord", ContentId::new(0, 0));
        assert_eq!(a, derive_seed("fjord", ContentId::new(0, 0)));
        assert_ne!(a, derive_seed("fjord", ContentId::new(0, 1)));
        assert_ne!(a, derive_seed("fjord", ContentId::new(1, 0)));
        assert_ne!(a, derive_seed("desert", ContentId::new(0, 0)));
    }

    #[test]
    fn jobs_for_prompts_numbers_sequences_and_batches() {
        let jobs = jobs_for_prompts(&["a".to_string(), "b".to_string()], 2);
        let ids: Vec<String> = jobs.iter().map(|j| j.content.to_string()).collect();
        assert_eq!(ids, vec!["000_00", "000_01", "001_00", "001_01"]);
        assert_eq!(jobs[2].prompt, "b");
    }

    #[test]
    fn generates_each_bucket_with_shared_seed() {
        let tmp = TempDir::new().unwrap();
        let cache = ArtifactCache::new(tmp.path());
        let generator = MockGenerator::new();

        let report = generate_bases(
            &generator,
            &cache,
            &one_job(),
            &[Bucket::Wide, Bucket::TallPortrait],
            None,
        );

        assert_eq!(report.generated.len(), 2);
        assert!(tmp.path().join("000_00_base_896x1920.png").exists());
        assert!(tmp.path().join("000_00_base_1728x960.png").exists());
        let requests = generator.get_requests();
        assert_eq!(requests[0].1, Bucket::TallPortrait);
        assert_eq!(requests[0].2, requests[1].2);
    }

    #[test]
    fn existing_bases_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let cache = ArtifactCache::new(tmp.path());
        let key = ArtifactKey::Base {
            content: ContentId::new(0, 0),
            bucket: Bucket::Wide,
        };
        cache.write_atomic(&key, b"keep me").unwrap();
        let generator = MockGenerator::new();

        let report = generate_bases(
            &generator,
            &cache,
            &one_job(),
            &[Bucket::Wide, Bucket::Portrait],
            None,
        );

        assert_eq!(report.cached, vec![key.clone()]);
        assert_eq!(report.generated.len(), 1);
        assert_eq!(generator.get_requests().len(), 1);
        assert_eq!(std::fs::read(cache.path(&key)).unwrap(), b"keep me");
    }

    #[test]
    fn resumed_bucket_gets_original_seed() {
        let tmp = TempDir::new().unwrap();
        let cache = ArtifactCache::new(tmp.path());
        let first = MockGenerator::new();
        generate_bases(&first, &cache, &one_job(), &[Bucket::Wide], None);

        let second = MockGenerator::new();
        generate_bases(
            &second,
            &cache,
            &one_job(),
            &[Bucket::Wide, Bucket::Landscape],
            None,
        );

        assert_eq!(first.get_requests()[0].2, second.get_requests()[0].2);
        assert_eq!(second.get_requests()[0].1, Bucket::Landscape);
    }
}
