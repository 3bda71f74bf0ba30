//! Resume layer: the output directory as completion log.
//!
//! Enlargement through a model server is the bottleneck of the pipeline, and
//! a batch can be killed at any point. This module lets every stage ask
//! "is this artifact already done?" and skip it, so a restarted run
//! recomputes exactly the missing pieces.
//!
//! # Design
//!
//! There is no manifest, journal, or job database. An artifact is complete
//! if and only if a file with its canonical name (see
//! [`naming`](crate::naming)) exists in the output directory. Every stage
//! reconstructs what it needs from a directory listing.
//!
//! ## Atomic writes
//!
//! Presence only means "complete" if a file never appears half-written. All
//! writes go through [`ArtifactCache::write_atomic`]: bytes land in a hidden
//! `.tmp-*` file in the same directory, are synced, and the file is renamed
//! into place. Discovery ([`ArtifactCache::scan`]) skips hidden files, so an
//! interrupted write is invisible. Stale temp files from a killed run are
//! removed by [`ArtifactCache::remove_stale_temp_files`] once they are old
//! enough that no live writer can still own them.
//!
//! One process per output directory is assumed. Two runs sharing a directory
//! would duplicate work, though neither can observe a partial artifact.
//!
//! ## Keys
//!
//! | Key | File |
//! |---|---|
//! | `Base { content, bucket }` | `000_00_base_896x1920.png` |
//! | `Enlarged { content, method, width, height }` | `000_00_upscaled_upscale2x_1792x3840.png` |
//! | `Final { content, device_id }` | `000_00_iphone.jpg` |
//!
//! Enlarged keys carry the output size, so a change in the device table that
//! alters a variable-scale factor produces a new artifact instead of reusing
//! a stale one.

use crate::naming::{file_name, parse_artifact_name};
use crate::types::{ArtifactKey, ContentId};
use std::collections::BTreeSet;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of in-flight write files.
pub const TEMP_PREFIX: &str = ".tmp-";

/// Filesystem-backed artifact store rooted at the output directory.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical on-disk path for `key`.
    pub fn path(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(file_name(key))
    }

    /// Whether the artifact for `key` has been completed.
    pub fn is_cached(&self, key: &ArtifactKey) -> bool {
        self.path(key).is_file()
    }

    /// Write `bytes` as the artifact for `key` via temp file + rename.
    ///
    /// Creates the output directory if needed. Returns the final path.
    pub fn write_atomic(&self, key: &ArtifactKey, bytes: &[u8]) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.path(key);
        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(&format!("-{}", file_name(key)))
            .tempfile_in(&self.root)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(path)
    }

    /// Reconstruct the set of completed artifacts from the directory listing.
    ///
    /// A missing output directory is an empty cache, not an error.
    pub fn scan(&self) -> io::Result<BTreeSet<ArtifactKey>> {
        let mut keys = BTreeSet::new();
        if !self.root.is_dir() {
            return Ok(keys);
        }
        for entry in walkdir::WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(key) = entry.file_name().to_str().and_then(parse_artifact_name) {
                keys.insert(key);
            }
        }
        Ok(keys)
    }

    /// Content ids that have at least one base image on disk, ascending.
    pub fn content_ids(&self) -> io::Result<Vec<ContentId>> {
        let ids: BTreeSet<ContentId> = self
            .scan()?
            .into_iter()
            .filter(|k| matches!(k, ArtifactKey::Base { .. }))
            .map(|k| k.content())
            .collect();
        Ok(ids.into_iter().collect())
    }

    /// Delete the artifact for `key`. Returns whether a file was removed.
    pub fn remove(&self, key: &ArtifactKey) -> io::Result<bool> {
        match std::fs::remove_file(self.path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete `.tmp-*` leftovers from interrupted writes.
    ///
    /// Only files last modified at least `older_than` ago are removed; a
    /// younger temp file may belong to a write still in progress.
    pub fn remove_stale_temp_files(&self, older_than: Duration) -> io::Result<usize> {
        if !self.root.is_dir() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in walkdir::WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
        {
            let entry = entry?;
            let is_temp = entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(TEMP_PREFIX));
            if !entry.file_type().is_file() || !is_temp {
                continue;
            }
            // A modification time in the future counts as fresh
            let age = entry
                .metadata()?
                .modified()?
                .elapsed()
                .unwrap_or(Duration::ZERO);
            if age >= older_than {
                std::fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Summary of work done in a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RunStats {
    /// Artifacts that already existed and were skipped.
    pub cached: u32,
    /// New artifacts produced (generations, enlargements, finals).
    pub performed: u32,
    /// Units that failed and left no artifact.
    pub failed: u32,
}

impl RunStats {
    pub fn hit(&mut self) {
        self.cached += 1;
    }

    pub fn done(&mut self) {
        self.performed += 1;
    }

    pub fn fail(&mut self) {
        self.failed += 1;
    }

    pub fn total(&self) -> u32 {
        self.cached + self.performed + self.failed
    }

    pub fn merge(&mut self, other: RunStats) {
        self.cached += other.cached;
        self.performed += other.performed;
        self.failed += other.failed;
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} artifacts already cached, skipped; {} new operations performed",
            self.cached, self.performed
        )?;
        if self.failed > 0 {
            write!(f, "; {} failed", self.failed)?;
        }
        Ok(())
    }
}
