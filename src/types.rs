//! Shared types used across all pipeline stages.
//!
//! A [`ContentId`] names one generated picture; an [`ArtifactKey`] names one
//! file derived from it. Keys map one-to-one onto filenames (see
//! [`naming`](crate::naming)), which is what lets a later process rebuild the
//! pipeline state from a directory listing alone.

use crate::bucket::Bucket;
use crate::method::Method;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One prompt variation + seed combination.
///
/// Every bucket render and every device wallpaper of a content id come from
/// the same seed, so they all show "the same picture".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ContentId {
    /// Index of the prompt variation.
    pub sequence: u32,
    /// Batch number within the variation.
    pub batch: u32,
}

impl ContentId {
    pub fn new(sequence: u32, batch: u32) -> Self {
        Self { sequence, batch }
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}_{:02}", self.sequence, self.batch)
    }
}

/// Identity of one on-disk artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ArtifactKey {
    /// Canonical-resolution render produced by the generation phase.
    Base { content: ContentId, bucket: Bucket },
    /// Output of one enlargement method applied to a base image.
    Enlarged {
        content: ContentId,
        method: Method,
        width: u32,
        height: u32,
    },
    /// Finished wallpaper for one device.
    Final {
        content: ContentId,
        device_id: String,
    },
}

impl ArtifactKey {
    pub fn content(&self) -> ContentId {
        match self {
            ArtifactKey::Base { content, .. }
            | ArtifactKey::Enlarged { content, .. }
            | ArtifactKey::Final { content, .. } => *content,
        }
    }
}
