//! Canonical resolution buckets.
//!
//! Base images are only ever rendered at one of four fixed resolutions. Every
//! device in the table is mapped onto exactly one of them by aspect ratio:
//!
//! | Bucket | Resolution | Aspect ratio (`w / h`) |
//! |--------|------------|------------------------|
//! | 0 | 896×1920  | `ar < 0.6` |
//! | 1 | 1088×1472 | `0.6 ≤ ar < 1.15` |
//! | 2 | 1536×1024 | `1.15 ≤ ar < 1.65` |
//! | 3 | 1728×960  | `ar ≥ 1.65` |
//!
//! The ranges are contiguous and cover `(0, ∞)`; each boundary belongs to the
//! upper bucket.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lower aspect-ratio bound of buckets 1, 2 and 3.
const BOUNDARIES: [f64; 3] = [0.6, 1.15, 1.65];

/// One of the four canonical base resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Bucket {
    TallPortrait,
    Portrait,
    Landscape,
    Wide,
}

impl Bucket {
    /// All buckets in id order.
    pub const ALL: [Bucket; 4] = [
        Bucket::TallPortrait,
        Bucket::Portrait,
        Bucket::Landscape,
        Bucket::Wide,
    ];

    /// Numeric id (0–3) used in config files and reports.
    pub fn id(self) -> u8 {
        match self {
            Bucket::TallPortrait => 0,
            Bucket::Portrait => 1,
            Bucket::Landscape => 2,
            Bucket::Wide => 3,
        }
    }

    pub fn from_id(id: u8) -> Option<Bucket> {
        Bucket::ALL.get(id as usize).copied()
    }

    /// Base render resolution as `(width, height)`.
    pub fn resolution(self) -> (u32, u32) {
        match self {
            Bucket::TallPortrait => (896, 1920),
            Bucket::Portrait => (1088, 1472),
            Bucket::Landscape => (1536, 1024),
            Bucket::Wide => (1728, 960),
        }
    }

    pub fn width(self) -> u32 {
        self.resolution().0
    }

    pub fn height(self) -> u32 {
        self.resolution().1
    }

    /// Find the bucket whose base resolution is exactly `width × height`.
    ///
    /// Used when reconstructing cache state from base image filenames.
    pub fn from_resolution(width: u32, height: u32) -> Option<Bucket> {
        Bucket::ALL
            .into_iter()
            .find(|b| b.resolution() == (width, height))
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.resolution();
        write!(f, "bucket {} ({}x{})", self.id(), w, h)
    }
}

impl TryFrom<u8> for Bucket {
    type Error = String;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Bucket::from_id(id).ok_or_else(|| format!("bucket id must be 0-3, got {id}"))
    }
}

impl From<Bucket> for u8 {
    fn from(bucket: Bucket) -> u8 {
        bucket.id()
    }
}

/// Classify a `width × height` rectangle into its bucket.
///
/// Both dimensions must be non-zero; callers validate device tables before
/// classification.
pub fn classify(width: u32, height: u32) -> Bucket {
    debug_assert!(width > 0 && height > 0);
    let ar = width as f64 / height as f64;
    if ar < BOUNDARIES[0] {
        Bucket::TallPortrait
    } else if ar < BOUNDARIES[1] {
        Bucket::Portrait
    } else if ar < BOUNDARIES[2] {
        Bucket::Landscape
    } else {
        Bucket::Wide
    }
}
