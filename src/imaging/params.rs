//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the pipeline stages (which decide what to produce) and
//! the [`backend`](super::backend) traits (which do the pixel work), so a
//! mock backend can stand in for a model server in tests.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 95). Clamped on construction.
//! - [`EnlargeRequest`]: One enlargement: source base image, method, exact output size.
//! - [`GenerateRequest`]: One base render: content id, bucket, seed, prompt, size.

use crate::bucket::Bucket;
use crate::method::Method;
use crate::types::ContentId;
use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u8);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(95)
    }
}

/// Parameters for one enlargement.
#[derive(Debug, Clone, PartialEq)]
pub struct EnlargeRequest {
    pub source: PathBuf,
    pub method: Method,
    /// Exact output dimensions expected back.
    pub width: u32,
    pub height: u32,
    /// Magnification being applied; only meaningful for variable-scale methods.
    pub factor: f64,
}

/// Parameters for one base render.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub content: ContentId,
    pub bucket: Bucket,
    pub seed: u64,
    pub prompt: String,
    pub width: u32,
    pub height: u32,
}
