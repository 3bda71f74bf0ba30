//! Artifact filename convention.
//!
//! Filenames are the only record of what a previous run completed, so every
//! artifact name encodes its full [`ArtifactKey`] and parses back to it:
//!
//! ```text
//! 000_00_base_896x1920.png                  base render, bucket 0
//! 000_00_upscaled_upscale2x_1792x3840.png   enlargement of that base
//! 000_00_iphone.jpg                         final wallpaper for "iphone"
//! ```
//!
//! The leading `{sequence:03}_{batch:02}` is the content id. Wider numbers are
//! accepted when parsing (sequence 1000 renders as `1000_00`).
//!
//! Files that don't match any pattern, and hidden files (including in-flight
//! `.tmp-*` writes), are not artifacts.

use crate::bucket::Bucket;
use crate::method::Method;
use crate::types::{ArtifactKey, ContentId};

const BASE_MARKER: &str = "base_";
const ENLARGED_MARKER: &str = "upscaled_";

/// Extension of intermediate artifacts (lossless).
pub const INTERMEDIATE_EXT: &str = "png";
/// Extension of final wallpapers.
pub const FINAL_EXT: &str = "jpg";

/// Filename for an artifact key.
pub fn file_name(key: &ArtifactKey) -> String {
    match key {
        ArtifactKey::Base { content, bucket } => {
            let (w, h) = bucket.resolution();
            format!("{content}_{BASE_MARKER}{w}x{h}.{INTERMEDIATE_EXT}")
        }
        ArtifactKey::Enlarged {
            content,
            method,
            width,
            height,
        } => format!("{content}_{ENLARGED_MARKER}{method}_{width}x{height}.{INTERMEDIATE_EXT}"),
        ArtifactKey::Final { content, device_id } => {
            format!("{content}_{device_id}.{FINAL_EXT}")
        }
    }
}

/// Parse a filename back into its artifact key.
///
/// Returns `None` for anything that isn't an artifact of this pipeline.
pub fn parse_artifact_name(name: &str) -> Option<ArtifactKey> {
    if name.starts_with('.') {
        return None;
    }
    let (stem, ext) = name.rsplit_once('.')?;
    let (seq, rest) = stem.split_once('_')?;
    let (batch, rest) = rest.split_once('_')?;
    let content = ContentId::new(parse_number(seq)?, parse_number(batch)?);

    if let Some(dims) = rest.strip_prefix(BASE_MARKER) {
        if ext != INTERMEDIATE_EXT {
            return None;
        }
        let (w, h) = parse_dimensions(dims)?;
        let bucket = Bucket::from_resolution(w, h)?;
        return Some(ArtifactKey::Base { content, bucket });
    }

    if let Some(rest) = rest.strip_prefix(ENLARGED_MARKER) {
        if ext != INTERMEDIATE_EXT {
            return None;
        }
        let (method, dims) = rest.split_once('_')?;
        let method: Method = method.parse().ok()?;
        let (width, height) = parse_dimensions(dims)?;
        return Some(ArtifactKey::Enlarged {
            content,
            method,
            width,
            height,
        });
    }

    if ext != FINAL_EXT || rest.is_empty() {
        return None;
    }
    Some(ArtifactKey::Final {
        content,
        device_id: rest.to_string(),
    })
}

/// Digits only; no sign, no whitespace.
fn parse_number(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Parse `WIDTHxHEIGHT`.
fn parse_dimensions(s: &str) -> Option<(u32, u32)> {
    let (w, h) = s.split_once('x')?;
    Some((parse_number(w)?, parse_number(h)?))
}
