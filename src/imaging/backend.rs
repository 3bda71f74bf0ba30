//! Collaborator traits and shared types.
//!
//! The pixel work this crate orchestrates lives behind two traits:
//!
//! - [`Enlarger`]: the enlargement backend (GAN upscalers, diffusion repaint
//!   upscalers). Switching methods is expensive on real backends, so the
//!   dispatcher calls [`Enlarger::prepare`] once per method group.
//! - [`BaseGenerator`]: the image-generation backend producing base renders.
//!
//! Both return decoded images; writing them to disk (atomically, under the
//! artifact naming scheme) is the caller's job. The bundled implementation is
//! [`ResampleEnlarger`](super::rust_backend::ResampleEnlarger).

use super::params::{EnlargeRequest, GenerateRequest};
use crate::method::Method;
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Method {0} is not supported by this backend")]
    Unsupported(Method),
}

impl From<image::ImageError> for BackendError {
    fn from(e: image::ImageError) -> Self {
        BackendError::ProcessingFailed(e.to_string())
    }
}

/// Enlargement backend.
///
/// Implementations must be `Sync`: tasks of one method group may run on
/// several rayon workers at once.
pub trait Enlarger: Sync {
    /// Called once before a contiguous run of tasks for `method` (model load).
    fn prepare(&self, _method: Method) -> Result<(), BackendError> {
        Ok(())
    }

    /// Enlarge `request.source` to exactly `request.width × request.height`.
    fn enlarge(&self, request: &EnlargeRequest) -> Result<DynamicImage, BackendError>;
}

/// Base-image generation backend.
///
/// Must be deterministic for identical requests: every bucket of one content
/// id is rendered with the same seed and prompt.
pub trait BaseGenerator: Sync {
    fn generate(&self, request: &GenerateRequest) -> Result<DynamicImage, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::bucket::Bucket;
    use crate::types::ContentId;
    use image::RgbImage;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Synthetic gradient image, deterministic for given dimensions.
    pub fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    /// Mock enlarger that records calls and returns a synthetic image of the
    /// requested size. Uses Mutex (not RefCell) so it is Sync for rayon.
    #[derive(Default)]
    pub struct MockEnlarger {
        pub operations: Mutex<Vec<RecordedOp>>,
        /// Sources (by file name) whose enlargement always fails.
        pub failing: Mutex<HashSet<String>>,
        /// Remaining transient failures before calls start succeeding.
        pub transient_failures: Mutex<u32>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Prepare(Method),
        Enlarge {
            source: PathBuf,
            method: Method,
            width: u32,
            height: u32,
        },
    }

    impl MockEnlarger {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_on(file_name: &str) -> Self {
            let mock = Self::default();
            mock.failing.lock().unwrap().insert(file_name.to_string());
            mock
        }

        pub fn flaky(failures: u32) -> Self {
            let mock = Self::default();
            *mock.transient_failures.lock().unwrap() = failures;
            mock
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn enlarge_count(&self) -> usize {
            self.get_operations()
                .iter()
                .filter(|op| matches!(op, RecordedOp::Enlarge { .. }))
                .count()
        }
    }

    impl Enlarger for MockEnlarger {
        fn prepare(&self, method: Method) -> Result<(), BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Prepare(method));
            Ok(())
        }

        fn enlarge(&self, request: &EnlargeRequest) -> Result<DynamicImage, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Enlarge {
                source: request.source.clone(),
                method: request.method,
                width: request.width,
                height: request.height,
            });

            let name = request
                .source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if self.failing.lock().unwrap().contains(&name) {
                return Err(BackendError::ProcessingFailed(format!(
                    "backend rejected {name}"
                )));
            }
            let mut remaining = self.transient_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(BackendError::ProcessingFailed("timeout".into()));
            }
            Ok(gradient(request.width, request.height))
        }
    }

    /// Mock generator that records requests and renders a gradient whose
    /// blue channel is derived from the seed.
    #[derive(Default)]
    pub struct MockGenerator {
        pub requests: Mutex<Vec<(ContentId, Bucket, u64)>>,
    }

    impl MockGenerator {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get_requests(&self) -> Vec<(ContentId, Bucket, u64)> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl BaseGenerator for MockGenerator {
        fn generate(&self, request: &GenerateRequest) -> Result<DynamicImage, BackendError> {
            self.requests
                .lock()
                .unwrap()
                .push((request.content, request.bucket, request.seed));
            let blue = (request.seed % 256) as u8;
            Ok(DynamicImage::ImageRgb8(RgbImage::from_fn(
                request.width,
                request.height,
                |x, y| image::Rgb([(x % 256) as u8, (y % 256) as u8, blue]),
            )))
        }
    }

    #[test]
    fn mock_records_prepare_and_enlarge() {
        let backend = MockEnlarger::new();
        backend.prepare(Method::AuraSr).unwrap();
        let img = backend
            .enlarge(&EnlargeRequest {
                source: "/out/000_00_base_1728x960.png".into(),
                method: Method::AuraSr,
                width: 64,
                height: 32,
                factor: 4.0,
            })
            .unwrap();

        assert_eq!((img.width(), img.height()), (64, 32));
        let ops = backend.get_operations();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0], RecordedOp::Prepare(Method::AuraSr));
        assert!(matches!(
            &ops[1],
            RecordedOp::Enlarge {
                method: Method::AuraSr,
                width: 64,
                height: 32,
                ..
            }
        ));
    }

    #[test]
    fn mock_failing_source_errors() {
        let backend = MockEnlarger::failing_on("bad.png");
        let result = backend.enlarge(&EnlargeRequest {
            source: "/out/bad.png".into(),
            method: Method::Upscale2x,
            width: 4,
            height: 4,
            factor: 2.0,
        });
        assert!(matches!(result, Err(BackendError::ProcessingFailed(_))));
    }

    #[test]
    fn mock_flaky_recovers() {
        let backend = MockEnlarger::flaky(1);
        let request = EnlargeRequest {
            source: "/out/a.png".into(),
            method: Method::Upscale2x,
            width: 4,
            height: 4,
            factor: 2.0,
        };
        assert!(backend.enlarge(&request).is_err());
        assert!(backend.enlarge(&request).is_ok());
    }
}
