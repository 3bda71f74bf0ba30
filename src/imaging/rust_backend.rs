//! Pure Rust enlargement backend, no model server required.
//!
//! Stands in for the GAN and diffusion upscalers so the whole pipeline runs
//! offline. Every method is served the same way:
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (PNG, JPEG) | `image::ImageReader` |
//! | Enlarge | `DynamicImage::resize_exact` with `Lanczos3` filter |
//!
//! The output is a faithful size match for the real methods but adds no
//! detail; swap in a model-backed [`Enlarger`] for production renders.

use super::backend::{BackendError, Enlarger};
use super::operations::load_image;
use super::params::EnlargeRequest;
use crate::method::Method;
use image::DynamicImage;
use image::imageops::FilterType;

/// Lanczos3 resampling enlarger.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResampleEnlarger;

impl ResampleEnlarger {
    pub fn new() -> Self {
        Self
    }
}

impl Enlarger for ResampleEnlarger {
    fn prepare(&self, method: Method) -> Result<(), BackendError> {
        if method.enlarges() {
            Ok(())
        } else {
            Err(BackendError::Unsupported(method))
        }
    }

    fn enlarge(&self, request: &EnlargeRequest) -> Result<DynamicImage, BackendError> {
        if request.width == 0 || request.height == 0 {
            return Err(BackendError::ProcessingFailed(format!(
                "invalid target size {}x{}",
                request.width, request.height
            )));
        }
        let img = load_image(&request.source)?;
        Ok(img.resize_exact(request.width, request.height, FilterType::Lanczos3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::gradient;
    use crate::imaging::operations::encode_png;
    use image::GenericImageView;
    use tempfile::TempDir;

    fn write_source(tmp: &TempDir, w: u32, h: u32) -> std::path::PathBuf {
        let path = tmp.path().join("000_00_base_896x1920.png");
        std::fs::write(&path, encode_png(&gradient(w, h)).unwrap()).unwrap();
        path
    }

    #[test]
    fn enlarges_to_requested_size() {
        let tmp = TempDir::new().unwrap();
        let source = write_source(&tmp, 9, 19);
        let out = ResampleEnlarger
            .enlarge(&EnlargeRequest {
                source,
                method: Method::Upscale2x,
                width: 18,
                height: 38,
                factor: 2.0,
            })
            .unwrap();
        assert_eq!(out.dimensions(), (18, 38));
    }

    #[test]
    fn missing_source_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let result = ResampleEnlarger.enlarge(&EnlargeRequest {
            source: tmp.path().join("missing.png"),
            method: Method::AuraSr,
            width: 8,
            height: 8,
            factor: 4.0,
        });
        assert!(result.is_err());
    }

    #[test]
    fn zero_target_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let source = write_source(&tmp, 4, 4);
        let result = ResampleEnlarger.enlarge(&EnlargeRequest {
            source,
            method: Method::Usdu,
            width: 0,
            height: 8,
            factor: 2.0,
        });
        assert!(matches!(result, Err(BackendError::ProcessingFailed(_))));
    }

    #[test]
    fn prepare_rejects_none() {
        assert!(ResampleEnlarger.prepare(Method::Upscale4x).is_ok());
        assert!(matches!(
            ResampleEnlarger.prepare(Method::None),
            Err(BackendError::Unsupported(Method::None))
        ));
    }
}
