//! High-level image operations.
//!
//! These functions combine the pure geometry in [`calculations`](super::calculations)
//! with pixel work from the `image` crate: decode, cover-fit, flatten, encode.
//! None of them touch the output directory; persisting bytes is the cache's job.

use super::backend::BackendError;
use super::calculations::plan_cover_fit;
use super::params::Quality;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Decode an image from disk.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    Ok(ImageReader::open(path)?.with_guessed_format()?.decode()?)
}

/// Scale `img` to cover `width × height`, then center-crop to exactly that size.
///
/// An image already at the target size is returned unchanged.
pub fn cover_fit(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    if (img.width(), img.height()) == (width, height) {
        return img.clone();
    }
    let fit = plan_cover_fit((img.width(), img.height()), (width, height));
    if (fit.scaled_width, fit.scaled_height) == (img.width(), img.height()) {
        return img.crop_imm(fit.offset_x, fit.offset_y, width, height);
    }
    img.resize_exact(fit.scaled_width, fit.scaled_height, FilterType::Lanczos3)
        .crop_imm(fit.offset_x, fit.offset_y, width, height)
}

/// Drop the alpha channel by compositing onto white.
pub fn flatten_to_rgb(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let a = a as u32;
        let over_white = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        Rgb([over_white(r), over_white(g), over_white(b)])
    })
}

/// Encode as baseline JPEG. Alpha is flattened onto white first.
pub fn encode_jpeg(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgb8(flatten_to_rgb(img));
    let mut buf = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality.value()))?;
    Ok(buf)
}

/// Encode as PNG (lossless, used for intermediates).
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::gradient;
    use image::{GenericImageView, Rgba, RgbaImage};
    use tempfile::TempDir;

    #[test]
    fn cover_fit_returns_exact_target() {
        let img = gradient(180, 384);
        for (w, h) in [(118, 256), (100, 100), (300, 120), (1, 1)] {
            let out = cover_fit(&img, w, h);
            assert_eq!(out.dimensions(), (w, h));
        }
    }

    #[test]
    fn cover_fit_same_size_is_unchanged() {
        let img = gradient(64, 48);
        let out = cover_fit(&img, 64, 48);
        assert_eq!(out.to_rgb8().as_raw(), img.to_rgb8().as_raw());
    }

    #[test]
    fn cover_fit_is_idempotent() {
        let img = gradient(200, 120);
        let once = cover_fit(&img, 90, 90);
        let twice = cover_fit(&once, 90, 90);
        assert_eq!(once.to_rgb8().as_raw(), twice.to_rgb8().as_raw());
    }

    #[test]
    fn cover_fit_crop_is_centered() {
        // No scaling (width already tight), 20 columns of excess: crop starts at x=10
        let img = gradient(120, 50);
        let out = cover_fit(&img, 100, 50);
        assert_eq!(out.to_rgb8().get_pixel(0, 0).0[0], 10);
    }

    #[test]
    fn flatten_composites_alpha_over_white() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgba([0, 0, 0, 0])
            } else {
                Rgba([10, 20, 30, 255])
            }
        }));
        let rgb = flatten_to_rgb(&img);
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(rgb.get_pixel(1, 0).0, [10, 20, 30]);
    }

    #[test]
    fn jpeg_encoding_is_deterministic() {
        let img = gradient(40, 30);
        let a = encode_jpeg(&img, Quality::default()).unwrap();
        let b = encode_jpeg(&img, Quality::default()).unwrap();
        assert_eq!(a, b);
        assert_eq!(&a[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn png_round_trips_through_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("img.png");
        let img = gradient(16, 9);
        std::fs::write(&path, encode_png(&img).unwrap()).unwrap();

        let loaded = load_image(&path).unwrap();
        assert_eq!(loaded.dimensions(), (16, 9));
        assert_eq!(loaded.to_rgb8().as_raw(), img.to_rgb8().as_raw());
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let result = load_image(&tmp.path().join("nope.png"));
        assert!(matches!(result, Err(BackendError::Io(_))));
    }
}
