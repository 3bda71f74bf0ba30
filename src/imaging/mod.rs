//! Image processing in pure Rust, no external tools.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` |
//! | **Cover-fit** | `resize_exact` (Lanczos3) + `crop_imm` |
//! | **Encode → JPEG** | `image::codecs::jpeg::JpegEncoder` |
//! | **Encode → PNG** | `image::ImageFormat::Png` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for cover-fit geometry (unit testable)
//! - **Parameters**: Data structures describing enlarge/generate requests
//! - **Backend**: [`Enlarger`] and [`BaseGenerator`] traits + [`ResampleEnlarger`]
//! - **Operations**: Decode, crop, flatten and encode helpers

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, BaseGenerator, Enlarger};
pub use calculations::{CoverFit, plan_cover_fit};
pub use operations::{cover_fit, encode_jpeg, encode_png, load_image};
pub use params::{EnlargeRequest, GenerateRequest, Quality};
pub use rust_backend::ResampleEnlarger;
