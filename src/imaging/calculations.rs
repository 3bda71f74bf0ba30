//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Geometry of a scale-to-cover followed by a center crop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverFit {
    /// Uniform scale applied to the source, `max(tw / w, th / h)`.
    pub scale: f64,
    /// Source size after scaling. At least one axis equals the target.
    pub scaled_width: u32,
    pub scaled_height: u32,
    /// Top-left corner of the crop window inside the scaled image.
    pub offset_x: u32,
    pub offset_y: u32,
}

/// Calculate the cover-and-center-crop geometry for `source` → `target`.
///
/// On the tight axis the scaled length equals the target exactly; the other
/// axis is rounded and never falls short of the target. The crop offset is
/// `floor(excess / 2)`, so an odd excess leaves the extra pixel on the
/// right or bottom.
///
/// # Arguments
/// * `source` - Image dimensions (width, height), both non-zero
/// * `target` - Output dimensions (width, height), both non-zero
///
/// # Examples
/// ```
/// # use wallfit::imaging::plan_cover_fit;
/// // 2x enlargement of bucket 0 onto an iPhone screen: only the width is cropped
/// let fit = plan_cover_fit((1792, 3840), (1179, 2556));
/// assert_eq!((fit.scaled_width, fit.scaled_height), (1193, 2556));
/// assert_eq!((fit.offset_x, fit.offset_y), (7, 0));
/// ```
pub fn plan_cover_fit(source: (u32, u32), target: (u32, u32)) -> CoverFit {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    if source == target {
        return CoverFit {
            scale: 1.0,
            scaled_width: src_w,
            scaled_height: src_h,
            offset_x: 0,
            offset_y: 0,
        };
    }

    let scale_x = tgt_w as f64 / src_w as f64;
    let scale_y = tgt_h as f64 / src_h as f64;

    let (scale, scaled_width, scaled_height) = if scale_x >= scale_y {
        // Width is tight, height overflows
        let h = ((src_h as f64 * scale_x).round() as u32).max(tgt_h);
        (scale_x, tgt_w, h)
    } else {
        // Height is tight, width overflows
        let w = ((src_w as f64 * scale_y).round() as u32).max(tgt_w);
        (scale_y, w, tgt_h)
    };

    CoverFit {
        scale,
        scaled_width,
        scaled_height,
        offset_x: (scaled_width - tgt_w) / 2,
        offset_y: (scaled_height - tgt_h) / 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_when_sizes_match() {
        let fit = plan_cover_fit((1536, 1024), (1536, 1024));
        assert_eq!(fit.scale, 1.0);
        assert_eq!((fit.offset_x, fit.offset_y), (0, 0));
        assert_eq!((fit.scaled_width, fit.scaled_height), (1536, 1024));
    }

    #[test]
    fn iphone_crops_width_only() {
        let fit = plan_cover_fit((1792, 3840), (1179, 2556));
        assert_eq!(fit.scaled_height, 2556);
        assert_eq!(fit.scaled_width, 1193);
        assert_eq!(fit.offset_x, 7);
        assert_eq!(fit.offset_y, 0);
    }

    #[test]
    fn uhd_from_aurasr_crops_width() {
        // 1728x960 * 4 = 6912x3840 → 3840x2160
        let fit = plan_cover_fit((6912, 3840), (3840, 2160));
        assert_eq!((fit.scaled_width, fit.scaled_height), (3888, 2160));
        assert_eq!((fit.offset_x, fit.offset_y), (24, 0));
    }

    #[test]
    fn wide_source_into_square_target() {
        let fit = plan_cover_fit((200, 100), (50, 50));
        assert_eq!(fit.scale, 0.5);
        assert_eq!((fit.scaled_width, fit.scaled_height), (100, 50));
        assert_eq!((fit.offset_x, fit.offset_y), (25, 0));
    }

    #[test]
    fn tall_source_into_square_target() {
        let fit = plan_cover_fit((100, 200), (50, 50));
        assert_eq!((fit.scaled_width, fit.scaled_height), (50, 100));
        assert_eq!((fit.offset_x, fit.offset_y), (0, 25));
    }

    #[test]
    fn odd_excess_leaves_extra_pixel_bottom_right() {
        // 100x103 → 100x100: scale 1 on width, 3 rows of excess
        let fit = plan_cover_fit((100, 103), (100, 100));
        assert_eq!(fit.scaled_height, 103);
        assert_eq!(fit.offset_y, 1);
    }

    #[test]
    fn magnification_above_one() {
        let fit = plan_cover_fit((100, 100), (300, 150));
        assert_eq!(fit.scale, 3.0);
        assert_eq!((fit.scaled_width, fit.scaled_height), (300, 300));
        assert_eq!(fit.offset_y, 75);
    }

    #[test]
    fn crop_window_always_fits() {
        let sources = [(896, 1920), (1088, 1472), (1536, 1024), (1728, 960), (7, 13)];
        let targets = [(1179, 2556), (3840, 2160), (2048, 2048), (1, 1), (1366, 768)];
        for source in sources {
            for target in targets {
                let fit = plan_cover_fit(source, target);
                assert!(fit.scaled_width >= target.0, "{source:?} -> {target:?}");
                assert!(fit.scaled_height >= target.1, "{source:?} -> {target:?}");
                assert!(fit.scaled_width == target.0 || fit.scaled_height == target.1);
                assert!(fit.offset_x + target.0 <= fit.scaled_width);
                assert!(fit.offset_y + target.1 <= fit.scaled_height);
            }
        }
    }
}
