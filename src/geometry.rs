//! Target-geometry arithmetic for the four operations.
//!
//! Everything here is pure integer/float math on pixel dimensions so it can be
//! tested without decoding a single image. Fractional results are floored,
//! matching how a canvas truncates a fractional `width`/`height` assignment.

use crate::error::ImgKitError;
use serde::{Deserialize, Serialize};

/// Pixel dimensions of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// `width / height` as a float.
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Largest edge a drawing surface may have.
pub const MAX_SURFACE_SIDE: u32 = 32_767;
/// Largest pixel count a drawing surface may have (16384²).
pub const MAX_SURFACE_PIXELS: u64 = 268_435_456;

/// Check `dims` against the surface limits before anything is allocated.
///
/// Returns the reason on failure so callers can wrap it in the error kind
/// that fits their stage.
pub fn check_surface(dims: Dimensions) -> Result<(), String> {
    if dims.width > MAX_SURFACE_SIDE || dims.height > MAX_SURFACE_SIDE {
        return Err(format!(
            "{}x{} exceeds the maximum surface edge of {MAX_SURFACE_SIDE} px",
            dims.width, dims.height
        ));
    }
    if dims.width as u64 * dims.height as u64 > MAX_SURFACE_PIXELS {
        return Err(format!(
            "{}x{} exceeds the maximum surface area of {MAX_SURFACE_PIXELS} px",
            dims.width, dims.height
        ));
    }
    Ok(())
}

/// A source sub-rectangle, in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Intersect the rectangle with the source bounds.
    ///
    /// Returns `None` when nothing of the rectangle lies inside the source.
    pub fn clamp_to(&self, src: Dimensions) -> Option<CropRect> {
        let x0 = self.x.min(src.width);
        let y0 = self.y.min(src.height);
        let x1 = self.x.saturating_add(self.width).min(src.width);
        let y1 = self.y.saturating_add(self.height).min(src.height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(CropRect::new(x0, y0, x1 - x0, y1 - y0))
    }
}

fn floor_px(v: f64) -> u32 {
    (v.floor() as u32).max(1)
}

/// Scale `src` down (never up) to fit inside `max_width × max_height`,
/// preserving aspect ratio.
///
/// `scale = min(max_width / w, max_height / h, 1)`.
pub fn fit_within(src: Dimensions, max_width: u32, max_height: u32) -> Dimensions {
    if src.is_empty() {
        return src;
    }
    let scale = (max_width as f64 / src.width as f64)
        .min(max_height as f64 / src.height as f64)
        .min(1.0);
    if scale >= 1.0 {
        return src;
    }
    Dimensions::new(
        floor_px(src.width as f64 * scale),
        floor_px(src.height as f64 * scale),
    )
}

/// Absolute pixel target.
///
/// With `maintain_aspect_ratio`, the dimension that would distort the source
/// proportions is recomputed from the other one so the result fits the
/// requested box.
pub fn resize_to_pixels(
    src: Dimensions,
    width: u32,
    height: u32,
    maintain_aspect_ratio: bool,
) -> Dimensions {
    if !maintain_aspect_ratio || src.is_empty() || height == 0 {
        return Dimensions::new(width, height);
    }
    let aspect = src.aspect_ratio();
    if width as f64 / height as f64 > aspect {
        Dimensions::new(floor_px(height as f64 * aspect), height)
    } else {
        Dimensions::new(width, floor_px(width as f64 / aspect))
    }
}

/// Scale both axes by `percentage / 100`, floored.
pub fn resize_by_percentage(src: Dimensions, percentage: u32) -> Dimensions {
    let f = percentage as f64 / 100.0;
    Dimensions::new(
        (src.width as f64 * f).floor() as u32,
        (src.height as f64 * f).floor() as u32,
    )
}

/// Largest centred square: side = `min(w, h)`.
pub fn square_crop(src: Dimensions) -> CropRect {
    let side = src.width.min(src.height);
    CropRect::new((src.width - side) / 2, (src.height - side) / 2, side, side)
}

/// Parse a `"W:H"` ratio string into its two positive terms.
pub fn parse_ratio(ratio: &str) -> Result<(f64, f64), ImgKitError> {
    let invalid = || ImgKitError::InvalidConfig(format!("Invalid aspect ratio '{ratio}', expected W:H"));
    let (w, h) = ratio.split_once(':').ok_or_else(invalid)?;
    let w: f64 = w.trim().parse().map_err(|_| invalid())?;
    let h: f64 = h.trim().parse().map_err(|_| invalid())?;
    if !(w.is_finite() && h.is_finite()) || w <= 0.0 || h <= 0.0 {
        return Err(invalid());
    }
    Ok((w, h))
}

/// Largest centred region of the requested aspect ratio.
///
/// When the source is wider than the target the height is kept and the width
/// is cropped symmetrically; otherwise the width is kept and the height is
/// cropped.
pub fn ratio_crop(src: Dimensions, width_ratio: f64, height_ratio: f64) -> CropRect {
    let target = width_ratio / height_ratio;
    if src.aspect_ratio() > target {
        let crop_w = floor_px(src.height as f64 * target).min(src.width);
        CropRect::new((src.width - crop_w) / 2, 0, crop_w, src.height)
    } else {
        let crop_h = floor_px(src.width as f64 / target).min(src.height);
        CropRect::new(0, (src.height - crop_h) / 2, src.width, crop_h)
    }
}

/// `round((1 − compressed / original) × 100)`.
///
/// Negative when the output grew. Zero for an empty original.
pub fn calculate_compression_ratio(original_size: u64, compressed_size: u64) -> i64 {
    if original_size == 0 {
        return 0;
    }
    ((1.0 - compressed_size as f64 / original_size as f64) * 100.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_ratio_reference_value() {
        assert_eq!(calculate_compression_ratio(100_000, 60_000), 40);
        assert_eq!(calculate_compression_ratio(100, 150), -50);
        assert_eq!(calculate_compression_ratio(0, 10), 0);
    }

    #[test]
    fn fit_within_never_upscales() {
        let src = Dimensions::new(640, 480);
        assert_eq!(fit_within(src, 2048, 2048), src);
    }

    #[test]
    fn fit_within_bounds_and_aspect() {
        let cases = [
            (Dimensions::new(4000, 3000), 1024),
            (Dimensions::new(3000, 4000), 1024),
            (Dimensions::new(5000, 500), 300),
            (Dimensions::new(1999, 1001), 100),
            (Dimensions::new(4096, 4096), 4095),
        ];
        for (src, w) in cases {
            let out = fit_within(src, w, w);
            assert!(out.width.max(out.height) <= w, "{src:?} → {out:?}");
            let expected = src.aspect_ratio();
            let got = out.aspect_ratio();
            // one pixel of flooring on the short side
            let tolerance = expected / out.height.min(out.width) as f64 + 0.01;
            assert!((expected - got).abs() <= tolerance, "{src:?} → {out:?}");
        }
    }

    #[test]
    fn fit_within_limits_each_axis_independently() {
        let out = fit_within(Dimensions::new(2000, 1000), 1000, 200);
        assert_eq!(out, Dimensions::new(400, 200));
    }

    #[test]
    fn surface_limits() {
        assert!(check_surface(Dimensions::new(32_767, 100)).is_ok());
        assert!(check_surface(Dimensions::new(16_384, 16_384)).is_ok());
        assert!(check_surface(Dimensions::new(32_768, 1)).is_err());
        assert!(check_surface(Dimensions::new(1, 60_000)).is_err());
        // each edge in range, area not
        let err = check_surface(Dimensions::new(20_000, 20_000)).unwrap_err();
        assert!(err.contains("area"), "{err}");
    }

    #[test]
    fn percentage_halves() {
        let out = resize_by_percentage(Dimensions::new(800, 600), 50);
        assert_eq!(out, Dimensions::new(400, 300));
    }

    #[test]
    fn percentage_floors() {
        let out = resize_by_percentage(Dimensions::new(333, 101), 33);
        assert_eq!(out, Dimensions::new(109, 33));
    }

    #[test]
    fn pixels_unlocked_is_exact() {
        let out = resize_to_pixels(Dimensions::new(1600, 800), 800, 600, false);
        assert_eq!(out, Dimensions::new(800, 600));
    }

    #[test]
    fn pixels_locked_recomputes_height() {
        let out = resize_to_pixels(Dimensions::new(1600, 800), 800, 600, true);
        assert_eq!(out, Dimensions::new(800, 400));
    }

    #[test]
    fn pixels_locked_recomputes_width() {
        // portrait source into a landscape box: width is recomputed
        let out = resize_to_pixels(Dimensions::new(600, 1200), 800, 600, true);
        assert_eq!(out, Dimensions::new(300, 600));
    }

    #[test]
    fn square_crop_is_centred() {
        let rect = square_crop(Dimensions::new(1200, 800));
        assert_eq!(rect, CropRect::new(200, 0, 800, 800));
        assert_eq!(rect.x + rect.width, 1000);

        let rect = square_crop(Dimensions::new(300, 500));
        assert_eq!(rect, CropRect::new(0, 100, 300, 300));
    }

    #[test]
    fn ratio_crop_height_limited() {
        let (w, h) = parse_ratio("16:9").unwrap();
        let rect = ratio_crop(Dimensions::new(1000, 1000), w, h);
        assert_eq!(rect.width, 1000);
        assert!(rect.height == 562 || rect.height == 563, "{rect:?}");
        assert_eq!(rect.x, 0);
        // vertically centred
        let top = rect.y;
        let bottom = 1000 - rect.y - rect.height;
        assert!(top.abs_diff(bottom) <= 1, "{rect:?}");
    }

    #[test]
    fn ratio_crop_width_limited() {
        let (w, h) = parse_ratio("1:1").unwrap();
        let rect = ratio_crop(Dimensions::new(1600, 900), w, h);
        assert_eq!(rect, CropRect::new(350, 0, 900, 900));
    }

    #[test]
    fn parse_ratio_rejects_garbage() {
        assert!(parse_ratio("16x9").is_err());
        assert!(parse_ratio("0:9").is_err());
        assert!(parse_ratio("a:b").is_err());
        assert!(parse_ratio("4:").is_err());
        assert_eq!(parse_ratio(" 3 : 2 ").unwrap(), (3.0, 2.0));
    }

    #[test]
    fn clamp_rect_to_bounds() {
        let src = Dimensions::new(100, 80);
        assert_eq!(
            CropRect::new(50, 40, 500, 500).clamp_to(src),
            Some(CropRect::new(50, 40, 50, 40))
        );
        assert_eq!(CropRect::new(100, 0, 10, 10).clamp_to(src), None);
        assert_eq!(
            CropRect::new(0, 0, 10, 10).clamp_to(src),
            Some(CropRect::new(0, 0, 10, 10))
        );
        assert_eq!(CropRect::new(u32::MAX, 0, u32::MAX, 5).clamp_to(src), None);
    }
}
