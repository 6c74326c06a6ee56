//! Subject bounding boxes from segmented foreground frames.

use image::{DynamicImage, GenericImageView};
use vseg_models::PixelRect;

/// Thresholds separating subject pixels from the matte.
#[derive(Debug, Clone, Copy)]
pub struct BboxOptions {
    /// Alpha above this marks a subject pixel
    pub alpha_threshold: u8,
    /// Luma above this marks a subject pixel when the frame is opaque
    pub luma_threshold: u8,
}

impl Default for BboxOptions {
    fn default() -> Self {
        Self {
            alpha_threshold: 16,
            luma_threshold: 24,
        }
    }
}

/// Tight box around all subject pixels, or `None` for an empty mask.
///
/// Frames with an alpha channel are masked by alpha. Opaque frames are
/// assumed to sit on a near-black matte and are masked by luma.
pub fn detect_bounding_box(frame: &DynamicImage, options: BboxOptions) -> Option<PixelRect> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let use_alpha = frame.color().has_alpha();
    let rgba = frame.to_rgba8();

    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut found = false;

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let is_subject = if use_alpha {
            a > options.alpha_threshold
        } else {
            luma(r, g, b) > options.luma_threshold
        };
        if is_subject {
            found = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    found.then(|| PixelRect::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

/// Smallest rectangle enclosing both inputs.
pub fn union(a: PixelRect, b: PixelRect) -> PixelRect {
    let x = a.x.min(b.x);
    let y = a.y.min(b.y);
    let right = a.right().max(b.right());
    let bottom = a.bottom().max(b.bottom());
    PixelRect::new(x, y, right - x, bottom - y)
}

/// BT.601 luma in integer arithmetic.
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn test_alpha_mask_box() {
        let mut img = RgbaImage::from_pixel(100, 80, Rgba([255, 255, 255, 0]));
        for x in 20..40 {
            for y in 10..70 {
                img.put_pixel(x, y, Rgba([200, 100, 50, 255]));
            }
        }
        let bbox = detect_bounding_box(&DynamicImage::ImageRgba8(img), BboxOptions::default());
        assert_eq!(bbox, Some(PixelRect::new(20, 10, 20, 60)));
    }

    #[test]
    fn test_luma_mask_box_on_black_matte() {
        let mut img = RgbImage::from_pixel(64, 64, Rgb([5, 5, 5]));
        img.put_pixel(10, 12, Rgb([220, 220, 220]));
        img.put_pixel(30, 50, Rgb([90, 120, 60]));
        let bbox = detect_bounding_box(&DynamicImage::ImageRgb8(img), BboxOptions::default());
        assert_eq!(bbox, Some(PixelRect::new(10, 12, 21, 39)));
    }

    #[test]
    fn test_empty_mask_is_none() {
        let img = RgbaImage::from_pixel(16, 16, Rgba([0, 0, 0, 0]));
        assert_eq!(detect_bounding_box(&DynamicImage::ImageRgba8(img), BboxOptions::default()), None);
    }

    #[test]
    fn test_union() {
        let merged = union(PixelRect::new(10, 10, 5, 5), PixelRect::new(2, 12, 4, 10));
        assert_eq!(merged, PixelRect::new(2, 10, 13, 12));
    }
}
