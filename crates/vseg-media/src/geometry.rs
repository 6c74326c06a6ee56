//! Compositing geometry: where and how large the subject lands on the canvas.
//!
//! The subject height is a fixed fraction of the background height. Width
//! follows the subject's bounding-box aspect ratio. Both are clamped to the
//! safe area (side margins and the top/bottom band) with a uniform rescale,
//! so the subject is never distorted.

use serde::{Deserialize, Serialize};
use vseg_models::{CompositingPlan, Dimensions, PixelRect};

use crate::error::{MediaError, MediaResult};

/// Absorbs float error when a clamp lands exactly on an even bound.
const EVEN_EPSILON: f64 = 1e-6;

/// Placement parameters for the foreground subject.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryConfig {
    /// Subject height as a fraction of the background height
    pub scale_ratio: f64,
    /// Pixels kept free above the subject band
    pub top_margin: u32,
    /// Pixels kept free below the subject band
    pub bottom_margin: u32,
    /// Left/right safe margin as a fraction of the background height
    pub safe_margin_ratio: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            scale_ratio: 0.20,
            top_margin: 80,
            bottom_margin: 80,
            safe_margin_ratio: 0.08,
        }
    }
}

impl GeometryConfig {
    /// Check the ratios on their own.
    pub fn validate(&self) -> MediaResult<()> {
        if !(self.scale_ratio.is_finite() && self.scale_ratio > 0.0 && self.scale_ratio <= 1.0) {
            return Err(MediaError::invalid_geometry(format!(
                "scale ratio must be in (0, 1], got {}",
                self.scale_ratio
            )));
        }
        if !(self.safe_margin_ratio.is_finite() && (0.0..0.5).contains(&self.safe_margin_ratio)) {
            return Err(MediaError::invalid_geometry(format!(
                "safe margin ratio must be in [0, 0.5), got {}",
                self.safe_margin_ratio
            )));
        }
        Ok(())
    }

    /// Side margin in pixels for a canvas of the given height.
    pub fn safe_margin_px(&self, canvas_height: u32) -> u32 {
        (canvas_height as f64 * self.safe_margin_ratio).round() as u32
    }

    /// Largest subject size that respects the margins on `canvas`.
    fn limits(&self, canvas: Dimensions) -> MediaResult<(u32, u32)> {
        let side = 2 * self.safe_margin_px(canvas.height);
        let vertical = self.top_margin.saturating_add(self.bottom_margin);

        let max_width = canvas.width.checked_sub(side).filter(|w| *w >= 2);
        let max_height = canvas.height.checked_sub(vertical).filter(|h| *h >= 2);

        match (max_width, max_height) {
            (Some(w), Some(h)) => Ok((w, h)),
            _ => Err(MediaError::invalid_geometry(format!(
                "margins leave no room on a {}x{} canvas (top {}, bottom {}, side {})",
                canvas.width, canvas.height, self.top_margin, self.bottom_margin, side
            ))),
        }
    }
}

/// Round to the nearest even integer.
pub fn round_even(value: f64) -> u32 {
    ((value / 2.0).round() * 2.0).max(0.0) as u32
}

/// Round down to an even integer.
pub fn floor_even(value: f64) -> u32 {
    ((value / 2.0).floor() * 2.0).max(0.0) as u32
}

/// Compute the overlay plan for a foreground of `foreground` size onto
/// `background`.
///
/// `bbox` is the subject box in foreground pixels. A missing, empty or out
/// of frame box falls back to the whole foreground frame.
pub fn compute_plan(
    background: Dimensions,
    foreground: Dimensions,
    bbox: Option<PixelRect>,
    foreground_has_alpha: bool,
    config: &GeometryConfig,
) -> MediaResult<CompositingPlan> {
    config.validate()?;
    if background.is_empty() {
        return Err(MediaError::invalid_geometry("background has no pixels"));
    }
    if foreground.is_empty() {
        return Err(MediaError::invalid_geometry("foreground has no pixels"));
    }

    // libx264 with yuv420p needs even dimensions
    let canvas = Dimensions::new(background.width & !1, background.height & !1);
    let (max_width, max_height) = config.limits(canvas)?;

    let crop = effective_crop(foreground, bbox);
    let aspect = crop.dimensions().aspect_ratio();

    let base_height = round_even(canvas.height as f64 * config.scale_ratio).max(2) as f64;
    let base_width = base_height * aspect;

    let scale = 1.0_f64
        .min(max_width as f64 / base_width)
        .min(max_height as f64 / base_height);

    let (target_width, target_height) = if scale < 1.0 {
        (
            floor_even(base_width * scale + EVEN_EPSILON),
            floor_even(base_height * scale + EVEN_EPSILON),
        )
    } else {
        (round_even(base_width), base_height as u32)
    };
    let target_width = target_width.min(max_width & !1).max(2);
    let target_height = target_height.min(max_height & !1).max(2);

    let offset_x = (canvas.width - target_width) / 2;

    let top = config.top_margin as i64;
    let bottom = config.bottom_margin as i64;
    let band = max_height as i64;
    let centred = top + (band - target_height as i64) / 2 + (bottom - top) / 2;
    let lowest = canvas.height as i64 - bottom - target_height as i64;
    let offset_y = centred.clamp(top, lowest.max(top)) as u32;

    Ok(CompositingPlan {
        canvas,
        crop,
        target_width,
        target_height,
        offset_x,
        offset_y,
        foreground_has_alpha,
    })
}

/// The bbox clipped to the frame, or the full frame when nothing usable remains.
fn effective_crop(foreground: Dimensions, bbox: Option<PixelRect>) -> PixelRect {
    let Some(rect) = bbox else {
        return foreground.full_rect();
    };
    if rect.x >= foreground.width || rect.y >= foreground.height {
        return foreground.full_rect();
    }
    let width = rect.width.min(foreground.width - rect.x);
    let height = rect.height.min(foreground.height - rect.y);
    let clipped = PixelRect::new(rect.x, rect.y, width, height);
    if clipped.is_empty() {
        foreground.full_rect()
    } else {
        clipped
    }
}
