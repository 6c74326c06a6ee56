//! Pixel geometry shared by the compositing engine and the render step.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Width and height of a frame or image in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width over height; `0.0` for empty dimensions.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }

    /// The full-frame rectangle.
    pub fn full_rect(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width, self.height)
    }
}

/// An axis-aligned rectangle in absolute pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct PixelRect {
    /// X coordinate of the top-left corner
    pub x: u32,
    /// Y coordinate of the top-left corner
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Whether the rectangle lies entirely inside a frame of `bounds`.
    pub fn fits_within(&self, bounds: Dimensions) -> bool {
        self.right() <= bounds.width && self.bottom() <= bounds.height
    }
}

/// Placement of a foreground clip onto a background canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompositingPlan {
    /// Output canvas (background size)
    pub canvas: Dimensions,
    /// Region of the foreground frame that contains the subject
    pub crop: PixelRect,
    /// Scaled size of the cropped subject on the canvas (even values)
    pub target_width: u32,
    pub target_height: u32,
    /// Top-left position of the scaled subject on the canvas
    pub offset_x: u32,
    pub offset_y: u32,
    /// Foreground carries an alpha channel; otherwise a color key is applied
    pub foreground_has_alpha: bool,
}

impl CompositingPlan {
    /// The placed subject rectangle in canvas coordinates.
    pub fn placement(&self) -> PixelRect {
        PixelRect::new(self.offset_x, self.offset_y, self.target_width, self.target_height)
    }
}
