//! Rectangle types for overlay placement.
//!
//! Overlays are placed with [`PercentRect`] (0-100 of the output frame);
//! compositing works on [`PixelRect`] in output raster space.

use serde::{Deserialize, Serialize};

/// A rectangle expressed in percentages of the output frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentRect {
    /// Left edge, percent of width.
    pub x: f64,
    /// Top edge, percent of height.
    pub y: f64,
    /// Width, percent of width.
    pub width: f64,
    /// Height, percent of height.
    pub height: f64,
}

impl PercentRect {
    /// The whole frame.
    pub const FULL: PercentRect = PercentRect {
        x: 0.0,
        y: 0.0,
        width: 100.0,
        height: 100.0,
    };

    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Convert to output pixels: `px = (pct / 100) * dimension`.
    pub fn to_pixels(&self, frame_width: u32, frame_height: u32) -> PixelRect {
        let fw = frame_width as f64;
        let fh = frame_height as f64;
        PixelRect {
            x: self.x / 100.0 * fw,
            y: self.y / 100.0 * fh,
            width: self.width / 100.0 * fw,
            height: self.height / 100.0 * fh,
        }
    }
}

impl Default for PercentRect {
    fn default() -> Self {
        Self::FULL
    }
}

/// A rectangle in pixel space. Fractional values are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Integer pixel bounds, half-open: `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBounds {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelBounds {
    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

impl PixelRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Overlap with `other`, or `None` when they do not intersect.
    pub fn intersect(&self, other: &PixelRect) -> Option<PixelRect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            return None;
        }
        Some(PixelRect::new(x, y, right - x, bottom - y))
    }

    /// Scale independently on each axis (layout pixels to raster pixels).
    pub fn scale(&self, sx: f64, sy: f64) -> PixelRect {
        PixelRect::new(self.x * sx, self.y * sy, self.width * sx, self.height * sy)
    }

    /// Translate so `origin` becomes (0, 0).
    pub fn relative_to(&self, origin_x: f64, origin_y: f64) -> PixelRect {
        PixelRect::new(self.x - origin_x, self.y - origin_y, self.width, self.height)
    }

    /// Bounding box of this rectangle rotated by `degrees` about its center.
    pub fn rotated_bounds(&self, degrees: f64) -> PixelRect {
        if degrees.rem_euclid(360.0).abs() < 1e-9 {
            return *self;
        }
        let (cx, cy) = self.center();
        let theta = degrees.to_radians();
        let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
        let w = self.width * cos + self.height * sin;
        let h = self.width * sin + self.height * cos;
        PixelRect::new(cx - w / 2.0, cy - h / 2.0, w, h)
    }

    /// Round to integer bounds clipped to a `frame_width x frame_height` raster.
    pub fn clamp_to_frame(&self, frame_width: u32, frame_height: u32) -> PixelBounds {
        let clamp_x = |v: f64| v.round().clamp(0.0, frame_width as f64) as u32;
        let clamp_y = |v: f64| v.round().clamp(0.0, frame_height as f64) as u32;
        PixelBounds {
            x0: clamp_x(self.x),
            y0: clamp_y(self.y),
            x1: clamp_x(self.right()),
            y1: clamp_y(self.bottom()),
        }
    }
}
