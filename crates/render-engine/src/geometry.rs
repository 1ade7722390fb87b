//! Placement of source media inside destination rectangles.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use loopforge_timeline::{PixelRect, Rgba8Color};
use serde::{Deserialize, Serialize};

/// How source media is sized into its destination box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// Scale to fill the box, cropping the overflow (centered).
    #[default]
    Cover,
    /// Scale to fit inside the box, leaving bars.
    Contain,
    /// Stretch to the box, ignoring aspect ratio.
    Fill,
}

/// Where a source is drawn: the crop taken from the source and the
/// rectangle it lands on in the destination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub source: PixelRect,
    pub dest: PixelRect,
}

/// Compute the placement of a `src_w x src_h` source into `dest` under `fit`.
pub fn fit_rect(src_w: u32, src_h: u32, dest: PixelRect, fit: FitMode) -> Placement {
    let sw = src_w as f64;
    let sh = src_h as f64;
    let full = PixelRect::new(0.0, 0.0, sw, sh);

    if sw <= 0.0 || sh <= 0.0 || dest.is_empty() {
        return Placement { source: full, dest };
    }

    match fit {
        FitMode::Fill => Placement { source: full, dest },
        FitMode::Contain => {
            let scale = (dest.width / sw).min(dest.height / sh);
            let w = sw * scale;
            let h = sh * scale;
            let (cx, cy) = dest.center();
            Placement {
                source: full,
                dest: PixelRect::new(cx - w / 2.0, cy - h / 2.0, w, h),
            }
        }
        FitMode::Cover => {
            let scale = (dest.width / sw).max(dest.height / sh);
            let w = dest.width / scale;
            let h = dest.height / scale;
            Placement {
                source: PixelRect::new((sw - w) / 2.0, (sh - h) / 2.0, w, h),
                dest,
            }
        }
    }
}

/// A `width x height` frame filled with `color`.
pub fn blank_frame(width: u32, height: u32, color: Rgba8Color) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba(color.0))
}

/// Draw `source` onto `canvas` at `placement`, alpha-blended.
///
/// The destination rectangle is clipped to the canvas.
pub fn draw_placed(canvas: &mut RgbaImage, source: &RgbaImage, placement: &Placement) {
    let src = placement.source.clamp_to_frame(source.width(), source.height());
    let dest_w = placement.dest.width.round();
    let dest_h = placement.dest.height.round();
    if src.is_empty() || dest_w < 1.0 || dest_h < 1.0 {
        return;
    }

    let crop = imageops::crop_imm(source, src.x0, src.y0, src.width(), src.height()).to_image();
    let scaled = if crop.dimensions() == (dest_w as u32, dest_h as u32) {
        crop
    } else {
        imageops::resize(&crop, dest_w as u32, dest_h as u32, FilterType::Triangle)
    };

    imageops::overlay(
        canvas,
        &scaled,
        placement.dest.x.round() as i64,
        placement.dest.y.round() as i64,
    );
}

/// Letterbox or pillarbox `source` into a full `canvas`, preserving aspect.
pub fn draw_contained(canvas: &mut RgbaImage, source: &RgbaImage) {
    let dest = PixelRect::new(0.0, 0.0, canvas.width() as f64, canvas.height() as f64);
    let placement = fit_rect(source.width(), source.height(), dest, FitMode::Contain);
    draw_placed(canvas, source, &placement);
}

/// Resample `source` to exactly `width x height`.
pub fn resize_to(source: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if source.dimensions() == (width, height) {
        return source.clone();
    }
    imageops::resize(source, width, height, FilterType::Triangle)
}
