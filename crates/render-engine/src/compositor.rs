//! Region compositor: burns blur, pixelate, and solid-fill regions into
//! captured frames.
//!
//! A compositor is created once per export. Its scratch buffers are sized for
//! the output raster up front and reused for every region of every frame, so
//! the per-frame path never allocates.
//!
//! Blur is approximated by a box downsample followed by an upsample back to
//! the region size. Gaussian and heavy modes upsample bilinearly, which
//! softens the block edges; pixelate upsamples with nearest-neighbour so the
//! blocks stay hard.

use image::RgbaImage;
use loopforge_timeline::{BlurMode, BlurOverlay, BlurRegion, PixelBounds, RegionShape, Rgba8Color};

/// Lower bound on the downsample factor.
const MIN_SCALE: f64 = 1.0;

/// Upper bound on the downsample factor.
const MAX_SCALE: f64 = 10.0;

/// Intensity after the per-mode adjustment.
///
/// Heavy triples the configured intensity; pixelate floors it at `8 * 1.2`
/// so small values still produce visible blocks.
pub fn effective_intensity(mode: BlurMode, intensity: f64) -> f64 {
    let intensity = intensity.max(0.0);
    match mode {
        BlurMode::Gaussian | BlurMode::Solid => intensity,
        BlurMode::Heavy => intensity * 3.0,
        BlurMode::Pixelate => intensity.max(8.0) * 1.2,
    }
}

/// Downsample factor for an effective intensity: `clamp(eff / 2, 1, 10)`.
pub fn downsample_scale(effective: f64) -> f64 {
    (effective / 2.0).clamp(MIN_SCALE, MAX_SCALE)
}

/// Flatten the blur overlays active on `frame` into pixel regions for a
/// `width x height` raster.
pub fn regions_for_frame(overlays: &[BlurOverlay], frame: u64, width: u32, height: u32) -> Vec<BlurRegion> {
    overlays
        .iter()
        .filter(|overlay| overlay.base.is_active_at(frame))
        .map(|overlay| overlay.to_region(width, height))
        .collect()
}

/// Applies [`BlurRegion`]s to frames in place.
#[derive(Debug)]
pub struct RegionCompositor {
    width: u32,
    height: u32,
    /// Downsampled copy of the region being processed.
    small: Vec<u8>,
    /// Region-sized result of the upsample.
    large: Vec<u8>,
}

impl RegionCompositor {
    /// Allocate scratch space for a `width x height` output raster.
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize * 4;
        Self {
            width,
            height,
            small: vec![0; len],
            large: vec![0; len],
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Apply every region, in order, to `frame`.
    pub fn apply(&mut self, frame: &mut RgbaImage, regions: &[BlurRegion]) {
        if regions.is_empty() {
            return;
        }
        if frame.dimensions() != (self.width, self.height) {
            tracing::debug!(
                expected_width = self.width,
                expected_height = self.height,
                width = frame.width(),
                height = frame.height(),
                "Resizing compositor scratch buffers"
            );
            *self = Self::new(frame.width(), frame.height());
        }
        for region in regions {
            self.apply_region(frame, region);
        }
    }

    fn apply_region(&mut self, frame: &mut RgbaImage, region: &BlurRegion) {
        if region.rect.is_empty() {
            return;
        }
        let bounds = region
            .rect
            .rotated_bounds(region.rotation)
            .clamp_to_frame(frame.width(), frame.height());
        if bounds.is_empty() {
            return;
        }

        let mask = RegionMask::new(region);
        match region.blur_mode {
            BlurMode::Solid => fill_solid(frame, &bounds, &mask, region.fill_color),
            mode => self.blur(frame, &bounds, &mask, mode, region.intensity),
        }
    }

    fn blur(&mut self, frame: &mut RgbaImage, bounds: &PixelBounds, mask: &RegionMask, mode: BlurMode, intensity: f64) {
        let region_w = bounds.width() as usize;
        let region_h = bounds.height() as usize;
        let scale = downsample_scale(effective_intensity(mode, intensity));
        let small_w = ((region_w as f64 / scale).round() as usize).clamp(1, region_w);
        let small_h = ((region_h as f64 / scale).round() as usize).clamp(1, region_h);

        self.downsample(frame, bounds, small_w, small_h);
        match mode {
            BlurMode::Pixelate => self.upsample_nearest(region_w, region_h, small_w, small_h),
            _ => self.upsample_bilinear(region_w, region_h, small_w, small_h),
        }

        for y in bounds.y0..bounds.y1 {
            for x in bounds.x0..bounds.x1 {
                let coverage = mask.coverage(x, y);
                if coverage <= 0.0 {
                    continue;
                }
                let offset = ((y - bounds.y0) as usize * region_w + (x - bounds.x0) as usize) * 4;
                let blurred = &self.large[offset..offset + 4];
                let pixel = frame.get_pixel_mut(x, y);
                if coverage >= 1.0 {
                    pixel.0.copy_from_slice(blurred);
                } else {
                    for (dst, &src) in pixel.0.iter_mut().zip(blurred) {
                        *dst = lerp(*dst, src, coverage);
                    }
                }
            }
        }
    }

    /// Box-average the region into `small_w x small_h` cells.
    fn downsample(&mut self, frame: &RgbaImage, bounds: &PixelBounds, small_w: usize, small_h: usize) {
        let region_w = bounds.width() as usize;
        let region_h = bounds.height() as usize;

        for sy in 0..small_h {
            let ya = sy * region_h / small_h;
            let yb = ((sy + 1) * region_h / small_h).max(ya + 1);
            for sx in 0..small_w {
                let xa = sx * region_w / small_w;
                let xb = ((sx + 1) * region_w / small_w).max(xa + 1);

                let mut sum = [0u32; 4];
                for y in ya..yb {
                    for x in xa..xb {
                        let pixel = frame.get_pixel(bounds.x0 + x as u32, bounds.y0 + y as u32);
                        for (acc, &channel) in sum.iter_mut().zip(pixel.0.iter()) {
                            *acc += channel as u32;
                        }
                    }
                }

                let count = ((yb - ya) * (xb - xa)) as u32;
                let offset = (sy * small_w + sx) * 4;
                for (c, acc) in sum.iter().enumerate() {
                    self.small[offset + c] = ((acc + count / 2) / count) as u8;
                }
            }
        }
    }

    fn upsample_nearest(&mut self, region_w: usize, region_h: usize, small_w: usize, small_h: usize) {
        for y in 0..region_h {
            let sy = (y * small_h / region_h).min(small_h - 1);
            for x in 0..region_w {
                let sx = (x * small_w / region_w).min(small_w - 1);
                let src = (sy * small_w + sx) * 4;
                let dst = (y * region_w + x) * 4;
                self.large[dst..dst + 4].copy_from_slice(&self.small[src..src + 4]);
            }
        }
    }

    fn upsample_bilinear(&mut self, region_w: usize, region_h: usize, small_w: usize, small_h: usize) {
        let sample_axis = |i: usize, region: usize, small: usize| {
            let f = ((i as f64 + 0.5) * small as f64 / region as f64 - 0.5).clamp(0.0, (small - 1) as f64);
            let lo = f.floor() as usize;
            let hi = (lo + 1).min(small - 1);
            (lo, hi, f - lo as f64)
        };

        for y in 0..region_h {
            let (y0, y1, ty) = sample_axis(y, region_h, small_h);
            for x in 0..region_w {
                let (x0, x1, tx) = sample_axis(x, region_w, small_w);
                let a = (y0 * small_w + x0) * 4;
                let b = (y0 * small_w + x1) * 4;
                let c = (y1 * small_w + x0) * 4;
                let d = (y1 * small_w + x1) * 4;
                let dst = (y * region_w + x) * 4;
                for ch in 0..4 {
                    let top = self.small[a + ch] as f64 * (1.0 - tx) + self.small[b + ch] as f64 * tx;
                    let bottom = self.small[c + ch] as f64 * (1.0 - tx) + self.small[d + ch] as f64 * tx;
                    self.large[dst + ch] = (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}

fn fill_solid(frame: &mut RgbaImage, bounds: &PixelBounds, mask: &RegionMask, color: Rgba8Color) {
    let [r, g, b, a] = color.0;
    for y in bounds.y0..bounds.y1 {
        for x in bounds.x0..bounds.x1 {
            // Solid fills are hard-edged: any coverage paints the full colour.
            if mask.coverage(x, y) <= 0.0 {
                continue;
            }
            let pixel = frame.get_pixel_mut(x, y);
            if a == u8::MAX {
                pixel.0 = [r, g, b, a];
            } else {
                let alpha = a as f64 / 255.0;
                let [dr, dg, db, da] = pixel.0;
                pixel.0 = [
                    lerp(dr, r, alpha),
                    lerp(dg, g, alpha),
                    lerp(db, b, alpha),
                    (a as f64 + da as f64 * (1.0 - alpha)).round().min(255.0) as u8,
                ];
            }
        }
    }
}

fn lerp(from: u8, to: u8, t: f64) -> u8 {
    (from as f64 + (to as f64 - from as f64) * t).round().clamp(0.0, 255.0) as u8
}

/// Point-in-shape test for a possibly rotated region.
///
/// Pixels are tested at their centers, un-rotated into the region's local
/// frame, and measured against the shape's signed distance.
#[derive(Debug, Clone, Copy)]
struct RegionMask {
    cx: f64,
    cy: f64,
    half_w: f64,
    half_h: f64,
    sin: f64,
    cos: f64,
    shape: RegionShape,
    radius: f64,
    feather: f64,
}

impl RegionMask {
    fn new(region: &BlurRegion) -> Self {
        let (cx, cy) = region.rect.center();
        let half_w = region.rect.width / 2.0;
        let half_h = region.rect.height / 2.0;
        let theta = region.rotation.to_radians();
        let feather = match region.blur_mode {
            BlurMode::Solid => 0.0,
            _ => region.feather.max(0.0),
        };
        Self {
            cx,
            cy,
            half_w,
            half_h,
            sin: theta.sin(),
            cos: theta.cos(),
            shape: region.shape,
            radius: region.border_radius.clamp(0.0, half_w.min(half_h)),
            feather,
        }
    }

    /// Distance from the shape edge, positive inside.
    fn inside_distance(&self, px: f64, py: f64) -> f64 {
        let dx = px - self.cx;
        let dy = py - self.cy;
        let lx = dx * self.cos + dy * self.sin;
        let ly = -dx * self.sin + dy * self.cos;

        match self.shape {
            RegionShape::Rectangle => (self.half_w - lx.abs()).min(self.half_h - ly.abs()),
            RegionShape::Ellipse => {
                let r = (lx / self.half_w).hypot(ly / self.half_h);
                (1.0 - r) * self.half_w.min(self.half_h)
            }
            RegionShape::RoundedRect => {
                let qx = lx.abs() - (self.half_w - self.radius);
                let qy = ly.abs() - (self.half_h - self.radius);
                let outside = qx.max(0.0).hypot(qy.max(0.0));
                let inside = qx.max(qy).min(0.0);
                self.radius - outside - inside
            }
        }
    }

    /// Fraction of the region's effect applied at pixel `(x, y)`.
    fn coverage(&self, x: u32, y: u32) -> f64 {
        let d = self.inside_distance(x as f64 + 0.5, y as f64 + 0.5);
        if d < 0.0 {
            0.0
        } else if self.feather <= 0.0 {
            1.0
        } else {
            (d / self.feather).min(1.0)
        }
    }
}
