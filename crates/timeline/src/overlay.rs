//! Overlay layers drawn on top of the clip track.
//!
//! Every overlay shares [`OverlayBase`]: a frame range and a percentage
//! rectangle. The variant carries the layer-specific parameters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::rect::{PercentRect, PixelRect};

/// An RGBA colour, serialized as `#rrggbb` or `#rrggbbaa`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgba8Color(pub [u8; 4]);

impl Rgba8Color {
    pub const BLACK: Rgba8Color = Rgba8Color([0, 0, 0, 255]);
    pub const WHITE: Rgba8Color = Rgba8Color([255, 255, 255, 255]);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }
}

impl Default for Rgba8Color {
    fn default() -> Self {
        Self::BLACK
    }
}

/// Error parsing a hex colour string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid colour {0:?}: expected #rgb, #rrggbb or #rrggbbaa")]
pub struct ColorParseError(pub String);

impl FromStr for Rgba8Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ColorParseError(s.to_string());
        let hex = s.trim().strip_prefix('#').ok_or_else(err)?;
        if !hex.is_ascii() {
            return Err(err());
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| err());
        let nibble = |i: usize| {
            u8::from_str_radix(&hex[i..i + 1], 16)
                .map(|v| v * 17)
                .map_err(|_| err())
        };
        match hex.len() {
            3 => Ok(Self([nibble(0)?, nibble(1)?, nibble(2)?, 255])),
            6 => Ok(Self([byte(0)?, byte(2)?, byte(4)?, 255])),
            8 => Ok(Self([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
            _ => Err(err()),
        }
    }
}

impl TryFrom<String> for Rgba8Color {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgba8Color> for String {
    fn from(color: Rgba8Color) -> Self {
        color.to_string()
    }
}

impl fmt::Display for Rgba8Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0;
        if a == 255 {
            write!(f, "#{r:02x}{g:02x}{b:02x}")
        } else {
            write!(f, "#{r:02x}{g:02x}{b:02x}{a:02x}")
        }
    }
}

/// Fields shared by every overlay variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayBase {
    pub id: String,

    /// First timeline frame on which the overlay is visible.
    pub start_frame: u64,

    /// Number of frames the overlay stays visible.
    pub duration_in_frames: u64,

    /// Placement, percent of the output frame.
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,

    /// Editor track the overlay lives on. Higher tracks draw on top.
    #[serde(default)]
    pub track_id: u32,
}

impl OverlayBase {
    pub fn new(id: impl Into<String>, start_frame: u64, duration_in_frames: u64, rect: PercentRect) -> Self {
        Self {
            id: id.into(),
            start_frame,
            duration_in_frames,
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            track_id: 0,
        }
    }

    pub fn rect(&self) -> PercentRect {
        PercentRect::new(self.x, self.y, self.width, self.height)
    }

    pub fn end_frame(&self) -> u64 {
        self.start_frame + self.duration_in_frames
    }

    /// Visible on `frame` when `start_frame <= frame < start_frame + duration`.
    pub fn is_active_at(&self, frame: u64) -> bool {
        frame >= self.start_frame && frame < self.end_frame()
    }
}

/// Entrance animation for text overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextAnimation {
    #[default]
    None,
    Fade,
    SlideUp,
    Typewriter,
    Pop,
}

/// Horizontal text alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

/// A text caption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextOverlay {
    #[serde(flatten)]
    pub base: OverlayBase,
    pub text: String,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    /// Font size in output pixels.
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default = "default_font_weight")]
    pub font_weight: u16,
    #[serde(default = "default_text_color")]
    pub color: Rgba8Color,
    #[serde(default)]
    pub background_color: Option<Rgba8Color>,
    #[serde(default)]
    pub align: TextAlign,
    #[serde(default)]
    pub animation: TextAnimation,
}

fn default_font_family() -> String {
    "Inter".to_string()
}

fn default_font_size() -> f32 {
    48.0
}

fn default_font_weight() -> u16 {
    600
}

fn default_text_color() -> Rgba8Color {
    Rgba8Color::WHITE
}

/// How a blur region rewrites the pixels it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlurMode {
    #[default]
    Gaussian,
    Heavy,
    Pixelate,
    Solid,
}

/// Mask shape of a blur region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegionShape {
    #[default]
    Rectangle,
    Ellipse,
    RoundedRect,
}

/// A blur, pixelate, or solid-fill region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlurOverlay {
    #[serde(flatten)]
    pub base: OverlayBase,
    #[serde(default = "default_intensity")]
    pub intensity: f64,
    #[serde(default)]
    pub blur_mode: BlurMode,
    #[serde(default)]
    pub shape: RegionShape,
    /// Clockwise rotation in degrees about the region center.
    #[serde(default)]
    pub rotation: f64,
    /// Soft edge width in output pixels. Ignored for solid fills.
    #[serde(default)]
    pub feather: f64,
    /// Corner radius in output pixels for rounded rectangles.
    #[serde(default)]
    pub border_radius: f64,
    #[serde(default)]
    pub fill_color: Rgba8Color,
}

fn default_intensity() -> f64 {
    10.0
}

impl BlurOverlay {
    /// Flatten into a pixel-space region for a `width x height` raster.
    pub fn to_region(&self, width: u32, height: u32) -> BlurRegion {
        BlurRegion {
            rect: self.base.rect().to_pixels(width, height),
            shape: self.shape,
            blur_mode: self.blur_mode,
            intensity: self.intensity,
            rotation: self.rotation,
            feather: self.feather,
            border_radius: self.border_radius,
            fill_color: self.fill_color,
        }
    }
}

/// Export-time form of a [`BlurOverlay`], computed once per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct BlurRegion {
    pub rect: PixelRect,
    pub shape: RegionShape,
    pub blur_mode: BlurMode,
    pub intensity: f64,
    pub rotation: f64,
    pub feather: f64,
    pub border_radius: f64,
    pub fill_color: Rgba8Color,
}

impl BlurRegion {
    /// A solid rectangle, the simplest region.
    pub fn solid(rect: PixelRect, fill_color: Rgba8Color) -> Self {
        Self {
            rect,
            shape: RegionShape::Rectangle,
            blur_mode: BlurMode::Solid,
            intensity: 0.0,
            rotation: 0.0,
            feather: 0.0,
            border_radius: 0.0,
            fill_color,
        }
    }

    /// A blurred region of the given mode and shape.
    pub fn blurred(rect: PixelRect, blur_mode: BlurMode, shape: RegionShape, intensity: f64) -> Self {
        Self {
            rect,
            shape,
            blur_mode,
            intensity,
            rotation: 0.0,
            feather: 0.0,
            border_radius: 0.0,
            fill_color: Rgba8Color::BLACK,
        }
    }
}

/// Sticker artwork.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StickerSource {
    Image { url: String },
    Glyph { glyph: String },
}

/// An image or emoji sticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StickerOverlay {
    #[serde(flatten)]
    pub base: OverlayBase,
    pub source: StickerSource,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

fn default_opacity() -> f32 {
    1.0
}

/// Geometric primitive for shape overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    #[default]
    Rectangle,
    Ellipse,
    Triangle,
    Line,
    Arrow,
}

/// A filled and/or stroked primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeOverlay {
    #[serde(flatten)]
    pub base: OverlayBase,
    #[serde(default)]
    pub kind: ShapeKind,
    #[serde(default)]
    pub fill: Option<Rgba8Color>,
    #[serde(default)]
    pub stroke: Option<Rgba8Color>,
    #[serde(default)]
    pub stroke_width: f32,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

/// Any overlay layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Overlay {
    Text(TextOverlay),
    Blur(BlurOverlay),
    Sticker(StickerOverlay),
    Shape(ShapeOverlay),
}

impl Overlay {
    pub fn base(&self) -> &OverlayBase {
        match self {
            Overlay::Text(o) => &o.base,
            Overlay::Blur(o) => &o.base,
            Overlay::Sticker(o) => &o.base,
            Overlay::Shape(o) => &o.base,
        }
    }

    pub fn id(&self) -> &str {
        &self.base().id
    }

    pub fn is_active_at(&self, frame: u64) -> bool {
        self.base().is_active_at(frame)
    }

    pub fn as_blur(&self) -> Option<&BlurOverlay> {
        match self {
            Overlay::Blur(blur) => Some(blur),
            _ => None,
        }
    }

    /// Media URL this overlay pulls pixels from, if any.
    pub fn media_source(&self) -> Option<&str> {
        match self {
            Overlay::Sticker(StickerOverlay {
                source: StickerSource::Image { url },
                ..
            }) => Some(url),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_parsing() {
        assert_eq!("#0000ff".parse::<Rgba8Color>().unwrap(), Rgba8Color::rgb(0, 0, 255));
        assert_eq!("#fff".parse::<Rgba8Color>().unwrap(), Rgba8Color::WHITE);
        assert_eq!(
            "#11223380".parse::<Rgba8Color>().unwrap(),
            Rgba8Color([0x11, 0x22, 0x33, 0x80])
        );
        assert!("0000ff".parse::<Rgba8Color>().is_err());
        assert!("#12345".parse::<Rgba8Color>().is_err());
        assert!("#gg0000".parse::<Rgba8Color>().is_err());
    }

    #[test]
    fn test_color_display() {
        assert_eq!(Rgba8Color::rgb(0, 0, 255).to_string(), "#0000ff");
        assert_eq!(Rgba8Color([1, 2, 3, 4]).to_string(), "#01020304");
    }

    #[test]
    fn test_overlay_tagged_serialization() {
        let json = r##"{
            "type": "blur",
            "id": "b1",
            "start_frame": 0,
            "duration_in_frames": 30,
            "x": 25.0, "y": 40.0, "width": 50.0, "height": 20.0,
            "blur_mode": "solid",
            "shape": "rectangle",
            "fill_color": "#0000ff"
        }"##;
        let overlay: Overlay = serde_json::from_str(json).unwrap();
        let blur = overlay.as_blur().expect("blur overlay");
        assert_eq!(blur.blur_mode, BlurMode::Solid);
        assert_eq!(blur.fill_color, Rgba8Color::rgb(0, 0, 255));
        assert!((blur.intensity - 10.0).abs() < 1e-9);

        let back = serde_json::to_value(&overlay).unwrap();
        assert_eq!(back["type"], "blur");
        assert_eq!(back["fill_color"], "#0000ff");
    }

    #[test]
    fn test_overlay_activity_window() {
        let base = OverlayBase::new("t", 10, 5, PercentRect::FULL);
        assert!(!base.is_active_at(9));
        assert!(base.is_active_at(10));
        assert!(base.is_active_at(14));
        assert!(!base.is_active_at(15));
    }

    #[test]
    fn test_blur_region_flattening() {
        let overlay = BlurOverlay {
            base: OverlayBase::new("b", 0, 10, PercentRect::new(25.0, 40.0, 50.0, 20.0)),
            intensity: 12.0,
            blur_mode: BlurMode::Pixelate,
            shape: RegionShape::Ellipse,
            rotation: 0.0,
            feather: 4.0,
            border_radius: 0.0,
            fill_color: Rgba8Color::BLACK,
        };
        let region = overlay.to_region(1080, 1920);
        assert!((region.rect.x - 270.0).abs() < 1e-9);
        assert!((region.rect.height - 384.0).abs() < 1e-9);
        assert_eq!(region.shape, RegionShape::Ellipse);
    }

    #[test]
    fn test_sticker_media_source() {
        let sticker = Overlay::Sticker(StickerOverlay {
            base: OverlayBase::new("s", 0, 10, PercentRect::FULL),
            source: StickerSource::Image {
                url: "https://cdn.example/s.png".to_string(),
            },
            rotation: 0.0,
            opacity: 1.0,
        });
        assert_eq!(sticker.media_source(), Some("https://cdn.example/s.png"));
    }
}
