//! Seams between the engine and the rendering host.
//!
//! The engine never owns the live preview. It reaches it through these
//! traits and accessor closures, which the host implements over whatever it
//! renders with. Accessors are re-evaluated on every frame, since the host
//! may replace the underlying element after a seek.

use std::sync::Arc;

use async_trait::async_trait;
use image::RgbaImage;
use loopforge_timeline::PixelRect;
use serde::{Deserialize, Serialize};

use crate::geometry::FitMode;

/// Moves the host preview to a timeline frame.
///
/// Any `FnMut(u64)` closure is a seeker.
pub trait Seeker: Send {
    fn seek(&mut self, frame: u64);
}

impl<F> Seeker for F
where
    F: FnMut(u64) + Send,
{
    fn seek(&mut self, frame: u64) {
        self(frame)
    }
}

/// Zero-argument accessor returning the current read target, if any.
pub type Accessor<T> = Box<dyn Fn() -> Option<T> + Send + Sync>;

/// Cheap check that the host has finished rendering after a seek.
pub type ReadyPredicate = Box<dyn Fn() -> bool + Send + Sync>;

/// Why a single frame or item could not be read. Never fatal.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AcquireError {
    #[error("read target is not available")]
    TargetMissing,

    #[error("read target has no decoded frame")]
    NotReady,

    #[error("pixel read failed: {0}")]
    Read(String),
}

/// A decoded video the single-video strategy reads from.
pub trait VideoElement: Send + Sync {
    /// Intrinsic size of the decoded stream.
    fn natural_size(&self) -> (u32, u32);

    /// Whether a decoded frame for the current position is available and no
    /// seek is in flight.
    fn is_ready(&self) -> bool;

    /// Pixels of the frame at the current position.
    fn current_frame(&self) -> Result<Arc<RgbaImage>, AcquireError>;
}

/// Kind of a media element placed in a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    /// Fallback MIME type when a fetch does not report one.
    pub fn default_mime(self) -> &'static str {
        match self {
            MediaKind::Video => "video/mp4",
            MediaKind::Image => "image/png",
        }
    }

    /// Guess from the URL's path extension. Unrecognised extensions are video.
    pub fn guess_from_url(url: &str) -> Self {
        let path = url.split(|c: char| c == '?' || c == '#').next().unwrap_or(url);
        let file = path.rsplit('/').next().unwrap_or(path);
        let ext = match file.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => return MediaKind::Video,
        };
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "avif" => MediaKind::Image,
            _ => MediaKind::Video,
        }
    }
}

/// A media element laid out inside the preview container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedMedia {
    /// URL the host element loads from.
    pub source_url: String,
    pub kind: MediaKind,
    /// Layout rectangle relative to the container's top-left corner.
    pub rect: PixelRect,
    #[serde(default)]
    pub fit: FitMode,
    /// Playback position of video elements, seconds.
    #[serde(default)]
    pub current_time: f64,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

/// Snapshot of the container's layout at the current seek position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerLayout {
    /// Container size in layout pixels.
    pub width: f64,
    pub height: f64,
    /// Media elements in paint order.
    pub items: Vec<PlacedMedia>,
}

impl ContainerLayout {
    pub fn bounds(&self) -> PixelRect {
        PixelRect::new(0.0, 0.0, self.width, self.height)
    }

    /// Layout-to-raster scale factors, independent per axis.
    pub fn scale_to(&self, width: u32, height: u32) -> (f64, f64) {
        if self.width <= 0.0 || self.height <= 0.0 {
            return (1.0, 1.0);
        }
        (width as f64 / self.width, height as f64 / self.height)
    }
}

/// Renders the host's visual tree into a raster. The slowest strategy.
#[async_trait]
pub trait SnapshotRenderer: Send + Sync {
    async fn snapshot(&self) -> Result<RgbaImage, AcquireError>;
}
