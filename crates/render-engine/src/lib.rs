//! Loopforge Render Engine
//!
//! Turns an edited timeline, as rendered by the host preview, into an
//! animated GIF.
//!
//! # Pipeline Architecture
//!
//! ```text
//! host preview ──┐
//!                ├── Frame Acquisition (seek → settle → read, every k-th frame)
//! seek(frame) ───┘         │
//!                          ├── Cross-Origin Mitigation (local copies of remote media)
//!                          │
//!                          ├── Region Compositor (blur / pixelate / solid fill)
//!                          ▼
//!                   ordered RGBA frames
//!                          │
//!                          ▼
//!                 Encoder (parallel quantization, ordered packing)
//!                          │
//!                          ▼
//!                     animation.gif
//! ```
//!
//! Progress is reported as `capturing` over 0-50 and `encoding` over 50-100,
//! then `complete` at 100.

pub mod capture;
pub mod compositor;
pub mod encoder;
pub mod export;
pub mod geometry;
pub mod host;
pub mod origin;
pub mod progress;
pub mod workers;

pub use capture::{
    capture_frames, CaptureOptions, CaptureStats, CaptureStrategy, CapturedFrames, ContainerCapture,
    SingleVideoCapture, SnapshotCapture, SurfaceCapture,
};
pub use compositor::RegionCompositor;
pub use encoder::{AnimationEncoder, EncodeSettings, GifEncoder};
pub use export::*;
pub use geometry::FitMode;
pub use host::*;
pub use origin::{
    BlobHandle, BlobRegistry, FetchedMedia, HttpFetcher, InMemoryBlobRegistry, LocalMedia, LocalMediaSet,
    MediaDecoder, MediaFetcher, OriginResolver, ProxyEndpoint, SourceRef, StillImageDecoder, StillMedia,
};
pub use progress::{ExportPhase, ExportProgress, ProgressCallback, ProgressSpan};
