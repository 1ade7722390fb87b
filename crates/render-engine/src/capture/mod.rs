//! Frame acquisition.
//!
//! Every strategy runs the same strictly sequential loop over the sampled
//! timeline positions `0, k, 2k, ...`:
//!
//! ```text
//! check cancel ──► seek ──► settle ──► read pixels ──► progress
//!                                          │
//!                                          └── failure: skip frame, continue
//! ```
//!
//! A failed read never aborts the capture; the frame is counted in
//! [`CaptureStats::skipped`] and the loop moves on. Only cancellation is
//! fatal. Zero captured frames is reported as an empty result and left to the
//! caller.

mod container;
mod single_video;
mod snapshot;
mod surface;

use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use loopforge_common::{settle_for, wait_until, CancelFlag, CaptureTimings, EngineError, EngineResult, SettleOutcome};
use loopforge_timeline::Rgba8Color;
use serde::Serialize;

pub use container::ContainerCapture;
pub use single_video::SingleVideoCapture;
pub use snapshot::SnapshotCapture;
pub use surface::SurfaceCapture;

use crate::host::{AcquireError, ReadyPredicate, Seeker};
use crate::progress::{emit, ExportPhase, ExportProgress, ProgressCallback, ProgressSpan};

/// Parameters shared by every capture strategy.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Output raster width.
    pub width: u32,
    /// Output raster height.
    pub height: u32,
    /// Sample every k-th timeline frame.
    pub every_nth_frame: u32,
    /// Fill behind letterboxing and unavailable media.
    pub background: Rgba8Color,
    pub timings: CaptureTimings,
    /// Progress range capture reports into.
    pub span: ProgressSpan,
    pub cancel: CancelFlag,
}

impl CaptureOptions {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            every_nth_frame: 1,
            background: Rgba8Color::BLACK,
            timings: CaptureTimings::default(),
            span: ProgressSpan::FULL,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_stride(mut self, every_nth_frame: u32) -> Self {
        self.every_nth_frame = every_nth_frame;
        self
    }

    pub fn with_background(mut self, background: Rgba8Color) -> Self {
        self.background = background;
        self
    }

    pub fn with_timings(mut self, timings: CaptureTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_span(mut self, span: ProgressSpan) -> Self {
        self.span = span;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(EngineError::invalid_settings(format!(
                "capture size {}x{} must be non-zero",
                self.width, self.height
            )));
        }
        if self.every_nth_frame == 0 {
            return Err(EngineError::invalid_settings("every_nth_frame must be at least 1"));
        }
        Ok(())
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.timings.poll_interval_ms)
    }
}

/// Per-capture counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    /// Sampled positions visited.
    pub requested: usize,
    pub captured: usize,
    /// Positions whose pixels could not be read.
    pub skipped: usize,
    /// Readiness waits that hit their fallback timeout.
    pub settle_timeouts: usize,
    /// Local media seeks that did not complete in time.
    pub seek_timeouts: usize,
    /// Sources omitted because neither direct nor proxied fetch succeeded.
    pub sources_unavailable: usize,
}

/// Frames in timeline order, with the timeline frame each was taken at.
#[derive(Debug, Clone, Default)]
pub struct CapturedFrames {
    pub frames: Vec<RgbaImage>,
    pub positions: Vec<u64>,
    pub stats: CaptureStats,
}

impl CapturedFrames {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Timeline positions sampled for `total_frames` at stride `every_nth`.
pub fn sample_positions(total_frames: u64, every_nth: u32) -> Vec<u64> {
    (0..total_frames).step_by(every_nth.max(1) as usize).collect()
}

/// How frames are read from the host.
///
/// Strategies differ in fidelity and cost. The engine does not choose one
/// or fall back automatically; the caller picks, and may retry with another
/// strategy when a capture comes back empty.
pub enum CaptureStrategy {
    /// One video element, letterboxed, with blur regions burned in.
    SingleVideo(SingleVideoCapture),
    /// Walk the media elements of a layout container.
    Container(ContainerCapture),
    /// Copy a host-rendered surface.
    Surface(SurfaceCapture),
    /// Rasterize the host's visual tree. Slowest, most general.
    Snapshot(SnapshotCapture),
}

impl CaptureStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            CaptureStrategy::SingleVideo(_) => "single_video",
            CaptureStrategy::Container(_) => "container",
            CaptureStrategy::Surface(_) => "surface",
            CaptureStrategy::Snapshot(_) => "snapshot",
        }
    }

    /// Capture `total_frames` timeline frames (sampled by the stride).
    pub async fn capture(
        self,
        seeker: &mut dyn Seeker,
        total_frames: u64,
        options: &CaptureOptions,
        progress: Option<&ProgressCallback>,
    ) -> EngineResult<CapturedFrames> {
        options.validate()?;
        match self {
            CaptureStrategy::SingleVideo(job) => job.capture(seeker, total_frames, options, progress).await,
            CaptureStrategy::Container(job) => job.capture(seeker, total_frames, options, progress).await,
            CaptureStrategy::Surface(job) => job.capture(seeker, total_frames, options, progress).await,
            CaptureStrategy::Snapshot(job) => job.capture(seeker, total_frames, options, progress).await,
        }
    }
}

/// Capture with `strategy`. See [`CaptureStrategy::capture`].
pub async fn capture_frames(
    strategy: CaptureStrategy,
    seeker: &mut dyn Seeker,
    total_frames: u64,
    options: &CaptureOptions,
    progress: Option<&ProgressCallback>,
) -> EngineResult<CapturedFrames> {
    strategy.capture(seeker, total_frames, options, progress).await
}

impl std::fmt::Debug for CaptureStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CaptureStrategy").field(&self.name()).finish()
    }
}

/// Reads the pixels of one already-seeked position.
#[async_trait]
trait FrameAcquirer: Send {
    async fn acquire(&mut self, frame: u64, stats: &mut CaptureStats) -> Result<RgbaImage, AcquireError>;
}

async fn run_frame_loop(
    strategy: &'static str,
    acquirer: &mut dyn FrameAcquirer,
    seeker: &mut dyn Seeker,
    total_frames: u64,
    options: &CaptureOptions,
    progress: Option<&ProgressCallback>,
) -> EngineResult<CapturedFrames> {
    let positions = sample_positions(total_frames, options.every_nth_frame);
    let total = positions.len();
    let mut result = CapturedFrames {
        frames: Vec::with_capacity(total),
        positions: Vec::with_capacity(total),
        stats: CaptureStats::default(),
    };

    tracing::info!(
        strategy,
        total_frames,
        every_nth_frame = options.every_nth_frame,
        sampled = total,
        width = options.width,
        height = options.height,
        "Starting frame capture"
    );

    for (index, &frame) in positions.iter().enumerate() {
        options.cancel.check()?;
        result.stats.requested += 1;

        seeker.seek(frame);
        match acquirer.acquire(frame, &mut result.stats).await {
            Ok(image) => {
                result.frames.push(image);
                result.positions.push(frame);
                result.stats.captured += 1;
            }
            Err(e) => {
                result.stats.skipped += 1;
                tracing::debug!(strategy, frame, error = %e, "Skipping frame");
            }
        }

        emit(
            progress,
            ExportProgress::new(ExportPhase::Capturing, options.span.at((index + 1) as f64 / total as f64))
                .with_frames(index as u64 + 1, total as u64),
        );
    }

    if result.is_empty() {
        tracing::warn!(strategy, sampled = total, "Capture produced no frames");
    } else {
        tracing::info!(
            strategy,
            captured = result.stats.captured,
            skipped = result.stats.skipped,
            settle_timeouts = result.stats.settle_timeouts,
            "Frame capture finished"
        );
    }
    Ok(result)
}

/// Wait for the host after a seek.
///
/// With a readiness predicate, poll it until it holds or `timeout` elapses.
/// Without one, sleep for `timeout`.
async fn settle(ready: Option<&ReadyPredicate>, options: &CaptureOptions, timeout: Duration) -> SettleOutcome {
    match ready {
        Some(ready) => wait_until(|| ready(), options.poll_interval(), timeout).await,
        None => {
            settle_for(timeout).await;
            SettleOutcome::Ready
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_positions() {
        assert_eq!(sample_positions(10, 1), (0..10).collect::<Vec<_>>());
        assert_eq!(sample_positions(10, 3), vec![0, 3, 6, 9]);
        assert_eq!(sample_positions(9, 3), vec![0, 3, 6]);
        assert!(sample_positions(0, 2).is_empty());
        assert_eq!(sample_positions(5, 0), (0..5).collect::<Vec<_>>());
    }

    #[test]
    fn test_options_validation() {
        assert!(CaptureOptions::new(1080, 1920).validate().is_ok());
        assert!(CaptureOptions::new(0, 1920).validate().is_err());
        assert!(CaptureOptions::new(10, 10).with_stride(0).validate().is_err());
    }
}
