//! Direct single-video capture with inline region compositing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use loopforge_common::{wait_until, EngineResult};
use loopforge_timeline::{BlurOverlay, Overlay, Rgba8Color, Timeline};

use super::{run_frame_loop, CaptureOptions, CaptureStats, CapturedFrames, FrameAcquirer};
use crate::compositor::{regions_for_frame, RegionCompositor};
use crate::geometry::{blank_frame, draw_contained};
use crate::host::{AcquireError, Accessor, Seeker, VideoElement};
use crate::progress::ProgressCallback;

/// Captures one video element, letterboxed into the output raster, with blur
/// regions computed per frame and burned in.
///
/// The element is read directly and never goes through [`crate::origin`]:
/// the host must hand over an element whose pixels are already readable,
/// such as one loaded from a local copy or from a same-origin source. Use
/// [`super::ContainerCapture`] when sources still need local copies.
pub struct SingleVideoCapture {
    video: Accessor<Arc<dyn VideoElement>>,
    blur_overlays: Vec<BlurOverlay>,
}

impl SingleVideoCapture {
    pub fn new(video: Accessor<Arc<dyn VideoElement>>) -> Self {
        Self {
            video,
            blur_overlays: Vec::new(),
        }
    }

    pub fn with_blur_overlays(mut self, overlays: Vec<BlurOverlay>) -> Self {
        self.blur_overlays = overlays;
        self
    }

    /// Take the blur overlays from `timeline`.
    pub fn with_timeline_overlays(self, timeline: &Timeline) -> Self {
        let overlays = timeline
            .overlays
            .iter()
            .filter_map(Overlay::as_blur)
            .cloned()
            .collect();
        self.with_blur_overlays(overlays)
    }

    pub(super) async fn capture(
        self,
        seeker: &mut dyn Seeker,
        total_frames: u64,
        options: &CaptureOptions,
        progress: Option<&ProgressCallback>,
    ) -> EngineResult<CapturedFrames> {
        let mut acquirer = SingleVideoAcquirer {
            video: self.video,
            blur_overlays: self.blur_overlays,
            compositor: RegionCompositor::new(options.width, options.height),
            width: options.width,
            height: options.height,
            background: options.background,
            settle_timeout: Duration::from_millis(options.timings.video_settle_ms),
            poll_interval: options.poll_interval(),
        };
        run_frame_loop("single_video", &mut acquirer, seeker, total_frames, options, progress).await
    }
}

struct SingleVideoAcquirer {
    video: Accessor<Arc<dyn VideoElement>>,
    blur_overlays: Vec<BlurOverlay>,
    compositor: RegionCompositor,
    width: u32,
    height: u32,
    background: Rgba8Color,
    settle_timeout: Duration,
    poll_interval: Duration,
}

#[async_trait]
impl FrameAcquirer for SingleVideoAcquirer {
    async fn acquire(&mut self, frame: u64, stats: &mut CaptureStats) -> Result<RgbaImage, AcquireError> {
        let video = (self.video)().ok_or(AcquireError::TargetMissing)?;

        let ready = Arc::clone(&video);
        if wait_until(move || ready.is_ready(), self.poll_interval, self.settle_timeout)
            .await
            .timed_out()
        {
            stats.settle_timeouts += 1;
            tracing::trace!(frame, "Video not ready before settle timeout");
        }

        let (w, h) = video.natural_size();
        if w == 0 || h == 0 {
            return Err(AcquireError::NotReady);
        }
        let source = video.current_frame()?;

        let mut canvas = blank_frame(self.width, self.height, self.background);
        draw_contained(&mut canvas, &source);

        let regions = regions_for_frame(&self.blur_overlays, frame, self.width, self.height);
        self.compositor.apply(&mut canvas, &regions);
        Ok(canvas)
    }
}
