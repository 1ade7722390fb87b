//! Generic surface capture: copies a raster the host renders into.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use loopforge_common::EngineResult;

use super::{run_frame_loop, settle, CaptureOptions, CaptureStats, CapturedFrames, FrameAcquirer};
use crate::geometry::resize_to;
use crate::host::{AcquireError, Accessor, ReadyPredicate, Seeker};
use crate::progress::ProgressCallback;

/// Captures a host surface, stretched to the output raster.
pub struct SurfaceCapture {
    surface: Accessor<Arc<RgbaImage>>,
    ready: Option<ReadyPredicate>,
}

impl SurfaceCapture {
    pub fn new(surface: Accessor<Arc<RgbaImage>>) -> Self {
        Self { surface, ready: None }
    }

    pub fn with_ready(mut self, ready: ReadyPredicate) -> Self {
        self.ready = Some(ready);
        self
    }

    pub(super) async fn capture(
        self,
        seeker: &mut dyn Seeker,
        total_frames: u64,
        options: &CaptureOptions,
        progress: Option<&ProgressCallback>,
    ) -> EngineResult<CapturedFrames> {
        let mut acquirer = SurfaceAcquirer {
            surface: self.surface,
            ready: self.ready,
            options: options.clone(),
            settle_timeout: Duration::from_millis(options.timings.surface_settle_ms),
        };
        run_frame_loop("surface", &mut acquirer, seeker, total_frames, options, progress).await
    }
}

struct SurfaceAcquirer {
    surface: Accessor<Arc<RgbaImage>>,
    ready: Option<ReadyPredicate>,
    options: CaptureOptions,
    settle_timeout: Duration,
}

#[async_trait]
impl FrameAcquirer for SurfaceAcquirer {
    async fn acquire(&mut self, _frame: u64, stats: &mut CaptureStats) -> Result<RgbaImage, AcquireError> {
        if settle(self.ready.as_ref(), &self.options, self.settle_timeout)
            .await
            .timed_out()
        {
            stats.settle_timeouts += 1;
        }

        let surface = (self.surface)().ok_or(AcquireError::TargetMissing)?;
        if surface.width() == 0 || surface.height() == 0 {
            return Err(AcquireError::NotReady);
        }
        Ok(resize_to(&surface, self.options.width, self.options.height))
    }
}
