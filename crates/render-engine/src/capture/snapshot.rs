//! Snapshot fallback: rasterizes the host's visual tree for every frame.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use loopforge_common::{settle_for, EngineResult};
use loopforge_timeline::PixelRect;

use super::{run_frame_loop, CaptureOptions, CaptureStats, CapturedFrames, FrameAcquirer};
use crate::geometry::{blank_frame, draw_placed, fit_rect, FitMode};
use crate::host::{AcquireError, Seeker, SnapshotRenderer};
use crate::progress::ProgressCallback;

/// Captures through a [`SnapshotRenderer`], after a fixed delay per seek.
pub struct SnapshotCapture {
    renderer: Arc<dyn SnapshotRenderer>,
}

impl SnapshotCapture {
    pub fn new(renderer: Arc<dyn SnapshotRenderer>) -> Self {
        Self { renderer }
    }

    pub(super) async fn capture(
        self,
        seeker: &mut dyn Seeker,
        total_frames: u64,
        options: &CaptureOptions,
        progress: Option<&ProgressCallback>,
    ) -> EngineResult<CapturedFrames> {
        tracing::warn!(total_frames, "Using snapshot capture; expect a slow export");
        let mut acquirer = SnapshotAcquirer {
            renderer: self.renderer,
            options: options.clone(),
            delay: Duration::from_millis(options.timings.snapshot_delay_ms),
        };
        run_frame_loop("snapshot", &mut acquirer, seeker, total_frames, options, progress).await
    }
}

struct SnapshotAcquirer {
    renderer: Arc<dyn SnapshotRenderer>,
    options: CaptureOptions,
    delay: Duration,
}

#[async_trait]
impl FrameAcquirer for SnapshotAcquirer {
    async fn acquire(&mut self, _frame: u64, _stats: &mut CaptureStats) -> Result<RgbaImage, AcquireError> {
        settle_for(self.delay).await;

        let snapshot = self.renderer.snapshot().await?;
        if snapshot.width() == 0 || snapshot.height() == 0 {
            return Err(AcquireError::NotReady);
        }

        let (width, height) = (self.options.width, self.options.height);
        let mut canvas = blank_frame(width, height, self.options.background);
        let dest = PixelRect::new(0.0, 0.0, width as f64, height as f64);
        let placement = fit_rect(snapshot.width(), snapshot.height(), dest, FitMode::Fill);
        draw_placed(&mut canvas, &snapshot, &placement);
        Ok(canvas)
    }
}
