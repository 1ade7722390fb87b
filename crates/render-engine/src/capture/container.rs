//! Container-walk capture: draws every visible media element of the preview
//! container at its layout position.
//!
//! Sources are copied into local media before the loop starts (see
//! [`crate::origin`]). Layout coordinates are scaled into the output raster
//! with independent X and Y factors. Elements with an empty rectangle, or
//! lying entirely outside the container, are skipped.

use std::time::Duration;

use async_trait::async_trait;
use image::RgbaImage;
use loopforge_common::EngineResult;
use loopforge_timeline::{Rgba8Color, Timeline};

use super::{run_frame_loop, settle, CaptureOptions, CaptureStats, CapturedFrames, FrameAcquirer};
use crate::geometry::{blank_frame, draw_placed, fit_rect};
use crate::host::{AcquireError, Accessor, ContainerLayout, MediaKind, ReadyPredicate, Seeker};
use crate::origin::{LocalMediaSet, OriginResolver, SourceRef};
use crate::progress::ProgressCallback;

/// Captures a layout container by redrawing its media elements.
pub struct ContainerCapture {
    layout: Accessor<ContainerLayout>,
    resolver: OriginResolver,
    sources: Vec<SourceRef>,
    ready: Option<ReadyPredicate>,
}

impl ContainerCapture {
    pub fn new(layout: Accessor<ContainerLayout>, resolver: OriginResolver) -> Self {
        Self {
            layout,
            resolver,
            sources: Vec::new(),
            ready: None,
        }
    }

    /// Sources to resolve up front in addition to those in the initial layout.
    pub fn with_sources(mut self, sources: Vec<SourceRef>) -> Self {
        self.sources = sources;
        self
    }

    /// Resolve every source `timeline` references.
    pub fn with_timeline_sources(self, timeline: &Timeline) -> Self {
        self.with_sources(SourceRef::from_timeline(timeline))
    }

    /// Poll `ready` after each seek instead of sleeping the full settle time.
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
        let mut sources = self.sources;
        if let Some(layout) = (self.layout)() {
            sources.extend(
                layout
                    .items
                    .into_iter()
                    .map(|item| SourceRef::new(item.source_url, item.kind)),
            );
        }

        let media = self.resolver.prepare(&sources).await;
        let mut acquirer = ContainerAcquirer {
            layout: self.layout,
            ready: self.ready,
            media,
            options: options.clone(),
            settle_timeout: Duration::from_millis(options.timings.container_settle_ms),
            seek_timeout: Duration::from_millis(options.timings.seek_timeout_ms),
        };

        let result = run_frame_loop("container", &mut acquirer, seeker, total_frames, options, progress)
            .await
            .map(|mut captured| {
                captured.stats.sources_unavailable = acquirer.media.unavailable_count();
                captured
            });

        // Local copies are released here on every exit path.
        drop(acquirer);
        result
    }
}

struct ContainerAcquirer {
    layout: Accessor<ContainerLayout>,
    ready: Option<ReadyPredicate>,
    media: LocalMediaSet,
    options: CaptureOptions,
    settle_timeout: Duration,
    seek_timeout: Duration,
}

impl ContainerAcquirer {
    fn background(&self) -> Rgba8Color {
        self.options.background
    }
}

#[async_trait]
impl FrameAcquirer for ContainerAcquirer {
    async fn acquire(&mut self, frame: u64, stats: &mut CaptureStats) -> Result<RgbaImage, AcquireError> {
        if settle(self.ready.as_ref(), &self.options, self.settle_timeout)
            .await
            .timed_out()
        {
            stats.settle_timeouts += 1;
        }

        let layout = (self.layout)().ok_or(AcquireError::TargetMissing)?;
        let (width, height) = (self.options.width, self.options.height);
        let (sx, sy) = layout.scale_to(width, height);
        let bounds = layout.bounds();
        let mut canvas = blank_frame(width, height, self.background());

        for item in &layout.items {
            if !item.visible || item.rect.is_empty() || item.rect.intersect(&bounds).is_none() {
                continue;
            }
            let Some(media) = self.media.get(&item.source_url) else {
                if !self.media.is_unavailable(&item.source_url) {
                    tracing::debug!(frame, url = %item.source_url, "Media source was not prepared, skipping");
                }
                continue;
            };

            if media.kind() == MediaKind::Video
                && tokio::time::timeout(self.seek_timeout, media.seek(item.current_time))
                    .await
                    .is_err()
            {
                stats.seek_timeouts += 1;
                tracing::trace!(frame, url = %item.source_url, "Local media seek timed out");
            }

            let pixels = match media.frame() {
                Ok(pixels) => pixels,
                Err(e) => {
                    tracing::debug!(frame, url = %item.source_url, error = %e, "Media element unreadable, skipping");
                    continue;
                }
            };

            let dest = item.rect.scale(sx, sy);
            let placement = fit_rect(pixels.width(), pixels.height(), dest, item.fit);
            draw_placed(&mut canvas, &pixels, &placement);
        }

        Ok(canvas)
    }
}
