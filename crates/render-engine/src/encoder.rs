//! Animated GIF encoder adapter.
//!
//! Frames are palette-quantized in parallel on a [`WorkerPool`] and packed
//! sequentially, in order, into a single GIF byte stream. Every frame carries
//! the same delay, derived from the frame rate.
//!
//! Progress is split across the adapter's span: frame ingestion reports into
//! the first half (every `progress_batch` frames), packing into the second.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use crossbeam_channel::{unbounded, RecvTimeoutError};
use image::RgbaImage;
use loopforge_common::{frame_delay_ms, CancelFlag, EncoderConfig, EngineError, EngineResult, ProgressThrottle};

use crate::geometry::resize_to;
use crate::progress::{emit, ExportPhase, ExportProgress, ProgressCallback, ProgressSpan};
use crate::workers::WorkerPool;

/// Quantizer speed range accepted by the encoder.
const QUALITY_RANGE: std::ops::RangeInclusive<u8> = 1..=30;

/// How often the packer re-checks cancellation while waiting on workers.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Output parameters of an encode.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Quantizer quality, 1 (best) ..= 30 (fastest).
    pub quality: u8,
    /// Loop count; 0 loops forever.
    pub repeat: u16,
}

impl EncodeSettings {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self::from_config(width, height, fps, &EncoderConfig::default())
    }

    /// Settings with quality and repeat taken from `config`.
    pub fn from_config(width: u32, height: u32, fps: f64, config: &EncoderConfig) -> Self {
        Self {
            width,
            height,
            fps,
            quality: config.default_quality,
            repeat: config.repeat,
        }
    }

    /// Per-frame delay in milliseconds: `round(1000 / fps)`.
    pub fn frame_delay_ms(&self) -> u32 {
        frame_delay_ms(self.fps)
    }

    /// GIF delays are stored in hundredths of a second.
    fn delay_centis(&self) -> u16 {
        (self.frame_delay_ms() as f64 / 10.0).round().min(u16::MAX as f64) as u16
    }

    pub fn validate(&self) -> EngineResult<()> {
        let max = u16::MAX as u32;
        if self.width == 0 || self.height == 0 || self.width > max || self.height > max {
            return Err(EngineError::invalid_settings(format!(
                "output size {}x{} must be within 1..={max}",
                self.width, self.height
            )));
        }
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(EngineError::invalid_settings(format!("fps must be positive, got {}", self.fps)));
        }
        if !QUALITY_RANGE.contains(&self.quality) {
            return Err(EngineError::invalid_settings(format!(
                "quality must be within 1..=30, got {}",
                self.quality
            )));
        }
        Ok(())
    }
}

/// Turns ordered frames into an animation byte stream.
#[async_trait]
pub trait AnimationEncoder: Send + Sync {
    /// Encode `frames`, reporting `Encoding` progress inside `span` and a
    /// final `Complete` at 100 before resolving.
    async fn encode(
        &self,
        frames: Vec<RgbaImage>,
        settings: &EncodeSettings,
        span: ProgressSpan,
        progress: Option<ProgressCallback>,
        cancel: CancelFlag,
    ) -> EngineResult<Vec<u8>>;

    /// Encoder name.
    fn name(&self) -> &str;
}

/// Encodes ordered frames into an animated GIF.
#[derive(Debug, Clone, Default)]
pub struct GifEncoder {
    config: EncoderConfig,
}

impl GifEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AnimationEncoder for GifEncoder {
    /// Runs on a blocking thread so quantization never stalls the runtime.
    async fn encode(
        &self,
        frames: Vec<RgbaImage>,
        settings: &EncodeSettings,
        span: ProgressSpan,
        progress: Option<ProgressCallback>,
        cancel: CancelFlag,
    ) -> EngineResult<Vec<u8>> {
        settings.validate()?;
        if frames.is_empty() {
            return Err(EngineError::no_frames("nothing to encode"));
        }

        let config = self.config.clone();
        let settings = settings.clone();
        let bytes = tokio::task::spawn_blocking(move || {
            encode_blocking(frames, &settings, &config, span, progress.as_ref(), &cancel)
        })
        .await
        .map_err(|e| EngineError::encoder(format!("encoder task failed: {e}")))??;

        Ok(bytes)
    }

    fn name(&self) -> &str {
        "gif"
    }
}

fn encode_blocking(
    frames: Vec<RgbaImage>,
    settings: &EncodeSettings,
    config: &EncoderConfig,
    span: ProgressSpan,
    progress: Option<&ProgressCallback>,
    cancel: &CancelFlag,
) -> EngineResult<Vec<u8>> {
    let total = frames.len();
    let width = settings.width as u16;
    let height = settings.height as u16;
    let delay = settings.delay_centis();
    let speed = settings.quality as i32;
    let ingest_span = span.slice(0.0, 0.5);
    let pack_span = span.slice(0.5, 1.0);

    tracing::info!(
        frames = total,
        width,
        height,
        delay_ms = settings.frame_delay_ms(),
        quality = settings.quality,
        "Encoding animation"
    );

    let pool = WorkerPool::new(config.worker_count(), "loopforge-encoder")?;
    let (tx, rx) = unbounded::<(usize, gif::Frame<'static>)>();
    let throttle = ProgressThrottle::new(config.progress_batch, total);

    for (index, frame) in frames.into_iter().enumerate() {
        cancel.check()?;

        let frame = if frame.dimensions() == (settings.width, settings.height) {
            frame
        } else {
            tracing::warn!(
                index,
                width = frame.width(),
                height = frame.height(),
                "Frame size differs from output, resampling"
            );
            resize_to(&frame, settings.width, settings.height)
        };

        let tx = tx.clone();
        pool.execute(move || {
            let mut pixels = frame.into_raw();
            let mut quantized = gif::Frame::from_rgba_speed(width, height, &mut pixels, speed);
            quantized.delay = delay;
            // Receiver gone means the encode was abandoned.
            let _ = tx.send((index, quantized));
        })?;

        if throttle.should_emit(index) {
            emit(
                progress,
                ExportProgress::new(ExportPhase::Encoding, ingest_span.at((index + 1) as f64 / total as f64))
                    .with_frames(index as u64 + 1, total as u64),
            );
        }
    }
    drop(tx);

    let mut encoder = gif::Encoder::new(Vec::new(), width, height, &[]).map_err(encoder_error)?;
    let repeat = match settings.repeat {
        0 => gif::Repeat::Infinite,
        n => gif::Repeat::Finite(n),
    };
    encoder.set_repeat(repeat).map_err(encoder_error)?;

    let mut pending = BTreeMap::new();
    let mut written = 0usize;
    while written < total {
        cancel.check()?;
        let (index, frame) = match rx.recv_timeout(CANCEL_POLL) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                cancel.check()?;
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(EngineError::encoder(format!(
                    "quantization workers stopped after {written} of {total} frames"
                )));
            }
        };
        pending.insert(index, frame);

        while let Some(frame) = pending.remove(&written) {
            cancel.check()?;
            encoder.write_frame(&frame).map_err(encoder_error)?;
            written += 1;
            if throttle.should_emit(written - 1) {
                emit(
                    progress,
                    ExportProgress::new(ExportPhase::Encoding, pack_span.at(written as f64 / total as f64))
                        .with_frames(written as u64, total as u64),
                );
            }
        }
    }
    drop(pool);
    cancel.check()?;

    let bytes = encoder
        .into_inner()
        .map_err(|e| EngineError::encoder(format!("failed to finish stream: {e}")))?;

    tracing::info!(frames = total, bytes = bytes.len(), "Animation encoded");
    emit(progress, ExportProgress::complete().with_frames(total as u64, total as u64));
    Ok(bytes)
}

fn encoder_error(e: gif::EncodingError) -> EngineError {
    EngineError::encoder(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::sync::{Arc, Mutex};

    fn frames(count: usize, width: u32, height: u32) -> Vec<RgbaImage> {
        (0..count)
            .map(|i| RgbaImage::from_pixel(width, height, Rgba([(i * 40) as u8, 0, 255, 255])))
            .collect()
    }

    fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<ExportProgress>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |update| sink.lock().unwrap().push(update));
        (callback, seen)
    }

    #[test]
    fn test_settings_validation() {
        assert!(EncodeSettings::new(1080, 1920, 30.0).validate().is_ok());
        assert!(EncodeSettings::new(0, 10, 30.0).validate().is_err());
        assert!(EncodeSettings::new(70_000, 10, 30.0).validate().is_err());
        assert!(EncodeSettings::new(10, 10, 0.0).validate().is_err());

        let mut settings = EncodeSettings::new(10, 10, 30.0);
        settings.quality = 31;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_delay_units() {
        assert_eq!(EncodeSettings::new(1, 1, 10.0).frame_delay_ms(), 100);
        assert_eq!(EncodeSettings::new(1, 1, 10.0).delay_centis(), 10);
        assert_eq!(EncodeSettings::new(1, 1, 30.0).frame_delay_ms(), 33);
        assert_eq!(EncodeSettings::new(1, 1, 30.0).delay_centis(), 3);
    }

    #[tokio::test]
    async fn test_encodes_ordered_gif() {
        let (callback, seen) = recorder();
        let settings = EncodeSettings::new(16, 8, 10.0);
        let bytes = GifEncoder::default()
            .encode(frames(12, 16, 8), &settings, ProgressSpan::FULL, Some(callback), CancelFlag::new())
            .await
            .unwrap();

        assert_eq!(&bytes[..6], b"GIF89a");
        assert_eq!(*bytes.last().unwrap(), 0x3B);

        let mut decoder = gif::DecodeOptions::new().read_info(std::io::Cursor::new(bytes)).unwrap();
        let mut count = 0;
        while let Some(frame) = decoder.read_next_frame().unwrap() {
            assert_eq!(frame.delay, 10);
            assert_eq!((frame.width, frame.height), (16, 8));
            count += 1;
        }
        assert_eq!(count, 12);

        let seen = seen.lock().unwrap();
        let last = seen.last().unwrap();
        assert_eq!(last.phase, ExportPhase::Complete);
        assert_eq!(last.progress, 100);
        assert!(seen.windows(2).all(|w| w[0].progress <= w[1].progress));
        assert!(seen[..seen.len() - 1].iter().all(|p| p.phase == ExportPhase::Encoding));
    }

    #[tokio::test]
    async fn test_resamples_mismatched_frames() {
        let mut input = frames(2, 8, 8);
        input.push(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])));
        let bytes = GifEncoder::default()
            .encode(input, &EncodeSettings::new(8, 8, 5.0), ProgressSpan::FULL, None, CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(&bytes[..6], b"GIF89a");
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let err = GifEncoder::default()
            .encode(Vec::new(), &EncodeSettings::new(8, 8, 5.0), ProgressSpan::FULL, None, CancelFlag::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "no_frames");
    }

    #[tokio::test]
    async fn test_cancel_during_packing() {
        let cancel = CancelFlag::new();
        let trip = cancel.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |update: ExportProgress| {
            if update.phase == ExportPhase::Encoding && update.progress > 50 {
                trip.cancel();
            }
            sink.lock().unwrap().push(update);
        });

        let err = GifEncoder::default()
            .encode(
                frames(12, 16, 8),
                &EncodeSettings::new(16, 8, 10.0),
                ProgressSpan::FULL,
                Some(callback),
                cancel,
            )
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        let seen = seen.lock().unwrap();
        assert!(seen.iter().any(|p| p.progress > 50));
        assert!(seen.iter().all(|p| p.phase != ExportPhase::Complete));
    }

    #[tokio::test]
    async fn test_cancelled_before_ingest() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = GifEncoder::default()
            .encode(frames(3, 8, 8), &EncodeSettings::new(8, 8, 5.0), ProgressSpan::FULL, None, cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
