//! Export job management: capture, encode, deliver.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use loopforge_common::{frame_delay_ms, CancelFlag, EngineConfig, EngineError, EngineResult};
use loopforge_timeline::Timeline;
use serde::{Deserialize, Serialize};

use crate::capture::{CaptureOptions, CaptureStats, CaptureStrategy};
use crate::encoder::{AnimationEncoder, EncodeSettings, GifEncoder};
use crate::host::Seeker;
use crate::progress::{ProgressCallback, ProgressSpan};

/// Pipeline state.
///
/// `Idle -> Capturing -> Encoding -> Done`, with `Error` and `Cancelled`
/// reachable from either active phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExportState {
    #[default]
    Idle,
    Capturing,
    Encoding,
    Done,
    Error,
    Cancelled,
}

impl ExportState {
    pub fn is_active(self) -> bool {
        matches!(self, ExportState::Capturing | ExportState::Encoding)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExportState::Done | ExportState::Error | ExportState::Cancelled)
    }

    /// Whether the pipeline may move from `self` to `next`.
    pub fn can_transition_to(self, next: ExportState) -> bool {
        use ExportState::*;
        matches!(
            (self, next),
            (Idle, Capturing)
                | (Capturing, Encoding)
                | (Encoding, Done)
                | (Capturing | Encoding, Error | Cancelled)
                | (Done | Error | Cancelled, Idle)
        )
    }
}

/// An export job ready to run.
#[derive(Debug)]
pub struct ExportJob {
    pub strategy: CaptureStrategy,
    /// Timeline length in frames, before stride sampling.
    pub total_frames: u64,
    pub capture: CaptureOptions,
    pub encode: EncodeSettings,
}

impl ExportJob {
    pub fn new(strategy: CaptureStrategy, total_frames: u64, capture: CaptureOptions, encode: EncodeSettings) -> Self {
        Self {
            strategy,
            total_frames,
            capture,
            encode,
        }
    }

    /// A job covering the whole of `timeline` at its output size and rate.
    ///
    /// Timings, quality, and loop count come from `config`.
    pub fn for_timeline(timeline: &Timeline, strategy: CaptureStrategy, config: &EngineConfig) -> Self {
        let settings = &timeline.settings;
        let capture = CaptureOptions::new(settings.width, settings.height).with_timings(config.timings.clone());
        let encode = EncodeSettings::from_config(settings.width, settings.height, settings.fps, &config.encoder);
        Self::new(strategy, timeline.total_frames(), capture, encode)
    }

    pub fn with_stride(mut self, every_nth_frame: u32) -> Self {
        self.capture.every_nth_frame = every_nth_frame;
        self
    }
}

/// Result of a finished export.
#[derive(Debug, Clone)]
pub struct ExportOutput {
    /// Encoded animation.
    pub bytes: Vec<u8>,
    pub frame_count: usize,
    pub frame_delay_ms: u32,
    pub stats: CaptureStats,
}

/// Observable handle on an export's state. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct ExportStatus {
    state: Arc<Mutex<ExportState>>,
}

impl ExportStatus {
    pub fn get(&self) -> ExportState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, next: ExportState) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.can_transition_to(next) {
            return Err(EngineError::invalid_settings(format!(
                "export cannot move from {:?} to {next:?}",
                *state
            )));
        }
        tracing::debug!(from = ?*state, to = ?next, "Export state transition");
        *state = next;
        Ok(())
    }
}

/// Runs export jobs and tracks their state.
///
/// A session runs one job at a time. After a job finishes, successfully or
/// not, the session can run another.
pub struct ExportSession {
    encoder: Arc<dyn AnimationEncoder>,
    status: ExportStatus,
    cancel: CancelFlag,
}

impl ExportSession {
    /// A session using the GIF encoder configured by `config`.
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_encoder(Arc::new(GifEncoder::new(config.encoder.clone())))
    }

    pub fn with_encoder(encoder: Arc<dyn AnimationEncoder>) -> Self {
        Self {
            encoder,
            status: ExportStatus::default(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn state(&self) -> ExportState {
        self.status.get()
    }

    /// A handle for observing the state from elsewhere.
    pub fn status(&self) -> ExportStatus {
        self.status.clone()
    }

    /// A handle that cancels the running job, or the next one when idle.
    /// A finished run retires its flag, so fetch a new handle per job.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Capture and encode `job`.
    ///
    /// Capture reports progress into 0-50 and encoding into 50-100, ending
    /// with a `Complete` update at 100.
    pub async fn run(
        &mut self,
        job: ExportJob,
        seeker: &mut dyn Seeker,
        progress: Option<ProgressCallback>,
    ) -> EngineResult<ExportOutput> {
        let current = self.status.get();
        if current.is_active() {
            return Err(EngineError::invalid_settings("an export is already running"));
        }
        if current.is_terminal() {
            self.status.transition(ExportState::Idle)?;
        }
        job.encode.validate()?;

        tracing::info!(
            strategy = job.strategy.name(),
            encoder = self.encoder.name(),
            total_frames = job.total_frames,
            width = job.encode.width,
            height = job.encode.height,
            fps = job.encode.fps,
            "Starting export"
        );

        self.status.transition(ExportState::Capturing)?;
        let result = self.run_phases(job, seeker, progress).await;
        self.cancel = CancelFlag::new();

        match &result {
            Ok(output) => {
                self.status.transition(ExportState::Done)?;
                tracing::info!(
                    frames = output.frame_count,
                    bytes = output.bytes.len(),
                    skipped = output.stats.skipped,
                    "Export complete"
                );
            }
            Err(e) if e.is_cancelled() => {
                self.status.transition(ExportState::Cancelled)?;
                tracing::info!("Export cancelled");
            }
            Err(e) => {
                self.status.transition(ExportState::Error)?;
                tracing::error!(code = e.code(), error = %e, "Export failed");
            }
        }
        result
    }

    async fn run_phases(
        &self,
        job: ExportJob,
        seeker: &mut dyn Seeker,
        progress: Option<ProgressCallback>,
    ) -> EngineResult<ExportOutput> {
        let strategy_name = job.strategy.name();
        let options = job
            .capture
            .with_span(ProgressSpan::FIRST_HALF)
            .with_cancel(self.cancel.clone());

        let captured = job
            .strategy
            .capture(seeker, job.total_frames, &options, progress.as_ref())
            .await?;
        if captured.is_empty() {
            return Err(EngineError::no_frames(format!(
                "{strategy_name} capture read none of {} sampled frames",
                captured.stats.requested
            )));
        }
        self.cancel.check()?;

        self.status.transition(ExportState::Encoding)?;
        let frame_count = captured.frames.len();
        let bytes = self
            .encoder
            .encode(
                captured.frames,
                &job.encode,
                ProgressSpan::SECOND_HALF,
                progress,
                self.cancel.clone(),
            )
            .await?;

        Ok(ExportOutput {
            bytes,
            frame_count,
            frame_delay_ms: frame_delay_ms(job.encode.fps),
            stats: captured.stats,
        })
    }
}

impl std::fmt::Debug for ExportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportSession")
            .field("encoder", &self.encoder.name())
            .field("state", &self.status.get())
            .finish()
    }
}

/// Export with a one-off session configured from `config`.
///
/// This is the main entry point for hosts that do not need to observe state.
pub async fn export_animation(
    job: ExportJob,
    seeker: &mut dyn Seeker,
    config: &EngineConfig,
    progress: Option<ProgressCallback>,
) -> EngineResult<ExportOutput> {
    ExportSession::new(config).run(job, seeker, progress).await
}

/// `animation-<unix millis>.gif`
pub fn default_file_name() -> String {
    format!("animation-{}.gif", chrono::Utc::now().timestamp_millis())
}

/// Write `bytes` to `dir/file_name`.
///
/// The data goes to a temporary sibling first and is renamed into place, so
/// a partially written file never appears under the final name.
pub fn save_animation(bytes: &[u8], dir: impl AsRef<Path>, file_name: &str) -> EngineResult<PathBuf> {
    if file_name.is_empty() || file_name.contains(|c: char| c == '/' || c == '\\') {
        return Err(EngineError::invalid_settings(format!("invalid file name {file_name:?}")));
    }
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let final_path = dir.join(file_name);
    let temp_path = dir.join(format!(".{file_name}.part"));
    if let Err(e) = std::fs::write(&temp_path, bytes).and_then(|()| std::fs::rename(&temp_path, &final_path)) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e.into());
    }

    tracing::info!(path = %final_path.display(), bytes = bytes.len(), "Animation saved");
    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        use ExportState::*;
        assert!(Idle.can_transition_to(Capturing));
        assert!(Capturing.can_transition_to(Encoding));
        assert!(Encoding.can_transition_to(Done));
        assert!(Capturing.can_transition_to(Error));
        assert!(Encoding.can_transition_to(Cancelled));
        assert!(Done.can_transition_to(Idle));

        assert!(!Idle.can_transition_to(Encoding));
        assert!(!Idle.can_transition_to(Error));
        assert!(!Capturing.can_transition_to(Done));
        assert!(!Done.can_transition_to(Capturing));
    }

    #[test]
    fn test_status_rejects_invalid_transition() {
        let status = ExportStatus::default();
        assert_eq!(status.get(), ExportState::Idle);
        assert!(status.transition(ExportState::Done).is_err());
        status.transition(ExportState::Capturing).unwrap();
        assert_eq!(status.clone().get(), ExportState::Capturing);
    }

    #[test]
    fn test_default_file_name() {
        let name = default_file_name();
        assert!(name.starts_with("animation-"));
        assert!(name.ends_with(".gif"));
        let millis = &name["animation-".len()..name.len() - ".gif".len()];
        assert!(millis.parse::<i64>().unwrap() > 0);
    }

    #[test]
    fn test_save_animation_writes_atomically() {
        let dir = std::env::temp_dir().join(format!("loopforge-save-{}", std::process::id()));
        let path = save_animation(b"GIF89a-test", &dir, "out.gif").unwrap();

        assert_eq!(path, dir.join("out.gif"));
        assert_eq!(std::fs::read(&path).unwrap(), b"GIF89a-test");
        assert!(!dir.join(".out.gif.part").exists());

        assert!(save_animation(b"x", &dir, "../escape.gif").is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
