//! Export progress reporting.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Export phase reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportPhase {
    Capturing,
    Encoding,
    Complete,
}

/// A progress update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportProgress {
    pub phase: ExportPhase,
    /// Overall progress, 0-100.
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_frame: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<u64>,
}

impl ExportProgress {
    pub fn new(phase: ExportPhase, progress: u8) -> Self {
        Self {
            phase,
            progress: progress.min(100),
            current_frame: None,
            total_frames: None,
        }
    }

    pub fn with_frames(mut self, current: u64, total: u64) -> Self {
        self.current_frame = Some(current);
        self.total_frames = Some(total);
        self
    }

    pub fn complete() -> Self {
        Self::new(ExportPhase::Complete, 100)
    }
}

/// Progress callback. Invoked from the capture task and from the encoder's
/// blocking thread, so it must be thread-safe.
pub type ProgressCallback = Arc<dyn Fn(ExportProgress) + Send + Sync>;

pub(crate) fn emit(callback: Option<&ProgressCallback>, update: ExportProgress) {
    if let Some(callback) = callback {
        callback(update);
    }
}

/// The slice of the 0-100 range a phase reports into.
///
/// Capture followed by encode reports 0-50 then 50-100, keeping the
/// overall value monotonic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSpan {
    pub start: f64,
    pub end: f64,
}

impl ProgressSpan {
    pub const FULL: ProgressSpan = ProgressSpan::new(0.0, 100.0);
    pub const FIRST_HALF: ProgressSpan = ProgressSpan::new(0.0, 50.0);
    pub const SECOND_HALF: ProgressSpan = ProgressSpan::new(50.0, 100.0);

    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Percentage at `fraction` (clamped to 0..=1) of the way through.
    pub fn at(&self, fraction: f64) -> u8 {
        let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
        (self.start + (self.end - self.start) * fraction).round().clamp(0.0, 100.0) as u8
    }

    /// The part of this span between fractions `from` and `to`.
    pub fn slice(&self, from: f64, to: f64) -> ProgressSpan {
        let width = self.end - self.start;
        ProgressSpan::new(self.start + width * from, self.start + width * to)
    }
}

impl Default for ProgressSpan {
    fn default() -> Self {
        Self::FULL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_mapping() {
        assert_eq!(ProgressSpan::FULL.at(0.333), 33);
        assert_eq!(ProgressSpan::FIRST_HALF.at(1.0), 50);
        assert_eq!(ProgressSpan::SECOND_HALF.at(0.5), 75);
        assert_eq!(ProgressSpan::SECOND_HALF.at(7.0), 100);
        assert_eq!(ProgressSpan::FULL.at(f64::NAN), 0);
    }

    #[test]
    fn test_span_slice() {
        let ingest = ProgressSpan::SECOND_HALF.slice(0.0, 0.5);
        assert_eq!(ingest, ProgressSpan::new(50.0, 75.0));
        let pack = ProgressSpan::SECOND_HALF.slice(0.5, 1.0);
        assert_eq!(pack.at(1.0), 100);
    }

    #[test]
    fn test_progress_serializes_snake_case() {
        let json = serde_json::to_string(&ExportProgress::new(ExportPhase::Capturing, 12).with_frames(3, 30)).unwrap();
        assert_eq!(
            json,
            r#"{"phase":"capturing","progress":12,"current_frame":3,"total_frames":30}"#
        );
        let json = serde_json::to_string(&ExportProgress::complete()).unwrap();
        assert_eq!(json, r#"{"phase":"complete","progress":100}"#);
    }
}
