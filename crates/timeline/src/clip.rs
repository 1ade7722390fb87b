//! Video clips and the transitions that join them.

use serde::{Deserialize, Serialize};

use crate::timeline::TimelineError;

/// A trimmed segment of a source video placed on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoClip {
    /// Stable clip identifier.
    pub id: String,

    /// URL of the source media.
    pub media_source: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Native duration of the source in frames.
    pub original_duration_frames: u64,

    /// First included source frame.
    pub trim_start_frame: u64,

    /// One past the last included source frame.
    pub trim_end_frame: u64,

    /// Absolute timeline position. Derived by the sequencer, never hand-edited.
    #[serde(default)]
    pub start_frame: u64,

    /// Playback volume [0.0, 1.0]. Carried through, not mixed by the exporter.
    #[serde(default = "default_volume")]
    pub volume: f32,
}

fn default_volume() -> f32 {
    1.0
}

impl VideoClip {
    /// Create an untrimmed clip covering the whole source.
    pub fn new(
        id: impl Into<String>,
        media_source: impl Into<String>,
        original_duration_frames: u64,
    ) -> Self {
        Self {
            id: id.into(),
            media_source: media_source.into(),
            name: String::new(),
            original_duration_frames,
            trim_start_frame: 0,
            trim_end_frame: original_duration_frames,
            start_frame: 0,
            volume: 1.0,
        }
    }

    /// Builder-style trim.
    pub fn trimmed(mut self, trim_start_frame: u64, trim_end_frame: u64) -> Self {
        self.trim_start_frame = trim_start_frame;
        self.trim_end_frame = trim_end_frame;
        self
    }

    /// Number of frames this clip contributes to the timeline.
    pub fn trimmed_duration(&self) -> u64 {
        self.trim_end_frame.saturating_sub(self.trim_start_frame)
    }

    /// One past the last timeline frame occupied by this clip.
    pub fn end_frame(&self) -> u64 {
        self.start_frame + self.trimmed_duration()
    }

    /// Whether `frame` (timeline position) falls inside this clip.
    pub fn contains_frame(&self, frame: u64) -> bool {
        frame >= self.start_frame && frame < self.end_frame()
    }

    /// Map a timeline frame to the source frame to display.
    ///
    /// Frames before the clip clamp to the trim start, frames after it clamp
    /// to the last included source frame.
    pub fn source_frame_at(&self, frame: u64) -> u64 {
        let offset = frame.saturating_sub(self.start_frame);
        let last = self.trim_end_frame.saturating_sub(1).max(self.trim_start_frame);
        (self.trim_start_frame + offset).min(last)
    }

    /// Check `0 <= trim_start < trim_end <= original_duration`.
    pub fn validate(&self) -> Result<(), TimelineError> {
        if self.trim_start_frame >= self.trim_end_frame
            || self.trim_end_frame > self.original_duration_frames
        {
            return Err(TimelineError::InvalidTrim {
                clip_id: self.id.clone(),
                trim_start: self.trim_start_frame,
                trim_end: self.trim_end_frame,
                duration: self.original_duration_frames,
            });
        }
        Ok(())
    }
}

/// Visual style of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    #[default]
    Fade,
    Dissolve,
    SlideLeft,
    SlideRight,
    Wipe,
    Zoom,
}

/// An overlap between two consecutive clips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub id: String,

    #[serde(default)]
    pub kind: TransitionKind,

    /// Frames during which both clips are active.
    pub overlap_frames: u64,

    /// Clip the transition leaves.
    pub preceding_clip_id: String,

    /// Clip the transition enters.
    pub following_clip_id: String,
}

impl Transition {
    pub fn new(
        id: impl Into<String>,
        kind: TransitionKind,
        overlap_frames: u64,
        preceding_clip_id: impl Into<String>,
        following_clip_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            overlap_frames,
            preceding_clip_id: preceding_clip_id.into(),
            following_clip_id: following_clip_id.into(),
        }
    }

    /// Whether this transition joins `preceding` directly to `following`.
    pub fn connects(&self, preceding: &VideoClip, following: &VideoClip) -> bool {
        self.preceding_clip_id == preceding.id && self.following_clip_id == following.id
    }
}
