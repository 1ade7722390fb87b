//! The read-only composition snapshot handed to the export engine.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::clip::{Transition, VideoClip};
use crate::overlay::{BlurRegion, Overlay};
use crate::sequencer::{compute_clip_start_frames, compute_total_duration, get_timeline_snap_points, snap_frame};
use crate::settings::EditorSettings;

/// Clips, transitions, overlays and settings for one export run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    #[serde(default)]
    pub clips: Vec<VideoClip>,

    #[serde(default)]
    pub transitions: Vec<Transition>,

    #[serde(default)]
    pub overlays: Vec<Overlay>,

    #[serde(default)]
    pub settings: EditorSettings,
}

impl Timeline {
    pub fn new(settings: EditorSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    /// Parse a snapshot and lay out its clips.
    pub fn from_json(json: &str) -> Result<Self, TimelineError> {
        let mut timeline: Timeline = serde_json::from_str(json)?;
        timeline.relayout();
        Ok(timeline)
    }

    pub fn to_json(&self) -> Result<String, TimelineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Recompute every clip's `start_frame`.
    pub fn relayout(&mut self) {
        self.clips = compute_clip_start_frames(&self.clips, &self.transitions);
    }

    /// Composition length in frames (at least 1).
    pub fn total_frames(&self) -> u64 {
        compute_total_duration(&self.clips, &self.transitions)
    }

    pub fn snap_points(&self) -> Vec<u64> {
        get_timeline_snap_points(&self.clips, &self.transitions, self.settings.fps)
    }

    /// Snap `frame` to the nearest snap point within the settings' tolerance.
    pub fn snap(&self, frame: u64) -> u64 {
        snap_frame(frame, &self.snap_points(), self.settings.snap_tolerance_frames)
    }

    /// Clips visible at `frame`; two clips during a transition overlap.
    pub fn active_clips_at(&self, frame: u64) -> Vec<&VideoClip> {
        self.clips.iter().filter(|c| c.contains_frame(frame)).collect()
    }

    /// Overlays visible at `frame`, in draw order (track, then list order).
    pub fn overlays_at(&self, frame: u64) -> Vec<&Overlay> {
        let mut active: Vec<&Overlay> = self
            .overlays
            .iter()
            .filter(|o| o.is_active_at(frame))
            .collect();
        active.sort_by_key(|o| o.base().track_id);
        active
    }

    /// Pixel-space blur regions visible at `frame` for the configured output size.
    pub fn blur_regions_at(&self, frame: u64) -> Vec<BlurRegion> {
        self.blur_regions_at_size(frame, self.settings.width, self.settings.height)
    }

    /// Pixel-space blur regions visible at `frame` for a `width x height` raster.
    pub fn blur_regions_at_size(&self, frame: u64, width: u32, height: u32) -> Vec<BlurRegion> {
        self.overlays_at(frame)
            .into_iter()
            .filter_map(Overlay::as_blur)
            .map(|blur| blur.to_region(width, height))
            .collect()
    }

    /// Distinct media URLs referenced by clips and image stickers, first-seen order.
    pub fn media_sources(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.clips
            .iter()
            .map(|c| c.media_source.as_str())
            .chain(self.overlays.iter().filter_map(Overlay::media_source))
            .filter(|url| seen.insert(*url))
            .map(str::to_string)
            .collect()
    }

    /// The composition is one trimmed video with no transitions.
    ///
    /// Such timelines can use the direct single-video capture path.
    pub fn is_single_video(&self) -> bool {
        self.clips.len() == 1 && self.transitions.is_empty()
    }

    /// Strict validation: settings, clip trims, transition references and overlaps.
    pub fn validate(&self) -> Result<(), TimelineError> {
        self.settings.validate()?;
        for clip in &self.clips {
            clip.validate()?;
        }
        for transition in &self.transitions {
            let find = |id: &str| {
                self.clips.iter().find(|c| c.id == id).ok_or_else(|| TimelineError::UnknownClip {
                    transition_id: transition.id.clone(),
                    clip_id: id.to_string(),
                })
            };
            let prev = find(&transition.preceding_clip_id)?;
            let next = find(&transition.following_clip_id)?;
            let max = prev.trimmed_duration().min(next.trimmed_duration());
            if transition.overlap_frames > max {
                return Err(TimelineError::OverlapTooLarge {
                    transition_id: transition.id.clone(),
                    overlap: transition.overlap_frames,
                    max,
                });
            }
        }
        Ok(())
    }
}

/// Errors raised by strict timeline validation and snapshot parsing.
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("Clip {clip_id} has invalid trim [{trim_start}, {trim_end}) for duration {duration}")]
    InvalidTrim {
        clip_id: String,
        trim_start: u64,
        trim_end: u64,
        duration: u64,
    },

    #[error("Transition {transition_id} references unknown clip {clip_id}")]
    UnknownClip {
        transition_id: String,
        clip_id: String,
    },

    #[error("Transition {transition_id} overlap {overlap} exceeds neighbouring clip duration {max}")]
    OverlapTooLarge {
        transition_id: String,
        overlap: u64,
        max: u64,
    },

    #[error("Invalid settings: {message}")]
    InvalidSettings { message: String },

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
