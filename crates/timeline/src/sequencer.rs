//! Timeline sequencing: pure frame arithmetic over clips and transitions.
//!
//! Layout rule: the first clip starts at frame 0; every following clip starts
//! where its predecessor ends, pulled back by the overlap of the transition
//! joining the two (if any).
//!
//! Overlaps are clamped to the trimmed duration of the shorter neighbour so a
//! clip can never start before its predecessor. Transitions that do not join
//! two consecutive clips are ignored.

use crate::clip::{Transition, VideoClip};

/// Overlap between `clips[index - 1]` and `clips[index]`, clamped to both
/// neighbours' trimmed durations.
pub fn effective_overlap(clips: &[VideoClip], transitions: &[Transition], index: usize) -> u64 {
    if index == 0 || index >= clips.len() {
        return 0;
    }
    let prev = &clips[index - 1];
    let cur = &clips[index];
    let Some(transition) = transitions.iter().find(|t| t.connects(prev, cur)) else {
        return 0;
    };

    let max = prev.trimmed_duration().min(cur.trimmed_duration());
    if transition.overlap_frames > max {
        tracing::warn!(
            transition = %transition.id,
            overlap = transition.overlap_frames,
            max,
            "Transition overlap exceeds neighbouring clip duration; clamping"
        );
    }
    transition.overlap_frames.min(max)
}

/// Return `clips` with `start_frame` recomputed from trims and transitions.
pub fn compute_clip_start_frames(clips: &[VideoClip], transitions: &[Transition]) -> Vec<VideoClip> {
    let mut laid_out: Vec<VideoClip> = Vec::with_capacity(clips.len());
    for (index, clip) in clips.iter().enumerate() {
        let mut clip = clip.clone();
        clip.start_frame = match laid_out.last() {
            None => 0,
            Some(prev) => (prev.start_frame + prev.trimmed_duration())
                .saturating_sub(effective_overlap(clips, transitions, index)),
        };
        laid_out.push(clip);
    }
    laid_out
}

/// Total composition length: sum of trimmed durations minus overlaps,
/// never less than one frame.
pub fn compute_total_duration(clips: &[VideoClip], transitions: &[Transition]) -> u64 {
    let trimmed: u64 = clips.iter().map(VideoClip::trimmed_duration).sum();
    let overlaps: u64 = (1..clips.len())
        .map(|index| effective_overlap(clips, transitions, index))
        .sum();
    trimmed.saturating_sub(overlaps).max(1)
}

/// Sorted, deduplicated union of every clip boundary and every whole-second
/// tick up to the furthest boundary.
pub fn get_timeline_snap_points(clips: &[VideoClip], transitions: &[Transition], fps: f64) -> Vec<u64> {
    let laid_out = compute_clip_start_frames(clips, transitions);
    let mut points: Vec<u64> = laid_out
        .iter()
        .flat_map(|clip| [clip.start_frame, clip.end_frame()])
        .collect();
    points.push(0);

    let max_boundary = points.iter().copied().max().unwrap_or(0);
    if fps > 0.0 && fps.is_finite() {
        let mut second = 0u64;
        loop {
            let tick = seconds_to_frames(second as f64, fps);
            if tick > max_boundary {
                break;
            }
            points.push(tick);
            second += 1;
        }
    }

    points.sort_unstable();
    points.dedup();
    points
}

/// Seconds at which `frame` is shown.
pub fn frames_to_time(frame: u64, fps: f64) -> f64 {
    if fps <= 0.0 || !fps.is_finite() {
        return 0.0;
    }
    frame as f64 / fps
}

/// Frame shown at `seconds`: `round(seconds * fps)`, never negative.
pub fn seconds_to_frames(seconds: f64, fps: f64) -> u64 {
    if fps <= 0.0 || !fps.is_finite() || !seconds.is_finite() {
        return 0;
    }
    (seconds * fps).round().max(0.0) as u64
}

/// Snap `frame` to the nearest point within `tolerance` frames.
///
/// Ties go to the earlier point. Returns `frame` unchanged when nothing is close.
pub fn snap_frame(frame: u64, points: &[u64], tolerance: u64) -> u64 {
    points
        .iter()
        .copied()
        .filter(|point| point.abs_diff(frame) <= tolerance)
        .min_by_key(|point| (point.abs_diff(frame), *point))
        .unwrap_or(frame)
}

/// Format a frame as `MM:SS:FF`.
pub fn format_timecode(frame: u64, fps: f64) -> String {
    let fps_whole = if fps.is_finite() && fps >= 1.0 {
        fps.round() as u64
    } else {
        1
    };
    let total_secs = frame / fps_whole;
    let frames = frame % fps_whole;
    format!("{:02}:{:02}:{:02}", total_secs / 60, total_secs % 60, frames)
}
