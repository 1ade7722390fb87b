use loopforge_timeline::clip::{Transition, TransitionKind, VideoClip};
use loopforge_timeline::sequencer::{
    compute_clip_start_frames, compute_total_duration, frames_to_time, seconds_to_frames,
};
use proptest::prelude::*;

/// Clips with valid trims plus, for each consecutive pair, an optional
/// transition whose overlap fits both neighbours.
fn valid_timeline() -> impl Strategy<Value = (Vec<VideoClip>, Vec<Transition>)> {
    prop::collection::vec((1u64..200, 0u64..50, prop::option::of(0u64..400)), 1..8).prop_map(
        |specs| {
            let clips: Vec<VideoClip> = specs
                .iter()
                .enumerate()
                .map(|(i, (trimmed, lead, _))| {
                    VideoClip::new(format!("c{i}"), format!("https://cdn.example/{i}.mp4"), lead + trimmed + 10)
                        .trimmed(*lead, lead + trimmed)
                })
                .collect();

            let transitions = specs
                .iter()
                .enumerate()
                .skip(1)
                .filter_map(|(i, &(_, _, overlap))| {
                    let max = clips[i - 1].trimmed_duration().min(clips[i].trimmed_duration());
                    overlap.map(|o| {
                        Transition::new(
                            format!("t{i}"),
                            TransitionKind::Fade,
                            o % (max + 1),
                            clips[i - 1].id.clone(),
                            clips[i].id.clone(),
                        )
                    })
                })
                .collect();

            (clips, transitions)
        },
    )
}

fn overlap_between(transitions: &[Transition], prev: &VideoClip, next: &VideoClip) -> u64 {
    transitions
        .iter()
        .find(|t| t.connects(prev, next))
        .map(|t| t.overlap_frames)
        .unwrap_or(0)
}

proptest! {
    #[test]
    fn total_duration_is_trimmed_sum_minus_overlaps((clips, transitions) in valid_timeline()) {
        let trimmed: u64 = clips.iter().map(VideoClip::trimmed_duration).sum();
        let overlaps: u64 = transitions.iter().map(|t| t.overlap_frames).sum();
        let expected = trimmed.saturating_sub(overlaps).max(1);
        prop_assert_eq!(compute_total_duration(&clips, &transitions), expected);
    }

    #[test]
    fn start_frames_follow_predecessor((clips, transitions) in valid_timeline()) {
        let laid_out = compute_clip_start_frames(&clips, &transitions);
        prop_assert_eq!(laid_out[0].start_frame, 0);
        for i in 1..laid_out.len() {
            let prev = &laid_out[i - 1];
            let expected = prev.start_frame + prev.trimmed_duration()
                - overlap_between(&transitions, prev, &laid_out[i]);
            prop_assert_eq!(laid_out[i].start_frame, expected);
            prop_assert!(laid_out[i].start_frame >= prev.start_frame);
        }
    }

    #[test]
    fn frame_time_round_trip_within_one_frame(frame in 0u64..1_000_000, fps in 0.5f64..240.0) {
        let back = seconds_to_frames(frames_to_time(frame, fps), fps);
        prop_assert!(back.abs_diff(frame) <= 1);
    }
}

#[test]
fn two_clips_joined_by_fade() {
    let clips = vec![
        VideoClip::new("a", "https://cdn.example/a.mp4", 60),
        VideoClip::new("b", "https://cdn.example/b.mp4", 120).trimmed(20, 80),
    ];
    let transitions = vec![Transition::new("fade", TransitionKind::Fade, 10, "a", "b")];

    assert_eq!(compute_total_duration(&clips, &transitions), 110);
    assert_eq!(compute_clip_start_frames(&clips, &transitions)[1].start_frame, 50);
}
