//! End-to-end mixer tests
//!
//! Drives a mixer on a manual null device, one period at a time:
//! - Handle lifetime and deferred removal
//! - Port routing, master gain and clipping
//! - Quality switches and processing rates
//! - Critical state

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use approx::assert_abs_diff_eq;
use sonant_engine::{
    EngineConfig, Mixer, MixerEvent, PeriodContext, PlayHandle, QualityMode, QualityProfile,
    RenderOutcome, SampleClipHandle, StereoFrame, StereoVolumeVector, ToneHandle, TrackId,
};

const FRAMES: usize = 256;

fn inline_config() -> EngineConfig {
    EngineConfig {
        multithreaded: false,
        lookahead: false,
        ..Default::default()
    }
}

fn mixer() -> Mixer {
    Mixer::new(inline_config()).unwrap()
}

/// Writes a constant value into every frame and counts its renders
struct Constant {
    value: f64,
    track: Option<TrackId>,
    renders: Arc<AtomicUsize>,
}

impl Constant {
    fn new(value: f64) -> Self {
        Self {
            value,
            track: None,
            renders: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl PlayHandle for Constant {
    fn render(&mut self, buffer: &mut [StereoFrame], ctx: &PeriodContext) -> RenderOutcome {
        self.renders.fetch_add(1, Ordering::SeqCst);
        buffer[..ctx.frames].fill(StereoFrame::mono(self.value));
        RenderOutcome::playing(ctx.frames)
    }

    fn track(&self) -> Option<TrackId> {
        self.track
    }
}

/// Plays `frames` frames of 0.1 and counts its own destruction
struct Tracked {
    remaining: usize,
    drops: Arc<AtomicUsize>,
}

impl Tracked {
    fn new(frames: usize, drops: &Arc<AtomicUsize>) -> Box<Self> {
        Box::new(Self {
            remaining: frames,
            drops: Arc::clone(drops),
        })
    }
}

impl PlayHandle for Tracked {
    fn render(&mut self, buffer: &mut [StereoFrame], ctx: &PeriodContext) -> RenderOutcome {
        let frames = self.remaining.min(ctx.frames);
        buffer[..frames].fill(StereoFrame::mono(0.1));
        self.remaining -= frames;
        if self.remaining == 0 {
            RenderOutcome::finished(frames)
        } else {
            RenderOutcome::playing(frames)
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLE LIFETIME
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_finished_handle_is_removed_at_next_boundary() {
    let mixer = mixer();
    let id = mixer
        .add_play_handle(Box::new(ToneHandle::new(440.0).with_length(300)))
        .unwrap();

    let first = mixer.next_period();
    assert!(first.iter_frames().any(|f| f[0] != 0.0));
    assert!(mixer.contains_play_handle(id));

    // 44 frames remain, the rest of the period is silent
    let second = mixer.next_period();
    assert!(second.iter_frames().skip(44).all(|f| f[0] == 0.0));
    assert!(!mixer.contains_play_handle(id));
    assert!(!mixer.has_play_handles());

    let third = mixer.next_period();
    assert!(third.samples().iter().all(|&s| s == 0.0));
    assert!(mixer.take_removed_play_handles().is_empty());
}

#[test]
fn test_finished_handle_is_destroyed_at_next_boundary() {
    let mixer = mixer();
    let drops = Arc::new(AtomicUsize::new(0));
    mixer.add_play_handle(Tracked::new(FRAMES + 10, &drops)).unwrap();

    mixer.next_period();
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    // Finishes during this period and is still alive until the boundary
    mixer.next_period();
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    mixer.next_period();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert!(mixer.take_removed_play_handles().is_empty());
}

#[test]
fn test_shut_down_drops_handles_and_refuses_new_ones() {
    let mixer = mixer();
    let drops = Arc::new(AtomicUsize::new(0));
    mixer.add_play_handle(Tracked::new(usize::MAX, &drops)).unwrap();
    let removed = mixer.add_play_handle(Tracked::new(usize::MAX, &drops)).unwrap();
    mixer.next_period();
    mixer.remove_play_handle(removed);
    mixer.next_period();

    mixer.shut_down();
    assert!(mixer.is_shut_down());
    assert!(!mixer.is_running());
    assert_eq!(drops.load(Ordering::SeqCst), 2);
    assert!(!mixer.has_play_handles());

    assert!(mixer.add_play_handle(Tracked::new(1, &drops)).is_none());
    assert_eq!(drops.load(Ordering::SeqCst), 3);
    assert!(mixer.next_period().samples().iter().all(|&s| s == 0.0));
}

#[test]
fn test_explicit_removal_hands_handle_back() {
    let mixer = mixer();
    let id = mixer.add_play_handle(Box::new(Constant::new(0.25))).unwrap();
    assert_abs_diff_eq!(mixer.next_period().frame(0)[0], 0.25);

    assert!(mixer.remove_play_handle(id));
    assert!(!mixer.has_play_handles());
    assert!(mixer.next_period().samples().iter().all(|&s| s == 0.0));

    let removed = mixer.take_removed_play_handles();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].0, id);
    assert!(!mixer.remove_play_handle(id));
}

#[test]
fn test_remove_play_handles_by_track() {
    let mixer = mixer();
    for track in [1, 1, 2] {
        let mut handle = Constant::new(0.1);
        handle.track = Some(TrackId(track));
        mixer.add_play_handle(Box::new(handle)).unwrap();
    }

    assert_eq!(mixer.remove_play_handles(TrackId(1)), 2);
    assert_eq!(mixer.play_handle_count(), 1);
    assert_abs_diff_eq!(mixer.next_period().frame(10)[1], 0.1);
    assert_eq!(mixer.take_removed_play_handles().len(), 2);
}

#[test]
fn test_clear_removes_everything() {
    let mixer = mixer();
    for _ in 0..5 {
        mixer.add_play_handle(Box::new(Constant::new(0.1))).unwrap();
    }
    assert_eq!(mixer.clear(), 5);
    assert!(mixer.next_period().samples().iter().all(|&s| s == 0.0));
    assert_eq!(mixer.take_removed_play_handles().len(), 5);
}

#[test]
fn test_clip_handle_plays_through_mixer() {
    let mixer = mixer();
    let clip = vec![StereoFrame::new(0.5, -0.5); FRAMES + 10];
    mixer
        .add_play_handle(Box::new(SampleClipHandle::new(clip)))
        .unwrap();

    let first = mixer.next_period();
    assert_eq!(first.frame(FRAMES - 1), &[0.5, -0.5]);
    let second = mixer.next_period();
    assert_eq!(second.frame(9), &[0.5, -0.5]);
    assert_eq!(second.frame(10), &[0.0, 0.0]);
    assert!(!mixer.has_play_handles());
}

// ═══════════════════════════════════════════════════════════════════════════════
// MIXING
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_master_is_clipped() {
    let mixer = mixer();
    mixer.add_play_handle(Box::new(Constant::new(0.6))).unwrap();
    mixer.add_play_handle(Box::new(Constant::new(0.6))).unwrap();

    let out = mixer.next_period();
    assert!(out.samples().iter().all(|&s| s == 1.0));
    assert_eq!(mixer.take_peaks(), (1.0, 1.0));
}

#[test]
fn test_negative_sum_is_clipped() {
    let mixer = mixer();
    mixer.add_play_handle(Box::new(Constant::new(-0.7))).unwrap();
    mixer.add_play_handle(Box::new(Constant::new(-0.7))).unwrap();
    assert!(mixer.next_period().samples().iter().all(|&s| s == -1.0));
}

#[test]
fn test_port_volume_and_master_gain() {
    let mixer = mixer();
    let port = mixer.add_audio_port("Drums");
    port.set_volume(StereoVolumeVector::new(0.5, 0.25));
    mixer
        .add_play_handle(Box::new(ToneHandle::new(0.0).on_port(port.id())))
        .unwrap();
    mixer.add_play_handle(Box::new(Constant::new(0.4))).unwrap();
    mixer.set_master_gain(0.5);

    // A 0 Hz tone is silent, only the master-routed constant remains
    let out = mixer.next_period();
    assert_abs_diff_eq!(out.frame(0)[0], 0.2);
    assert_abs_diff_eq!(out.frame(0)[1], 0.2);
    assert_eq!(mixer.audio_ports().len(), 1);
}

#[test]
fn test_surround_channels_repeat_stereo() {
    let config = EngineConfig {
        channels: 4,
        ..inline_config()
    };
    let mixer = Mixer::new(config).unwrap();
    mixer.add_play_handle(Box::new(Constant::new(0.3))).unwrap();

    let out = mixer.next_period();
    assert_eq!(out.channels(), 4);
    for &s in out.frame(5) {
        assert_abs_diff_eq!(s, 0.3);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// QUALITY AND RATES
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_processing_rates_follow_quality() {
    let mixer = mixer();
    assert_eq!(mixer.base_sample_rate(), 44100);
    assert_eq!(mixer.processing_sample_rate(), 44100);

    mixer
        .change_quality(QualityProfile::from_mode(QualityMode::FinalMix))
        .unwrap();
    assert_eq!(mixer.output_sample_rate(), 44100);
    assert_eq!(mixer.processing_sample_rate(), 352800);
    assert_eq!(mixer.current_quality(), QualityProfile::final_mix());

    mixer.change_quality(QualityProfile::draft()).unwrap();
    assert_eq!(mixer.processing_sample_rate(), 44100);
}

#[test]
fn test_handles_see_processing_rate() {
    struct RateProbe(Arc<AtomicUsize>);

    impl PlayHandle for RateProbe {
        fn render(&mut self, _buffer: &mut [StereoFrame], ctx: &PeriodContext) -> RenderOutcome {
            self.0.store(ctx.sample_rate as usize, Ordering::SeqCst);
            RenderOutcome::finished(0)
        }
    }

    let mixer = mixer();
    mixer.change_quality(QualityProfile::high_quality()).unwrap();
    let seen = Arc::new(AtomicUsize::new(0));
    mixer
        .add_play_handle(Box::new(RateProbe(Arc::clone(&seen))))
        .unwrap();
    mixer.next_period();
    assert_eq!(seen.load(Ordering::SeqCst), 88200);
}

#[test]
fn test_non_finite_handles_stay_bounded() {
    let mixer = mixer();
    mixer.add_play_handle(Box::new(Constant::new(f64::NAN))).unwrap();
    mixer.add_play_handle(Box::new(Constant::new(0.5))).unwrap();
    let period = mixer.next_period();
    assert!(period.samples().iter().all(|&s| (-1.0..=1.0).contains(&s)));
    assert!(period.samples().iter().all(|&s| s == 0.0));
    assert_eq!(mixer.take_peaks(), (0.0, 0.0));

    mixer.clear();
    mixer.add_play_handle(Box::new(Constant::new(f64::NEG_INFINITY))).unwrap();
    let period = mixer.next_period();
    assert!(period.samples().iter().all(|&s| s == -1.0));
    assert_eq!(mixer.take_peaks(), (1.0, 1.0));
}

#[test]
fn test_period_events_are_numbered() {
    let mixer = mixer();
    let events = mixer.events();
    for _ in 0..3 {
        mixer.next_period();
    }
    let periods: Vec<u64> = events
        .try_iter()
        .filter_map(|event| match event {
            MixerEvent::NextAudioBuffer { period, .. } => Some(period),
            _ => None,
        })
        .collect();
    assert_eq!(periods, vec![0, 1, 2]);
}

// ═══════════════════════════════════════════════════════════════════════════════
// CRITICAL STATE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_consecutive_overruns_refuse_new_handles() {
    let mixer = mixer();
    let drops = Arc::new(AtomicUsize::new(0));
    for _ in 0..7 {
        mixer.report_overrun();
    }
    assert!(!mixer.critical_xruns());
    assert!(mixer.add_play_handle(Box::new(Constant::new(0.1))).is_some());

    mixer.report_overrun();
    assert!(mixer.critical_xruns());
    assert!(mixer.add_play_handle(Tracked::new(FRAMES, &drops)).is_none());
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(mixer.overruns(), 8);

    // The overruns belong to the period this pull closes
    mixer.next_period();
    assert!(mixer.critical_xruns());

    // A device period without overruns ends the streak
    mixer.next_period();
    assert!(!mixer.critical_xruns());
    assert!(mixer.add_play_handle(Box::new(Constant::new(0.1))).is_some());
}

#[test]
fn test_device_overruns_accumulate_across_pulls() {
    let mixer = mixer();
    // One late device period after another
    for _ in 0..8 {
        mixer.next_period();
        mixer.report_overrun();
    }
    assert!(mixer.critical_xruns());
    assert_eq!(mixer.overruns(), 8);
}

#[test]
fn test_offline_rendering_is_never_critical() {
    let mixer = mixer();
    mixer.set_offline(true);
    for _ in 0..20 {
        mixer.report_overrun();
    }
    assert!(!mixer.critical_xruns());
    assert!(mixer.add_play_handle(Box::new(Constant::new(0.1))).is_some());
}

#[test]
fn test_config_from_json_drives_mixer() {
    let config = EngineConfig::from_json_str(
        r#"{ "frames_per_period": 128, "multithreaded": false, "quality": "HighQuality" }"#,
    )
    .unwrap();
    let mixer = Mixer::new(config).unwrap();
    assert_eq!(mixer.frames_per_period(), 128);
    assert_eq!(mixer.next_period().frames(), 128);
    assert_eq!(mixer.processing_sample_rate(), 88200);
}
