//! Stock play handles

use std::f64::consts::TAU;
use std::sync::Arc;

use sonant_core::{Key, Octave, StereoFrame, frequency_for};

use crate::{AudioPortId, PeriodContext, PlayHandle, RenderOutcome, TrackId};

// ═══════════════════════════════════════════════════════════════════════════════
// TONE
// ═══════════════════════════════════════════════════════════════════════════════

/// Sine tone, endless or of fixed length
pub struct ToneHandle {
    frequency: f64,
    amplitude: f64,
    phase: f64,
    remaining: Option<u64>,
    start_offset: usize,
    port: Option<AudioPortId>,
    track: Option<TrackId>,
}

impl ToneHandle {
    pub fn new(frequency: f64) -> Self {
        Self {
            frequency,
            amplitude: 0.5,
            phase: 0.0,
            remaining: None,
            start_offset: 0,
            port: None,
            track: None,
        }
    }

    /// Tone at an equal-tempered pitch
    pub fn at_pitch(key: Key, octave: Octave) -> Self {
        Self::new(frequency_for(key, octave))
    }

    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Stop after `frames` frames
    pub fn with_length(mut self, frames: u64) -> Self {
        self.remaining = Some(frames);
        self
    }

    /// Start `frames` into the first period
    pub fn starting_at(mut self, frames: usize) -> Self {
        self.start_offset = frames;
        self
    }

    pub fn on_port(mut self, port: AudioPortId) -> Self {
        self.port = Some(port);
        self
    }

    pub fn on_track(mut self, track: TrackId) -> Self {
        self.track = Some(track);
        self
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }
}

impl PlayHandle for ToneHandle {
    fn render(&mut self, buffer: &mut [StereoFrame], ctx: &PeriodContext) -> RenderOutcome {
        let offset = std::mem::take(&mut self.start_offset).min(ctx.frames);
        let available = (ctx.frames - offset) as u64;
        let frames = self.remaining.map_or(available, |r| r.min(available)) as usize;

        let increment = TAU * self.frequency / ctx.sample_rate.max(1) as f64;
        for frame in &mut buffer[..frames] {
            *frame = StereoFrame::mono(self.phase.sin() * self.amplitude);
            self.phase = (self.phase + increment) % TAU;
        }

        let finished = match self.remaining.as_mut() {
            Some(remaining) => {
                *remaining -= frames as u64;
                *remaining == 0
            }
            None => false,
        };

        RenderOutcome {
            frames,
            offset,
            finished,
        }
    }

    fn track(&self) -> Option<TrackId> {
        self.track
    }

    fn audio_port(&self) -> Option<AudioPortId> {
        self.port
    }

    fn name(&self) -> &str {
        "tone"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SAMPLE CLIP
// ═══════════════════════════════════════════════════════════════════════════════

/// Plays a stereo clip once or in a loop
pub struct SampleClipHandle {
    frames: Arc<[StereoFrame]>,
    position: usize,
    looped: bool,
    gain: f64,
    port: Option<AudioPortId>,
    track: Option<TrackId>,
}

impl SampleClipHandle {
    pub fn new(frames: impl Into<Arc<[StereoFrame]>>) -> Self {
        Self {
            frames: frames.into(),
            position: 0,
            looped: false,
            gain: 1.0,
            port: None,
            track: None,
        }
    }

    pub fn looped(mut self, looped: bool) -> Self {
        self.looped = looped;
        self
    }

    pub fn with_gain(mut self, gain: f64) -> Self {
        self.gain = gain;
        self
    }

    pub fn on_port(mut self, port: AudioPortId) -> Self {
        self.port = Some(port);
        self
    }

    pub fn on_track(mut self, track: TrackId) -> Self {
        self.track = Some(track);
        self
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

impl PlayHandle for SampleClipHandle {
    fn render(&mut self, buffer: &mut [StereoFrame], ctx: &PeriodContext) -> RenderOutcome {
        let len = self.frames.len();
        if len == 0 {
            return RenderOutcome::finished(0);
        }

        let mut written = 0;
        while written < ctx.frames {
            if self.position >= len {
                if !self.looped {
                    break;
                }
                self.position = 0;
            }
            let count = (len - self.position).min(ctx.frames - written);
            let source = &self.frames[self.position..self.position + count];
            for (dst, src) in buffer[written..written + count].iter_mut().zip(source) {
                *dst = StereoFrame::new(src.left * self.gain, src.right * self.gain);
            }
            self.position += count;
            written += count;
        }

        if !self.looped && self.position >= len {
            RenderOutcome::finished(written)
        } else {
            RenderOutcome::playing(written)
        }
    }

    fn track(&self) -> Option<TrackId> {
        self.track
    }

    fn audio_port(&self) -> Option<AudioPortId> {
        self.port
    }

    fn name(&self) -> &str {
        "sample clip"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn ctx(frames: usize) -> PeriodContext {
        PeriodContext {
            frames,
            sample_rate: 48000,
            ..Default::default()
        }
    }

    #[test]
    fn test_tone_is_bounded_and_ends() {
        let mut tone = ToneHandle::new(1000.0).with_amplitude(0.8).with_length(100);
        let mut buffer = vec![StereoFrame::SILENCE; 64];

        let first = tone.render(&mut buffer, &ctx(64));
        assert_eq!(first, RenderOutcome::playing(64));
        assert!(buffer.iter().all(|f| f.left.abs() <= 0.8 && f.left == f.right));

        buffer.fill(StereoFrame::SILENCE);
        let second = tone.render(&mut buffer, &ctx(64));
        assert_eq!(second, RenderOutcome::finished(36));
    }

    #[test]
    fn test_tone_start_offset_applies_once() {
        let mut tone = ToneHandle::at_pitch(Key::A, Octave::Octave4).starting_at(10);
        assert_abs_diff_eq!(tone.frequency(), 440.0);
        let mut buffer = vec![StereoFrame::SILENCE; 32];
        assert_eq!(tone.render(&mut buffer, &ctx(32)), RenderOutcome::playing(22).at_offset(10));
        assert_eq!(tone.render(&mut buffer, &ctx(32)), RenderOutcome::playing(32));
    }

    #[test]
    fn test_clip_plays_once() {
        let clip: Vec<StereoFrame> = (0..10).map(|i| StereoFrame::mono(i as f64 / 10.0)).collect();
        let mut handle = SampleClipHandle::new(clip).with_gain(0.5);
        let mut buffer = vec![StereoFrame::SILENCE; 6];

        assert_eq!(handle.render(&mut buffer, &ctx(6)), RenderOutcome::playing(6));
        assert_abs_diff_eq!(buffer[5].left, 0.25);
        assert_eq!(handle.render(&mut buffer, &ctx(6)), RenderOutcome::finished(4));
        assert_abs_diff_eq!(buffer[0].left, 0.3);
    }

    #[test]
    fn test_looped_clip_wraps() {
        let clip = vec![StereoFrame::mono(1.0), StereoFrame::mono(-1.0)];
        let mut handle = SampleClipHandle::new(clip).looped(true);
        let mut buffer = vec![StereoFrame::SILENCE; 5];
        assert_eq!(handle.render(&mut buffer, &ctx(5)), RenderOutcome::playing(5));
        assert_eq!(buffer[4], StereoFrame::mono(1.0));
        assert_eq!(handle.position(), 1);
    }

    #[test]
    fn test_empty_clip_finishes_immediately() {
        let mut handle = SampleClipHandle::new(Vec::<StereoFrame>::new());
        let mut buffer = vec![StereoFrame::SILENCE; 4];
        assert_eq!(handle.render(&mut buffer, &ctx(4)), RenderOutcome::finished(0));
    }
}
