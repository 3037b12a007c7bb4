//! Sample types and audio buffer definitions

use std::mem::size_of;

/// Type alias for audio samples (always f64 for maximum precision)
pub type Sample = f64;

/// Integer PCM sample delivered to devices that need it
pub type IntSample = i16;

/// Scale applied when converting a nominal [-1, 1] sample to `IntSample`
pub const OUTPUT_SAMPLE_MULTIPLIER: f64 = 32767.0;

/// Channel count of the default (stereo monitoring) surround build
pub const DEFAULT_SURROUND_CHANNELS: usize = 2;

pub const BYTES_PER_SAMPLE: usize = size_of::<Sample>();
pub const BYTES_PER_INT_SAMPLE: usize = size_of::<IntSample>();
pub const BYTES_PER_FRAME: usize = size_of::<StereoFrame>();
pub const BYTES_PER_SURROUND_FRAME: usize = BYTES_PER_SAMPLE * DEFAULT_SURROUND_CHANNELS;

/// One stereo sample frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct StereoFrame {
    pub left: Sample,
    pub right: Sample,
}

impl StereoFrame {
    pub const SILENCE: Self = Self {
        left: 0.0,
        right: 0.0,
    };

    #[inline]
    pub const fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub const fn mono(value: Sample) -> Self {
        Self {
            left: value,
            right: value,
        }
    }

    #[inline]
    pub fn scaled(self, volume: StereoVolumeVector) -> Self {
        Self {
            left: self.left * volume.left,
            right: self.right * volume.right,
        }
    }

    #[inline]
    pub fn channel(self, channel: usize) -> Sample {
        if channel % 2 == 0 { self.left } else { self.right }
    }
}

impl std::ops::AddAssign for StereoFrame {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.left += rhs.left;
        self.right += rhs.right;
    }
}

/// Independent left/right gain
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StereoVolumeVector {
    pub left: f64,
    pub right: f64,
}

impl StereoVolumeVector {
    pub const UNITY: Self = Self {
        left: 1.0,
        right: 1.0,
    };

    #[inline]
    pub const fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    #[inline]
    pub const fn uniform(gain: f64) -> Self {
        Self {
            left: gain,
            right: gain,
        }
    }
}

impl Default for StereoVolumeVector {
    fn default() -> Self {
        Self::UNITY
    }
}

/// Hard-clip a sample to [-1.0, 1.0]; values inside the range pass unchanged
///
/// NaN becomes silence. Infinities clip to the matching bound.
#[inline]
pub fn clip(sample: Sample) -> Sample {
    if sample.is_nan() {
        0.0
    } else if sample > 1.0 {
        1.0
    } else if sample < -1.0 {
        -1.0
    } else {
        sample
    }
}

/// Zero `frames` frames of `buffer` starting at `offset`, clamped to the buffer length
pub fn clear_audio_buffer(buffer: &mut [StereoFrame], frames: usize, offset: usize) {
    let start = offset.min(buffer.len());
    let end = offset.saturating_add(frames).min(buffer.len());
    buffer[start..end].fill(StereoFrame::SILENCE);
}

// NaN reads as unbounded so a broken buffer never meters as quiet
#[inline]
fn magnitude(sample: Sample) -> Sample {
    if sample.is_nan() { Sample::INFINITY } else { sample.abs() }
}

/// Largest absolute left-channel value
pub fn peak_value_left(buffer: &[StereoFrame]) -> Sample {
    buffer.iter().fold(0.0, |peak, frame| peak.max(magnitude(frame.left)))
}

/// Largest absolute right-channel value
pub fn peak_value_right(buffer: &[StereoFrame]) -> Sample {
    buffer.iter().fold(0.0, |peak, frame| peak.max(magnitude(frame.right)))
}

/// Interleaved multichannel period buffer ("surround frames")
///
/// Channel `c` of a surround frame carries the stereo side `c % 2`, so a
/// 2-channel buffer is plain interleaved stereo.
#[derive(Debug, Clone, PartialEq)]
pub struct SurroundBuffer {
    data: Vec<Sample>,
    channels: usize,
    frames: usize,
}

impl SurroundBuffer {
    pub fn new(frames: usize, channels: usize) -> Self {
        let channels = channels.max(1);
        Self {
            data: vec![0.0; frames * channels],
            channels,
            frames,
        }
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Interleaved samples, `frames * channels` long
    #[inline]
    pub fn samples(&self) -> &[Sample] {
        &self.data
    }

    #[inline]
    pub fn samples_mut(&mut self) -> &mut [Sample] {
        &mut self.data
    }

    /// One surround frame
    #[inline]
    pub fn frame(&self, index: usize) -> &[Sample] {
        let start = index * self.channels;
        &self.data[start..start + self.channels]
    }

    /// Iterate over the surround frames
    pub fn iter_frames(&self) -> std::slice::ChunksExact<'_, Sample> {
        self.data.chunks_exact(self.channels)
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// Spread a stereo mix over all surround channels
    pub fn fill_from_stereo(&mut self, stereo: &[StereoFrame]) {
        let channels = self.channels;
        for (frame, source) in self.data.chunks_exact_mut(channels).zip(stereo) {
            for (channel, sample) in frame.iter_mut().enumerate() {
                *sample = source.channel(channel);
            }
        }
    }

    /// Copy of another buffer with the same geometry
    pub fn copy_from(&mut self, other: &SurroundBuffer) {
        if self.channels == other.channels && self.frames == other.frames {
            self.data.copy_from_slice(&other.data);
        } else {
            *self = other.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_bounds() {
        for &value in &[-10.0, -1.0001, -1.0, -0.5, 0.0, 0.5, 1.0, 1.0001, 10.0, 1.2] {
            let clipped = clip(value);
            assert!((-1.0..=1.0).contains(&clipped));
        }
        assert_eq!(clip(1.0), 1.0);
        assert_eq!(clip(-1.0), -1.0);
        assert_eq!(clip(0.3), 0.3);
        assert_eq!(clip(1.2), 1.0);
        assert_eq!(clip(f64::NEG_INFINITY), -1.0);
    }

    #[test]
    fn test_clip_non_finite() {
        assert_eq!(clip(f64::NAN), 0.0);
        assert_eq!(clip(-f64::NAN), 0.0);
        assert_eq!(clip(f64::INFINITY), 1.0);
        assert_eq!(clip(f64::NEG_INFINITY), -1.0);
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, f64::MAX, f64::MIN] {
            assert!((-1.0..=1.0).contains(&clip(value)));
        }
    }

    #[test]
    fn test_clear_audio_buffer_with_offset() {
        let mut buffer = vec![StereoFrame::mono(1.0); 8];
        clear_audio_buffer(&mut buffer, 3, 2);
        assert_eq!(buffer[1], StereoFrame::mono(1.0));
        assert_eq!(buffer[2], StereoFrame::SILENCE);
        assert_eq!(buffer[4], StereoFrame::SILENCE);
        assert_eq!(buffer[5], StereoFrame::mono(1.0));

        // Out-of-range requests are clamped
        clear_audio_buffer(&mut buffer, 100, 6);
        assert_eq!(buffer[7], StereoFrame::SILENCE);
    }

    #[test]
    fn test_peak_values() {
        let buffer = vec![
            StereoFrame::new(0.2, -0.9),
            StereoFrame::new(-0.7, 0.1),
            StereoFrame::new(0.5, 0.3),
        ];
        assert_eq!(peak_value_left(&buffer), 0.7);
        assert_eq!(peak_value_right(&buffer), 0.9);
        assert_eq!(peak_value_left(&[]), 0.0);
    }

    #[test]
    fn test_peak_values_do_not_hide_nan() {
        let buffer = vec![StereoFrame::mono(f64::NAN), StereoFrame::mono(0.5)];
        assert_eq!(peak_value_left(&buffer), f64::INFINITY);
        assert_eq!(peak_value_right(&buffer), f64::INFINITY);

        let clipped: Vec<_> = buffer
            .iter()
            .map(|f| StereoFrame::new(clip(f.left), clip(f.right)))
            .collect();
        assert_eq!(peak_value_left(&clipped), 0.5);
    }

    #[test]
    fn test_surround_fill_from_stereo() {
        let mut buffer = SurroundBuffer::new(2, 4);
        buffer.fill_from_stereo(&[StereoFrame::new(0.1, 0.2), StereoFrame::new(0.3, 0.4)]);
        assert_eq!(buffer.frame(0), &[0.1, 0.2, 0.1, 0.2]);
        assert_eq!(buffer.frame(1), &[0.3, 0.4, 0.3, 0.4]);
        assert_eq!(buffer.iter_frames().count(), 2);
    }

    #[test]
    fn test_byte_constants() {
        assert_eq!(BYTES_PER_SAMPLE, 8);
        assert_eq!(BYTES_PER_INT_SAMPLE, 2);
        assert_eq!(BYTES_PER_FRAME, 16);
        assert_eq!(BYTES_PER_SURROUND_FRAME, 16);
    }

    #[test]
    fn test_frame_scaling() {
        let frame = StereoFrame::new(0.5, 0.5).scaled(StereoVolumeVector::new(1.0, 0.5));
        assert_eq!(frame, StereoFrame::new(0.5, 0.25));
    }
}
