//! Sample format conversion at the device boundary

use sonant_core::{IntSample, OUTPUT_SAMPLE_MULTIPLIER, Sample, clip};

/// Float sample to 16-bit PCM; out-of-range input saturates
#[inline]
pub fn sample_to_int(sample: Sample) -> IntSample {
    (clip(sample) * OUTPUT_SAMPLE_MULTIPLIER).round() as IntSample
}

#[inline]
pub fn int_to_sample(sample: IntSample) -> Sample {
    (sample as Sample / OUTPUT_SAMPLE_MULTIPLIER).max(-1.0)
}

/// Convert interleaved float samples into 16-bit PCM
pub fn convert_to_int(input: &[Sample], output: &mut [IntSample]) -> usize {
    let len = input.len().min(output.len());
    for (dst, &src) in output[..len].iter_mut().zip(input) {
        *dst = sample_to_int(src);
    }
    len
}

/// Copy `frames` interleaved frames from `source_channels` into a device
/// layout with `target_channels`
///
/// Mono targets receive the average of the first two source channels; extra
/// target channels repeat the source channel pattern.
pub fn remap_channels(
    input: &[f32],
    source_channels: usize,
    output: &mut [f32],
    target_channels: usize,
) -> usize {
    let source_channels = source_channels.max(1);
    let target_channels = target_channels.max(1);
    let frames = (input.len() / source_channels).min(output.len() / target_channels);

    for (src, dst) in input
        .chunks_exact(source_channels)
        .zip(output.chunks_exact_mut(target_channels))
        .take(frames)
    {
        if target_channels == 1 && source_channels >= 2 {
            dst[0] = (src[0] + src[1]) * 0.5;
        } else {
            for (channel, sample) in dst.iter_mut().enumerate() {
                *sample = src[channel % source_channels];
            }
        }
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_conversion_scale() {
        assert_eq!(sample_to_int(1.0), 32767);
        assert_eq!(sample_to_int(-1.0), -32767);
        assert_eq!(sample_to_int(0.0), 0);
        assert_eq!(sample_to_int(2.0), 32767);
        assert!((int_to_sample(16384) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_convert_to_int_truncates_to_shorter() {
        let mut out = [0i16; 2];
        assert_eq!(convert_to_int(&[0.5, -0.5, 0.25], &mut out), 2);
        assert_eq!(out, [16384, -16384]);
    }

    #[test]
    fn test_remap_stereo_to_mono() {
        let mut out = [0.0f32; 2];
        let frames = remap_channels(&[0.2, 0.4, -1.0, 1.0], 2, &mut out, 1);
        assert_eq!(frames, 2);
        assert!((out[0] - 0.3).abs() < 1e-6);
        assert_eq!(out[1], 0.0);
    }

    #[test]
    fn test_remap_stereo_to_quad() {
        let mut out = [0.0f32; 4];
        remap_channels(&[0.1, 0.2], 2, &mut out, 4);
        assert_eq!(out, [0.1, 0.2, 0.1, 0.2]);
    }
}
