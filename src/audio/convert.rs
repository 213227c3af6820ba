//! Sample format conversion and surround-to-stereo downmix
//!
//! All functions here are pure: they never allocate and never touch shared
//! state, so the capture thread can call them on every packet.

use crate::audio::SampleEncoding;

/// Weight of the front-center channel in each side of the stereo downmix
pub const CENTER_WEIGHT: f32 = 0.707;

/// Headroom applied to the summed surround channels before the user gain
pub const DOWNMIX_HEADROOM: f32 = 0.4;

const I16_SCALE: f32 = 32768.0;
const I24_SCALE: f32 = 8_388_608.0;
const I32_SCALE: f32 = 2_147_483_648.0;

/// Decode little-endian samples into normalized floats
///
/// Fills `dst` completely; if `src` holds fewer samples than `dst` needs, the
/// tail is zeroed.
pub fn normalize_into(src: &[u8], encoding: SampleEncoding, dst: &mut [f32]) {
    let width = encoding.bytes_per_sample();
    let mut written = 0;

    for (out, chunk) in dst.iter_mut().zip(src.chunks_exact(width)) {
        *out = match encoding {
            SampleEncoding::I16 => i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / I16_SCALE,
            SampleEncoding::I24 => {
                // Sign-extend by placing the 3 bytes in the top of an i32
                let value = i32::from_le_bytes([0, chunk[0], chunk[1], chunk[2]]) >> 8;
                value as f32 / I24_SCALE
            }
            SampleEncoding::I32 => {
                i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f32 / I32_SCALE
            }
            SampleEncoding::F32 => f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
        };
        written += 1;
    }

    dst[written..].fill(0.0);
}

/// Map interleaved `input` frames onto `output` frames of another channel count
///
/// With at most two input channels the channels are copied through and extra
/// output channels are zero. With more input channels, output channels 0 and 1
/// receive the weighted left/right sums (index convention FL, FR, FC, LFE, BL,
/// BR, SL, SR) scaled by `DOWNMIX_HEADROOM * gain`; LFE is dropped and any
/// further output channels are zero. Every output sample is clamped to
/// [-1.0, 1.0].
pub fn downmix(input: &[f32], in_channels: usize, output: &mut [f32], out_channels: usize, gain: f32) {
    if in_channels == 0 || out_channels == 0 {
        output.fill(0.0);
        return;
    }

    let scale = DOWNMIX_HEADROOM * gain;
    let frames = output.chunks_exact_mut(out_channels);

    for (out_frame, in_frame) in frames.zip(input.chunks_exact(in_channels)) {
        for (c, out) in out_frame.iter_mut().enumerate() {
            let sample = if in_channels <= 2 {
                in_frame.get(c).copied().unwrap_or(0.0)
            } else if c < 2 {
                side_sum(in_frame, c) * scale
            } else {
                0.0
            };
            *out = sample.clamp(-1.0, 1.0);
        }
    }

    let filled = (input.len() / in_channels).min(output.len() / out_channels) * out_channels;
    output[filled..].fill(0.0);
}

/// Sum of the channels feeding one side (0 = left, 1 = right) of the downmix
fn side_sum(frame: &[f32], side: usize) -> f32 {
    let channels = frame.len();
    let mut sum = frame[side];
    if channels >= 6 {
        sum += frame[2] * CENTER_WEIGHT + frame[4 + side];
    }
    if channels >= 8 {
        sum += frame[6 + side];
    }
    sum
}

/// Encode normalized floats into a device buffer
///
/// Only 32-bit float and 16-bit integer targets are produced; any other target
/// gets silence rather than a guessed conversion.
pub fn encode_into(samples: &[f32], target: Option<SampleEncoding>, dst: &mut [u8]) {
    match target {
        Some(SampleEncoding::F32) => {
            let mut written = 0;
            for (chunk, &sample) in dst.chunks_exact_mut(4).zip(samples) {
                chunk.copy_from_slice(&sample.clamp(-1.0, 1.0).to_le_bytes());
                written += 4;
            }
            dst[written..].fill(0);
        }
        Some(SampleEncoding::I16) => {
            let mut written = 0;
            for (chunk, &sample) in dst.chunks_exact_mut(2).zip(samples) {
                chunk.copy_from_slice(&f32_to_i16(sample).to_le_bytes());
                written += 2;
            }
            dst[written..].fill(0);
        }
        _ => dst.fill(0),
    }
}

/// Convert a normalized float to 16-bit PCM with rounding
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

/// Root mean square of a block of samples (0.0 for an empty block)
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_normalize_i16() {
        let src: Vec<u8> = [16384i16, -32768, 0]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let mut dst = [1.0f32; 3];
        normalize_into(&src, SampleEncoding::I16, &mut dst);
        assert!(approx(dst[0], 0.5));
        assert!(approx(dst[1], -1.0));
        assert_eq!(dst[2], 0.0);
    }

    #[test]
    fn test_normalize_i32_and_f32() {
        let src = (1i32 << 30).to_le_bytes();
        let mut dst = [0.0f32; 1];
        normalize_into(&src, SampleEncoding::I32, &mut dst);
        assert!(approx(dst[0], 0.5));

        let src = 0.5f32.to_le_bytes();
        normalize_into(&src, SampleEncoding::F32, &mut dst);
        assert_eq!(dst[0], 0.5);
    }

    #[test]
    fn test_normalize_i24_sign_extension() {
        // 0x400000 = 2^22 -> 0.5, 0xC00000 = -2^22 -> -0.5
        let src = [0x00, 0x00, 0x40, 0x00, 0x00, 0xC0];
        let mut dst = [0.0f32; 2];
        normalize_into(&src, SampleEncoding::I24, &mut dst);
        assert!(approx(dst[0], 0.5));
        assert!(approx(dst[1], -0.5));
    }

    #[test]
    fn test_normalize_short_source_zero_fills() {
        let src = 0.25f32.to_le_bytes();
        let mut dst = [9.0f32; 3];
        normalize_into(&src, SampleEncoding::F32, &mut dst);
        assert_eq!(dst, [0.25, 0.0, 0.0]);
    }

    #[test]
    fn test_downmix_7_1_weighted_sum() {
        let frame = [0.1f32, 0.2, 0.3, 0.9, 0.05, 0.06, 0.07, 0.08];
        let input: Vec<f32> = frame.iter().chain(frame.iter()).copied().collect();
        let mut output = [0.0f32; 4];

        downmix(&input, 8, &mut output, 2, 1.0);

        let left = (0.1 + 0.707 * 0.3 + 0.05 + 0.07) * 0.4;
        let right = (0.2 + 0.707 * 0.3 + 0.06 + 0.08) * 0.4;
        assert!(approx(output[0], left));
        assert!(approx(output[1], right));
        assert!(approx(output[2], left));
        assert!(approx(output[3], right));
    }

    #[test]
    fn test_downmix_5_1_ignores_side_channels() {
        let input = [0.1f32, 0.2, 0.3, 1.0, 0.05, 0.06];
        let mut output = [0.0f32; 2];

        downmix(&input, 6, &mut output, 2, 2.0);

        assert!(approx(output[0], (0.1 + 0.707 * 0.3 + 0.05) * 0.8));
        assert!(approx(output[1], (0.2 + 0.707 * 0.3 + 0.06) * 0.8));
    }

    #[test]
    fn test_downmix_clamps_for_large_gain() {
        let input = [0.9f32; 8];
        let mut output = [0.0f32; 2];

        for gain in [0.0f32, 1.0, 5.0, 100.0] {
            downmix(&input, 8, &mut output, 2, gain);
            let expected = ((0.9 + 0.707 * 0.9 + 0.9 + 0.9) * 0.4 * gain).clamp(-1.0, 1.0);
            assert!(approx(output[0], expected), "gain {}", gain);
            assert!(approx(output[1], expected), "gain {}", gain);
        }
    }

    #[test]
    fn test_stereo_passthrough_ignores_gain() {
        let input = [0.5f32, -0.25, 0.125, 0.0];
        let mut output = [0.0f32; 4];
        downmix(&input, 2, &mut output, 2, 8.0);
        assert_eq!(output, input);
    }

    #[test]
    fn test_mono_to_quad_zero_pads() {
        let input = [0.5f32, 0.25];
        let mut output = [9.0f32; 8];
        downmix(&input, 1, &mut output, 4, 1.0);
        assert_eq!(output, [0.5, 0.0, 0.0, 0.0, 0.25, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_surround_to_quad_leaves_rear_silent() {
        let input = [0.5f32, 0.5, 0.0, 0.0, 0.0, 0.0];
        let mut output = [9.0f32; 4];
        downmix(&input, 6, &mut output, 4, 1.0);
        assert!(approx(output[0], 0.2));
        assert!(approx(output[1], 0.2));
        assert_eq!(&output[2..], &[0.0, 0.0]);
    }

    #[test]
    fn test_encode_i16_rounds() {
        let mut dst = [0u8; 6];
        encode_into(&[0.5, -1.0, 2.0], Some(SampleEncoding::I16), &mut dst);
        assert_eq!(i16::from_le_bytes([dst[0], dst[1]]), 16384);
        assert_eq!(i16::from_le_bytes([dst[2], dst[3]]), -32767);
        assert_eq!(i16::from_le_bytes([dst[4], dst[5]]), 32767);
    }

    #[test]
    fn test_encode_f32() {
        let mut dst = [0u8; 8];
        encode_into(&[0.25, -0.5], Some(SampleEncoding::F32), &mut dst);
        assert_eq!(f32::from_le_bytes([dst[0], dst[1], dst[2], dst[3]]), 0.25);
        assert_eq!(f32::from_le_bytes([dst[4], dst[5], dst[6], dst[7]]), -0.5);
    }

    #[test]
    fn test_encode_unsupported_target_is_silence() {
        let mut dst = [0xAAu8; 8];
        encode_into(&[0.5, 0.5], Some(SampleEncoding::I32), &mut dst);
        assert_eq!(dst, [0u8; 8]);

        let mut dst = [0xAAu8; 4];
        encode_into(&[0.5], None, &mut dst);
        assert_eq!(dst, [0u8; 4]);
    }

    #[test]
    fn test_rms() {
        assert_eq!(rms(&[]), 0.0);
        assert!(approx(rms(&[0.5, -0.5, 0.5, -0.5]), 0.5));
    }
}
