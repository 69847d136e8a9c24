//! Interleaved stereo PCM payload
//!
//! A payload is `sample_count` pairs of little-endian f32, sample-major
//! (L0, R0, L1, R1, ...). There is no header: channel count and sample
//! format are implicit.

use crate::constants::{BYTES_PER_STEREO_SAMPLE, CHANNELS};
use crate::error::FrameError;

/// Payload size for a block of `samples` per channel
#[inline]
pub fn payload_len(samples: usize) -> usize {
    samples * BYTES_PER_STEREO_SAMPLE
}

/// Samples per channel carried by a payload of `len` bytes
#[inline]
pub fn stereo_samples_in(len: usize) -> Result<usize, FrameError> {
    if len % BYTES_PER_STEREO_SAMPLE != 0 {
        return Err(FrameError::SizeMismatch(len));
    }
    Ok(len / BYTES_PER_STEREO_SAMPLE)
}

/// Interleave two channel planes into `out`.
///
/// Writes `min(left.len(), right.len(), out.len() / 8)` sample pairs and
/// returns that count. Never allocates.
#[inline]
pub fn interleave_into(left: &[f32], right: &[f32], out: &mut [u8]) -> usize {
    let mut written = 0;
    for ((pair, l), r) in out
        .chunks_exact_mut(BYTES_PER_STEREO_SAMPLE)
        .zip(left)
        .zip(right)
    {
        pair[..4].copy_from_slice(&l.to_le_bytes());
        pair[4..].copy_from_slice(&r.to_le_bytes());
        written += 1;
    }
    written
}

/// Split an interleaved payload into two channel planes.
///
/// Trailing bytes that do not form a whole pair are ignored; callers check
/// [`stereo_samples_in`] first. Writes at most the plane capacity and
/// returns the number of samples written per channel.
#[inline]
pub fn deinterleave_into(payload: &[u8], left: &mut [f32], right: &mut [f32]) -> usize {
    let mut written = 0;
    for ((pair, l), r) in payload
        .chunks_exact(BYTES_PER_STEREO_SAMPLE)
        .zip(left.iter_mut())
        .zip(right.iter_mut())
    {
        *l = f32::from_le_bytes([pair[0], pair[1], pair[2], pair[3]]);
        *r = f32::from_le_bytes([pair[4], pair[5], pair[6], pair[7]]);
        written += 1;
    }
    written
}

/// One serialised audio block, owned
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Always 2
    pub channel_count: u16,
    /// Samples per channel
    pub sample_count: u32,
    /// Interleaved samples, `sample_count * channel_count` long
    pub samples: Vec<f32>,
}

impl AudioFrame {
    /// Build a frame from two equally long channel planes
    pub fn from_planes(left: &[f32], right: &[f32]) -> Self {
        let n = left.len().min(right.len());
        let mut samples = Vec::with_capacity(n * CHANNELS as usize);
        for (l, r) in left[..n].iter().zip(&right[..n]) {
            samples.push(*l);
            samples.push(*r);
        }
        Self {
            channel_count: CHANNELS,
            sample_count: n as u32,
            samples,
        }
    }

    /// Decode a wire payload
    pub fn from_payload(payload: &[u8]) -> Result<Self, FrameError> {
        let n = stereo_samples_in(payload.len())?;
        let samples = payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok(Self {
            channel_count: CHANNELS,
            sample_count: n as u32,
            samples,
        })
    }

    /// Encode as a wire payload
    pub fn to_payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.samples.len() * 4);
        for s in &self.samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    pub fn left(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().step_by(2).copied()
    }

    pub fn right(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().skip(1).step_by(2).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_interleave_is_sample_major() {
        let left = [0.5f32, 0.25];
        let right = [-0.5f32, -0.25];
        let mut out = [0u8; 16];

        assert_eq!(interleave_into(&left, &right, &mut out), 2);

        let frame = AudioFrame::from_payload(&out).unwrap();
        assert_eq!(frame.samples, vec![0.5, -0.5, 0.25, -0.25]);
        assert_eq!(frame.sample_count, 2);
        assert_eq!(frame.channel_count, 2);
    }

    #[test]
    fn test_interleave_stops_at_output_capacity() {
        let left = [1.0f32; 4];
        let right = [2.0f32; 4];
        let mut out = [0u8; 24];
        assert_eq!(interleave_into(&left, &right, &mut out), 3);
    }

    #[test]
    fn test_deinterleave_truncates_to_plane_capacity() {
        let frame = AudioFrame::from_planes(&[1.0, 2.0, 3.0], &[-1.0, -2.0, -3.0]);
        let payload = frame.to_payload();

        let mut left = [0.0f32; 2];
        let mut right = [0.0f32; 2];
        assert_eq!(deinterleave_into(&payload, &mut left, &mut right), 2);
        assert_eq!(left, [1.0, 2.0]);
        assert_eq!(right, [-1.0, -2.0]);
    }

    #[test]
    fn test_size_mismatch() {
        assert_eq!(stereo_samples_in(7), Err(FrameError::SizeMismatch(7)));
        assert_eq!(stereo_samples_in(0), Ok(0));
        assert_eq!(stereo_samples_in(64), Ok(8));
        assert!(AudioFrame::from_payload(&[0u8; 12]).is_err());
    }

    #[test]
    fn test_channel_accessors() {
        let frame = AudioFrame::from_planes(&[0.1, 0.2], &[0.3, 0.4]);
        assert_eq!(frame.left().collect::<Vec<_>>(), vec![0.1, 0.2]);
        assert_eq!(frame.right().collect::<Vec<_>>(), vec![0.3, 0.4]);
    }

    proptest! {
        #[test]
        fn prop_deinterleave_inverts_interleave(
            pairs in proptest::collection::vec((any::<u32>(), any::<u32>()), 0..512)
        ) {
            // Raw bit patterns so NaN payloads and denormals are covered too
            let left: Vec<f32> = pairs.iter().map(|p| f32::from_bits(p.0)).collect();
            let right: Vec<f32> = pairs.iter().map(|p| f32::from_bits(p.1)).collect();

            let mut wire = vec![0u8; payload_len(left.len())];
            prop_assert_eq!(interleave_into(&left, &right, &mut wire), left.len());

            let mut out_l = vec![0.0f32; left.len()];
            let mut out_r = vec![0.0f32; right.len()];
            prop_assert_eq!(deinterleave_into(&wire, &mut out_l, &mut out_r), left.len());

            for i in 0..left.len() {
                prop_assert_eq!(out_l[i].to_bits(), left[i].to_bits());
                prop_assert_eq!(out_r[i].to_bits(), right[i].to_bits());
            }
        }
    }
}
