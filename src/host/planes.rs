//! Interleaved device buffers to planar plugin blocks

use crate::audio::StereoBuffer;
use crate::plugin::AudioProcessor;

/// Preallocated stereo planes for one device stream.
///
/// Device buffers of any length are cut into blocks of at most
/// `max_block_size` so the processor never sees more than it prepared for.
pub struct PlaneScratch {
    left: Vec<f32>,
    right: Vec<f32>,
    channels: usize,
}

impl PlaneScratch {
    pub fn new(channels: u16, max_block_size: usize) -> Self {
        Self {
            left: vec![0.0; max_block_size],
            right: vec![0.0; max_block_size],
            channels: channels.max(1) as usize,
        }
    }

    pub fn max_block_size(&self) -> usize {
        self.left.len()
    }

    /// Feed captured device samples through `processor`
    pub fn run_input<P: AudioProcessor>(&mut self, data: &[f32], processor: &mut P) {
        let channels = self.channels;
        for chunk in data.chunks(self.left.len() * channels) {
            let frames = chunk.len() / channels;
            for (i, frame) in chunk.chunks_exact(channels).enumerate() {
                self.left[i] = frame[0];
                self.right[i] = if channels > 1 { frame[1] } else { frame[0] };
            }
            processor.process(&mut StereoBuffer::new(
                &mut self.left[..frames],
                &mut self.right[..frames],
            ));
        }
    }

    /// Fill a device output buffer from `processor`
    pub fn run_output<P: AudioProcessor>(&mut self, data: &mut [f32], processor: &mut P) {
        let channels = self.channels;
        let max_block = self.left.len();
        for chunk in data.chunks_mut(max_block * channels) {
            let frames = chunk.len() / channels;
            let (left, right) = (&mut self.left[..frames], &mut self.right[..frames]);
            left.fill(0.0);
            right.fill(0.0);
            processor.process(&mut StereoBuffer::new(left, right));

            for (i, frame) in chunk.chunks_exact_mut(channels).enumerate() {
                if channels == 1 {
                    frame[0] = 0.5 * (self.left[i] + self.right[i]);
                    continue;
                }
                frame[0] = self.left[i];
                frame[1] = self.right[i];
                frame[2..].fill(0.0);
            }
        }
    }
}
