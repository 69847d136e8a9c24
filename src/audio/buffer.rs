//! Lock-free staging ring for received audio blocks
//!
//! Single producer (transport thread) and single consumer (audio callback).
//! All blocks are allocated up front; afterwards blocks only move between a
//! free list and a filled queue, so neither side allocates.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::protocol::deinterleave_into;

/// One staged block: two channel planes plus the valid length
pub struct StagedBlock {
    left: Box<[f32]>,
    right: Box<[f32]>,
    len: usize,
}

impl StagedBlock {
    fn new(capacity: usize) -> Self {
        Self {
            left: vec![0.0; capacity].into_boxed_slice(),
            right: vec![0.0; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn left(&self) -> &[f32] {
        &self.left[..self.len]
    }

    pub fn right(&self) -> &[f32] {
        &self.right[..self.len]
    }
}

/// Whole-block SPSC ring with drop-oldest on overrun
pub struct StagingRing {
    filled: ArrayQueue<StagedBlock>,
    free: ArrayQueue<StagedBlock>,
    block_capacity: usize,
    staged: AtomicU64,
    overruns: AtomicU64,
    underruns: AtomicU64,
    truncated: AtomicU64,
}

impl StagingRing {
    /// Create a ring holding up to `depth` filled blocks of
    /// `block_capacity` samples per channel.
    ///
    /// Two extra blocks are allocated so the producer always finds a free
    /// block even while the consumer holds one.
    pub fn new(depth: usize, block_capacity: usize) -> Self {
        let depth = depth.max(1);
        let total = depth + 2;
        let free = ArrayQueue::new(total);
        for _ in 0..total {
            let _ = free.push(StagedBlock::new(block_capacity));
        }

        Self {
            filled: ArrayQueue::new(depth),
            free,
            block_capacity,
            staged: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            truncated: AtomicU64::new(0),
        }
    }

    /// Deinterleave a wire payload into the next free block and publish it.
    ///
    /// Called from the transport thread. Payloads longer than the block
    /// capacity are truncated. Returns the samples staged per channel, or
    /// `None` if no block could be claimed.
    pub fn stage_payload(&self, payload: &[u8]) -> Option<usize> {
        let samples_in_payload = payload.len() / crate::constants::BYTES_PER_STEREO_SAMPLE;
        if samples_in_payload > self.block_capacity {
            self.truncated.fetch_add(1, Ordering::Relaxed);
        }
        self.stage_with(|left, right| deinterleave_into(payload, left, right))
    }

    /// Fill the next free block through `fill`, which receives both planes
    /// at full capacity and returns how many samples it wrote.
    pub fn stage_with<F>(&self, fill: F) -> Option<usize>
    where
        F: FnOnce(&mut [f32], &mut [f32]) -> usize,
    {
        let mut block = self.free.pop()?;
        let written = fill(&mut block.left, &mut block.right).min(self.block_capacity);
        block.len = written;

        if let Some(evicted) = self.filled.force_push(block) {
            self.overruns.fetch_add(1, Ordering::Relaxed);
            let _ = self.free.push(evicted);
        }
        self.staged.fetch_add(1, Ordering::Relaxed);
        Some(written)
    }

    /// Copy the oldest filled block into the output planes.
    ///
    /// Called from the audio thread. Copies `min(block_len, out_len)`
    /// samples per channel and zero-fills the rest; outputs silence and
    /// counts an underrun when nothing is staged. Returns whether a block
    /// was consumed.
    pub fn read_into(&self, left: &mut [f32], right: &mut [f32]) -> bool {
        let Some(block) = self.filled.pop() else {
            left.fill(0.0);
            right.fill(0.0);
            self.underruns.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        copy_padded(block.left(), left);
        copy_padded(block.right(), right);

        let _ = self.free.push(block);
        true
    }

    /// Drop every staged block. Safe from either side.
    pub fn clear(&self) {
        while let Some(block) = self.filled.pop() {
            let _ = self.free.push(block);
        }
    }

    /// Filled blocks waiting for the audio thread
    pub fn len(&self) -> usize {
        self.filled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filled.is_empty()
    }

    /// Maximum filled blocks before the oldest is dropped
    pub fn depth(&self) -> usize {
        self.filled.capacity()
    }

    /// Samples per channel each block can hold
    pub fn block_capacity(&self) -> usize {
        self.block_capacity
    }

    pub fn stats(&self) -> StagingStats {
        StagingStats {
            staged: self.staged.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            truncated: self.truncated.load(Ordering::Relaxed),
            level: self.len(),
        }
    }
}

#[inline]
fn copy_padded(src: &[f32], dst: &mut [f32]) {
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
    dst[n..].fill(0.0);
}

/// Staging ring statistics
#[derive(Debug, Clone, Default)]
pub struct StagingStats {
    pub staged: u64,
    pub overruns: u64,
    pub underruns: u64,
    pub truncated: u64,
    pub level: usize,
}

/// Thread-safe handle to a staging ring
pub type SharedStagingRing = Arc<StagingRing>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::AudioFrame;

    fn payload(left: &[f32], right: &[f32]) -> Vec<u8> {
        AudioFrame::from_planes(left, right).to_payload()
    }

    #[test]
    fn test_staging_ring_fifo() {
        let ring = StagingRing::new(4, 8);

        assert_eq!(ring.stage_payload(&payload(&[1.0, 1.0], &[-1.0, -1.0])), Some(2));
        assert_eq!(ring.stage_payload(&payload(&[2.0, 2.0], &[-2.0, -2.0])), Some(2));
        assert_eq!(ring.len(), 2);

        let mut left = [9.0f32; 2];
        let mut right = [9.0f32; 2];
        assert!(ring.read_into(&mut left, &mut right));
        assert_eq!(left, [1.0, 1.0]);
        assert_eq!(right, [-1.0, -1.0]);

        assert!(ring.read_into(&mut left, &mut right));
        assert_eq!(left, [2.0, 2.0]);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_underrun_outputs_silence() {
        let ring = StagingRing::new(2, 4);
        let mut left = [0.7f32; 4];
        let mut right = [0.7f32; 4];

        assert!(!ring.read_into(&mut left, &mut right));
        assert_eq!(left, [0.0; 4]);
        assert_eq!(right, [0.0; 4]);
        assert_eq!(ring.stats().underruns, 1);
    }

    #[test]
    fn test_overrun_drops_oldest() {
        let ring = StagingRing::new(2, 1);
        for value in [1.0f32, 2.0, 3.0] {
            ring.stage_payload(&payload(&[value], &[value])).unwrap();
        }
        assert_eq!(ring.stats().overruns, 1);
        assert_eq!(ring.len(), 2);

        let mut left = [0.0f32];
        let mut right = [0.0f32];
        ring.read_into(&mut left, &mut right);
        assert_eq!(left, [2.0]);
        ring.read_into(&mut left, &mut right);
        assert_eq!(left, [3.0]);
    }

    #[test]
    fn test_short_block_is_zero_padded() {
        let ring = StagingRing::new(2, 8);
        ring.stage_payload(&payload(&[0.5], &[-0.5])).unwrap();

        let mut left = [1.0f32; 3];
        let mut right = [1.0f32; 3];
        ring.read_into(&mut left, &mut right);
        assert_eq!(left, [0.5, 0.0, 0.0]);
        assert_eq!(right, [-0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_oversized_payload_is_truncated() {
        let ring = StagingRing::new(2, 2);
        let staged = ring.stage_payload(&payload(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]));
        assert_eq!(staged, Some(2));
        assert_eq!(ring.stats().truncated, 1);
    }

    #[test]
    fn test_clear_recycles_blocks() {
        let ring = StagingRing::new(2, 1);
        for _ in 0..10 {
            ring.stage_payload(&payload(&[1.0], &[1.0])).unwrap();
            ring.clear();
        }
        assert!(ring.is_empty());
        assert!(ring.stage_payload(&payload(&[1.0], &[1.0])).is_some());
    }

    #[test]
    fn test_concurrent_producer_consumer() {
        let ring = Arc::new(StagingRing::new(4, 16));
        let producer = {
            let ring = ring.clone();
            std::thread::spawn(move || {
                for i in 0..2000 {
                    let v = i as f32;
                    ring.stage_with(|l, r| {
                        l[..16].fill(v);
                        r[..16].fill(-v);
                        16
                    })
                    .expect("producer always finds a free block");
                }
            })
        };

        let mut left = [0.0f32; 16];
        let mut right = [0.0f32; 16];
        let mut last = -1.0f32;
        while !producer.is_finished() || !ring.is_empty() {
            if ring.read_into(&mut left, &mut right) {
                // Blocks never tear and arrive in order
                assert!(left.iter().all(|&s| s == left[0]));
                assert!(right.iter().all(|&s| s == -left[0]));
                assert!(left[0] > last);
                last = left[0];
            }
        }
        producer.join().unwrap();
    }
}
