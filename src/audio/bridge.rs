//! Real-time half of the bridge
//!
//! [`AudioBridge`] runs on the audio callback. Once `prepare` has returned it
//! never allocates, blocks or logs: the sender path writes straight into a
//! preallocated outbox slot and the receiver path drains the staging ring.
//! [`StagingSink`] is its transport-thread counterpart, filling that ring
//! from inbound frames.

use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use super::block::StereoBuffer;
use super::buffer::{SharedStagingRing, StagingRing, StagingStats};
use super::denormal::ScopedNoDenormals;
use crate::config::BridgeConfig;
use crate::network::{EndpointEvents, Link, Role};
use crate::protocol::{interleave_into, payload_len, stereo_samples_in};

/// Counters updated from both the audio and transport threads
#[derive(Debug, Default)]
pub struct BridgeCounters {
    pub blocks_sent: AtomicU64,
    pub blocks_dropped: AtomicU64,
    pub blocks_played: AtomicU64,
    pub size_mismatches: AtomicU64,
    pub unstaged_frames: AtomicU64,
}

/// Receives inbound frames on the transport thread and stages them
pub struct StagingSink {
    link: Arc<Link>,
    ring: ArcSwapOption<StagingRing>,
    counters: Arc<BridgeCounters>,
}

impl StagingSink {
    fn new(link: Arc<Link>, counters: Arc<BridgeCounters>) -> Self {
        Self {
            link,
            ring: ArcSwapOption::empty(),
            counters,
        }
    }

    /// Statistics of the ring currently published, if prepared
    pub fn staging_stats(&self) -> Option<StagingStats> {
        self.ring.load_full().map(|ring| ring.stats())
    }
}

impl EndpointEvents for StagingSink {
    fn on_connected(&self, conn: Uuid) {
        if let Some(ring) = self.ring.load_full() {
            ring.clear();
        }
        tracing::debug!(%conn, "Staging ready for new connection");
    }

    fn on_message(&self, payload: &[u8]) {
        // Only the receiver plays what arrives
        if self.link.role() != Some(Role::Receiver) {
            return;
        }

        if let Err(e) = stereo_samples_in(payload.len()) {
            self.counters.size_mismatches.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Dropping frame: {}", e);
            return;
        }

        let guard = self.ring.load();
        let staged = match &*guard {
            Some(ring) => ring.stage_payload(payload),
            None => None,
        };
        if staged.is_none() {
            self.counters.unstaged_frames.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("No staging block available, frame dropped");
        }
    }

    fn on_disconnected(&self, conn: Uuid) {
        tracing::debug!(%conn, "Staging detached");
    }
}

/// Per-instance audio processing state
pub struct AudioBridge {
    link: Arc<Link>,
    sink: Arc<StagingSink>,
    counters: Arc<BridgeCounters>,
    staging: Option<SharedStagingRing>,
    staging_depth: usize,
    max_frame_samples: usize,
    max_block_size: usize,
}

impl AudioBridge {
    pub fn new(config: &BridgeConfig, link: Arc<Link>) -> Self {
        let counters = Arc::new(BridgeCounters::default());
        let sink = Arc::new(StagingSink::new(link.clone(), counters.clone()));
        Self {
            link,
            sink,
            counters,
            staging: None,
            staging_depth: config.staging_depth,
            max_frame_samples: config.max_frame_samples(),
            max_block_size: 0,
        }
    }

    /// Transport-side callbacks to hand to the endpoint
    pub fn sink(&self) -> Arc<StagingSink> {
        self.sink.clone()
    }

    pub fn counters(&self) -> &Arc<BridgeCounters> {
        &self.counters
    }

    /// Allocate staging for blocks of up to `max_block_size` samples.
    /// Nothing is allocated by `process` afterwards.
    pub fn prepare(&mut self, max_block_size: usize) {
        if max_block_size > self.max_frame_samples {
            tracing::warn!(
                "Host block size {} exceeds the {} samples a frame can carry; sent blocks will be truncated",
                max_block_size,
                self.max_frame_samples
            );
        }

        let ring = Arc::new(StagingRing::new(self.staging_depth, max_block_size));
        self.sink.ring.store(Some(ring.clone()));
        self.staging = Some(ring);
        self.max_block_size = max_block_size;
        tracing::debug!(
            "Prepared staging: {} blocks of {} samples",
            self.staging_depth,
            max_block_size
        );
    }

    /// Process one host block in place.
    ///
    /// Sender: the block is sent and left untouched. Receiver: the block is
    /// replaced with the next staged block, or silence. With no active role
    /// the block passes through.
    pub fn process(&mut self, buffer: &mut StereoBuffer<'_>) {
        self.process_with(buffer, None);
    }

    /// Like [`process`](Self::process), but while no role is active the
    /// block is treated as a disconnected `idle` role would treat it.
    pub fn process_as(&mut self, buffer: &mut StereoBuffer<'_>, idle: Role) {
        self.process_with(buffer, Some(idle));
    }

    fn process_with(&mut self, buffer: &mut StereoBuffer<'_>, idle: Option<Role>) {
        let _no_denormals = ScopedNoDenormals::new();

        match self.link.role().or(idle) {
            Some(Role::Sender) => {
                if self.link.is_connected() {
                    self.send_block(buffer);
                }
            }
            Some(Role::Receiver) => {
                if self.link.is_connected() {
                    self.play_staged(buffer);
                } else {
                    buffer.clear();
                }
            }
            None => {}
        }
    }

    /// Free the staging buffer
    pub fn release(&mut self) {
        self.sink.ring.store(None);
        self.staging = None;
        self.max_block_size = 0;
    }

    pub fn is_prepared(&self) -> bool {
        self.staging.is_some()
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    fn send_block(&self, buffer: &StereoBuffer<'_>) {
        if self.staging.is_none() {
            return;
        }
        let n = buffer
            .len()
            .min(self.max_block_size)
            .min(self.max_frame_samples);
        let (left, right) = (&buffer.left()[..n], &buffer.right()[..n]);

        let queued = self.link.send_with(payload_len(n), |out| {
            interleave_into(left, right, out);
        });
        let counter = if queued {
            &self.counters.blocks_sent
        } else {
            &self.counters.blocks_dropped
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn play_staged(&self, buffer: &mut StereoBuffer<'_>) {
        let Some(ring) = self.staging.as_ref() else {
            buffer.clear();
            return;
        };
        let (left, right) = buffer.planes_mut();
        if ring.read_into(left, right) {
            self.counters.blocks_played.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::EndpointState;
    use crate::protocol::AudioFrame;

    fn bridge(role: Role) -> (AudioBridge, Arc<Link>) {
        let config = BridgeConfig::default();
        let link = Arc::new(Link::new(&config));
        link.set_role(Some(role));
        let mut bridge = AudioBridge::new(&config, link.clone());
        bridge.prepare(64);
        (bridge, link)
    }

    #[test]
    fn test_sender_passes_input_through_when_disconnected() {
        let (mut bridge, link) = bridge(Role::Sender);
        let mut left = [0.5f32; 4];
        let mut right = [-0.5f32; 4];

        bridge.process(&mut StereoBuffer::new(&mut left, &mut right));
        assert_eq!(left, [0.5; 4]);
        assert_eq!(right, [-0.5; 4]);
        assert_eq!(link.outbox().pending(), 0);
    }

    #[test]
    fn test_sender_queues_interleaved_frame_and_keeps_input() {
        let (mut bridge, link) = bridge(Role::Sender);
        link.mark_connected();

        let mut left = [0.5f32, 0.25];
        let mut right = [-0.5f32, -0.25];
        bridge.process(&mut StereoBuffer::new(&mut left, &mut right));

        assert_eq!(left, [0.5, 0.25]);
        let frame = link.outbox().pop_outbound().unwrap();
        let decoded = AudioFrame::from_payload(&frame[8..]).unwrap();
        assert_eq!(decoded.samples, vec![0.5, -0.5, 0.25, -0.25]);
        assert_eq!(bridge.counters().blocks_sent.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_sender_truncates_oversized_block() {
        let (mut bridge, link) = bridge(Role::Sender);
        link.mark_connected();

        let mut left = vec![1.0f32; 100];
        let mut right = vec![1.0f32; 100];
        bridge.process(&mut StereoBuffer::new(&mut left, &mut right));

        let frame = link.outbox().pop_outbound().unwrap();
        assert_eq!(frame.len() - 8, payload_len(64));
    }

    #[test]
    fn test_receiver_silent_when_disconnected() {
        let (mut bridge, _link) = bridge(Role::Receiver);
        let mut left = [0.3f32; 8];
        let mut right = [0.3f32; 8];
        bridge.process(&mut StereoBuffer::new(&mut left, &mut right));
        assert_eq!(left, [0.0; 8]);
        assert_eq!(right, [0.0; 8]);
    }

    #[test]
    fn test_idle_receiver_mode_outputs_silence() {
        let config = BridgeConfig::default();
        let link = Arc::new(Link::new(&config));
        let mut bridge = AudioBridge::new(&config, link.clone());
        bridge.prepare(8);
        assert_eq!(link.role(), None);

        let mut left = [0.3f32; 4];
        let mut right = [0.3f32; 4];
        bridge.process_as(&mut StereoBuffer::new(&mut left, &mut right), Role::Sender);
        assert_eq!(left, [0.3; 4]);

        bridge.process_as(&mut StereoBuffer::new(&mut left, &mut right), Role::Receiver);
        assert_eq!(left, [0.0; 4]);
        assert_eq!(right, [0.0; 4]);
    }

    #[test]
    fn test_receiver_plays_staged_block() {
        let (mut bridge, link) = bridge(Role::Receiver);
        link.mark_connected();
        let sink = bridge.sink();

        let frame = AudioFrame::from_planes(&[0.5, 0.25], &[-0.5, -0.25]);
        sink.on_message(&frame.to_payload());

        let mut left = [9.0f32; 2];
        let mut right = [9.0f32; 2];
        bridge.process(&mut StereoBuffer::new(&mut left, &mut right));
        assert_eq!(left, [0.5, 0.25]);
        assert_eq!(right, [-0.5, -0.25]);

        // Nothing staged for the next block
        bridge.process(&mut StereoBuffer::new(&mut left, &mut right));
        assert_eq!(left, [0.0, 0.0]);
    }

    #[test]
    fn test_size_mismatch_is_dropped_without_disconnect() {
        let (mut bridge, link) = bridge(Role::Receiver);
        link.mark_connected();
        let sink = bridge.sink();

        sink.on_message(&[0u8; 7]);
        assert_eq!(bridge.counters().size_mismatches.load(Ordering::Relaxed), 1);
        assert_eq!(link.state(), EndpointState::Connected);

        sink.on_message(&AudioFrame::from_planes(&[0.1], &[0.2]).to_payload());
        let mut left = [0.0f32];
        let mut right = [0.0f32];
        bridge.process(&mut StereoBuffer::new(&mut left, &mut right));
        assert_eq!((left[0], right[0]), (0.1, 0.2));
    }

    #[test]
    fn test_sender_ignores_inbound_frames() {
        let (bridge, link) = bridge(Role::Sender);
        link.mark_connected();
        bridge
            .sink()
            .on_message(&AudioFrame::from_planes(&[1.0], &[1.0]).to_payload());
        assert_eq!(bridge.sink().staging_stats().unwrap().staged, 0);
    }

    #[test]
    fn test_release_detaches_staging() {
        let (mut bridge, link) = bridge(Role::Receiver);
        link.mark_connected();
        bridge.release();
        assert!(!bridge.is_prepared());

        bridge
            .sink()
            .on_message(&AudioFrame::from_planes(&[1.0], &[1.0]).to_payload());
        assert_eq!(bridge.counters().unstaged_frames.load(Ordering::Relaxed), 1);

        let mut left = [1.0f32; 2];
        let mut right = [1.0f32; 2];
        bridge.process(&mut StereoBuffer::new(&mut left, &mut right));
        assert_eq!(left, [0.0; 2]);
    }
}
