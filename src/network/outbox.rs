//! Preallocated outbound frame queue
//!
//! The audio thread may not allocate, so frames are built in place inside
//! slots that cycle between a free list and the outbound queue. Each slot
//! already carries the frame header, so the transport thread writes it with
//! a single `write_all`.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::constants::FRAME_HEADER_LEN;
use crate::protocol::write_header;

pub struct Outbox {
    free: ArrayQueue<Vec<u8>>,
    outbound: ArrayQueue<Vec<u8>>,
    max_payload: usize,
    dropped: AtomicU64,
}

impl Outbox {
    pub fn new(depth: usize, max_payload: usize) -> Self {
        let depth = depth.max(1);
        let free = ArrayQueue::new(depth);
        for _ in 0..depth {
            let _ = free.push(Vec::with_capacity(FRAME_HEADER_LEN + max_payload));
        }
        Self {
            free,
            outbound: ArrayQueue::new(depth),
            max_payload,
            dropped: AtomicU64::new(0),
        }
    }

    /// Claim a slot, let `fill` write `payload_len` bytes of payload, and
    /// queue the frame. Returns false (and counts a drop) when the payload
    /// is too large or every slot is in flight.
    pub fn send_with<F>(&self, payload_len: usize, fill: F) -> bool
    where
        F: FnOnce(&mut [u8]),
    {
        if payload_len > self.max_payload {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let Some(mut slot) = self.free.pop() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        // Within the preallocated capacity, so no reallocation
        slot.clear();
        slot.resize(FRAME_HEADER_LEN + payload_len, 0);
        write_header(&mut slot[..FRAME_HEADER_LEN], payload_len);
        fill(&mut slot[FRAME_HEADER_LEN..]);

        if let Err(slot) = self.outbound.push(slot) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            self.recycle(slot);
            return false;
        }
        true
    }

    /// Next queued frame (header included), transport side
    pub(crate) fn pop_outbound(&self) -> Option<Vec<u8>> {
        self.outbound.pop()
    }

    /// Return a written slot to the free list
    pub(crate) fn recycle(&self, slot: Vec<u8>) {
        let _ = self.free.push(slot);
    }

    /// Drop every queued frame without sending it
    pub fn discard_pending(&self) {
        while let Some(slot) = self.outbound.pop() {
            self.recycle(slot);
        }
    }

    /// Frames queued for the transport thread
    pub fn pending(&self) -> usize {
        self.outbound.len()
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Frames dropped because the queue was full or the frame too large
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
