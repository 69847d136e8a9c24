//! State shared between the controller, the transport thread and the audio
//! callback
//!
//! Everything the audio thread touches here is an atomic or the lock-free
//! [`Outbox`]; the mutex only guards the connection timestamp, which is read
//! by the host side.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, AtomicU8, Ordering};

use super::outbox::Outbox;
use crate::config::BridgeConfig;

/// Which side of the pair this instance plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Binds the well-known port and streams its input
    Sender,
    /// Dials the sender and plays what arrives
    Receiver,
}

impl Role {
    /// Map the `InOut` switch (true = send) to a role
    pub fn from_mode(is_sender: bool) -> Self {
        if is_sender {
            Role::Sender
        } else {
            Role::Receiver
        }
    }

    pub fn is_sender(self) -> bool {
        matches!(self, Role::Sender)
    }

    fn to_raw(self) -> u8 {
        match self {
            Role::Sender => 1,
            Role::Receiver => 2,
        }
    }

    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Role::Sender),
            2 => Some(Role::Receiver),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Sender => write!(f, "sender"),
            Role::Receiver => write!(f, "receiver"),
        }
    }
}

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EndpointState {
    Disconnected = 0,
    Listening = 1,
    Connecting = 2,
    Connected = 3,
    Closed = 4,
}

impl EndpointState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => EndpointState::Listening,
            2 => EndpointState::Connecting,
            3 => EndpointState::Connected,
            4 => EndpointState::Closed,
            _ => EndpointState::Disconnected,
        }
    }
}

/// Last failure reported by the rendezvous machinery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum LinkFault {
    BindFailed = 1,
    ConnectFailed = 2,
    ConnectTimeout = 3,
    PeerClosed = 4,
    ProtocolViolation = 5,
}

impl LinkFault {
    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(LinkFault::BindFailed),
            2 => Some(LinkFault::ConnectFailed),
            3 => Some(LinkFault::ConnectTimeout),
            4 => Some(LinkFault::PeerClosed),
            5 => Some(LinkFault::ProtocolViolation),
            _ => None,
        }
    }
}

/// Transport-level counters
#[derive(Debug, Default)]
pub struct LinkCounters {
    pub frames_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub frames_received: AtomicU64,
    pub bytes_received: AtomicU64,
    pub connections: AtomicU64,
}

/// Connection status outliving any single endpoint
pub struct Link {
    state: AtomicU8,
    role: AtomicU8,
    connected: AtomicBool,
    last_fault: AtomicU8,
    local_port: AtomicU16,
    outbox: Outbox,
    counters: LinkCounters,
    connected_since: Mutex<Option<DateTime<Utc>>>,
}

impl Link {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            state: AtomicU8::new(EndpointState::Disconnected as u8),
            role: AtomicU8::new(0),
            connected: AtomicBool::new(false),
            last_fault: AtomicU8::new(0),
            local_port: AtomicU16::new(0),
            outbox: Outbox::new(config.send_queue_depth, config.max_frame_bytes),
            counters: LinkCounters::default(),
            connected_since: Mutex::new(None),
        }
    }

    /// Whether a peer is attached. Safe to poll from the audio thread.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn state(&self) -> EndpointState {
        EndpointState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: EndpointState) {
        let previous = self.state.swap(state as u8, Ordering::AcqRel);
        if previous != state as u8 {
            tracing::debug!(
                "Endpoint state {:?} -> {:?}",
                EndpointState::from_raw(previous),
                state
            );
        }
    }

    /// Role of the running endpoint, if any
    #[inline]
    pub fn role(&self) -> Option<Role> {
        Role::from_raw(self.role.load(Ordering::Acquire))
    }

    pub(crate) fn set_role(&self, role: Option<Role>) {
        self.role
            .store(role.map(Role::to_raw).unwrap_or(0), Ordering::Release);
    }

    pub fn last_fault(&self) -> Option<LinkFault> {
        LinkFault::from_raw(self.last_fault.load(Ordering::Acquire))
    }

    pub(crate) fn report_fault(&self, fault: LinkFault) {
        self.last_fault.store(fault as u8, Ordering::Release);
    }

    pub(crate) fn clear_fault(&self) {
        self.last_fault.store(0, Ordering::Release);
    }

    /// Port the sender actually bound (useful when configured with port 0)
    pub fn local_port(&self) -> Option<u16> {
        match self.local_port.load(Ordering::Acquire) {
            0 => None,
            port => Some(port),
        }
    }

    pub(crate) fn set_local_port(&self, port: Option<u16>) {
        self.local_port.store(port.unwrap_or(0), Ordering::Release);
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn counters(&self) -> &LinkCounters {
        &self.counters
    }

    pub fn connected_since(&self) -> Option<DateTime<Utc>> {
        *self.connected_since.lock()
    }

    /// Enqueue a frame built in place by `fill`. Drops the frame when no
    /// peer is attached or no slot is free. Never blocks or allocates.
    #[inline]
    pub fn send_with<F>(&self, payload_len: usize, fill: F) -> bool
    where
        F: FnOnce(&mut [u8]),
    {
        if !self.is_connected() {
            return false;
        }
        self.outbox.send_with(payload_len, fill)
    }

    /// Enqueue a copy of `payload`
    pub fn send(&self, payload: &[u8]) -> bool {
        self.send_with(payload.len(), |out| out.copy_from_slice(payload))
    }

    /// Publish a fresh connection. Stale outbound frames are discarded
    /// before the flag becomes visible.
    pub(crate) fn mark_connected(&self) {
        self.outbox.discard_pending();
        *self.connected_since.lock() = Some(Utc::now());
        self.counters.connections.fetch_add(1, Ordering::Relaxed);
        self.connected.store(true, Ordering::Release);
        self.set_state(EndpointState::Connected);
    }

    pub(crate) fn mark_disconnected(&self, next: EndpointState) {
        self.connected.store(false, Ordering::Release);
        *self.connected_since.lock() = None;
        self.set_state(next);
    }
}
