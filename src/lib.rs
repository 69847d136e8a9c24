//! # InterConnect Bridge
//!
//! A sender/receiver audio plugin pair that ferries a stereo PCM stream from
//! one plugin instance to another on the same machine over a loopback
//! stream socket.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────── SENDER INSTANCE ────────────────────────────┐
//! │  host audio callback                                                    │
//! │        │  process(block)   (input passes through untouched)             │
//! │        ▼                                                                │
//! │  ┌─────────────┐  interleave   ┌──────────────┐                         │
//! │  │ AudioBridge │ ────────────▶ │    Outbox    │  preallocated slots     │
//! │  └─────────────┘   in place    └──────┬───────┘                         │
//! │                                       │ drained by                      │
//! │  ┌──────────────┐   accept    ┌───────▼────────────┐                    │
//! │  │ServerListener│ ──────────▶ │ ConnectionEndpoint │ transport thread   │
//! │  └──────────────┘  :52364     └───────┬────────────┘                    │
//! └───────────────────────────────────────┼─────────────────────────────────┘
//!                                         │ [magic|len|L0 R0 L1 R1 ...]
//!                                         ▼ loopback TCP
//! ┌───────────────────────────────────────┼─────────── RECEIVER INSTANCE ───┐
//! │  ┌───────────────┐   dial     ┌───────▼────────────┐                    │
//! │  │ClientConnector│ ─────────▶ │ ConnectionEndpoint │ transport thread   │
//! │  └───────────────┘  2000 ms   └───────┬────────────┘                    │
//! │                                       │ on_message: deinterleave        │
//! │                                ┌──────▼───────┐                         │
//! │                                │ StagingRing  │  SPSC ring of blocks    │
//! │                                └──────┬───────┘                         │
//! │  ┌─────────────┐   dequeue            │                                 │
//! │  │ AudioBridge │ ◀────────────────────┘                                 │
//! │  └─────┬───────┘                                                        │
//! │        ▼  process(block)   (silence on underrun / when disconnected)    │
//! │  host audio callback                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`network::RoleController`] decides which side of the pair an
//! instance plays from the single `InOut` parameter and owns the listener or
//! connector. The [`audio::AudioBridge`] is the real-time half: it never
//! blocks, allocates or logs once prepared.

pub mod audio;
pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod network;
pub mod plugin;
pub mod protocol;
pub mod stats;

pub use config::BridgeConfig;
pub use error::{Error, Result};
pub use plugin::{create_plugin, InterConnectPlugin};

/// Application-wide constants
pub mod constants {
    /// Well-known loopback port both instances rendezvous on
    pub const DEFAULT_PORT: u16 = 52364;

    /// Host the receiver dials
    pub const DEFAULT_HOST: &str = "localhost";

    /// Receiver connect timeout in milliseconds
    pub const CONNECT_TIMEOUT_MS: u64 = 2000;

    /// Channel count carried on the wire (stereo, implicit)
    pub const CHANNELS: u16 = 2;

    /// Bytes per interleaved stereo sample pair (2 x f32)
    pub const BYTES_PER_STEREO_SAMPLE: usize = 8;

    /// Magic number leading every frame header
    pub const FRAME_MAGIC: u32 = 0xF2B4_9E2C;

    /// Frame header length: magic + payload length, both u32 LE
    pub const FRAME_HEADER_LEN: usize = 8;

    /// Default upper bound on a frame payload (8192 stereo samples)
    pub const DEFAULT_MAX_FRAME_BYTES: usize = 65_536;

    /// Default depth of the receiver staging ring (in blocks)
    pub const DEFAULT_STAGING_DEPTH: usize = 4;

    /// Default number of preallocated outbound frame slots
    pub const DEFAULT_SEND_QUEUE_DEPTH: usize = 8;

    /// Delay before the endpoint is constructed after instantiation
    pub const HOST_READY_DELAY_MS: u64 = 100;

    /// Transport thread socket poll granularity
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1;

    /// Parameter id of the Send/Receive switch
    pub const IN_OUT_PARAM_ID: &str = "InOut";

    /// Human-readable name of the Send/Receive switch
    pub const IN_OUT_PARAM_NAME: &str = "Send/Receive";
}
