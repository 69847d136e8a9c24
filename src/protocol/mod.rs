//! Wire protocol: frame headers and the interleaved PCM payload

pub mod frame;
pub mod framing;

pub use frame::{deinterleave_into, interleave_into, payload_len, stereo_samples_in, AudioFrame};
pub use framing::{write_header, FrameDecoder};
