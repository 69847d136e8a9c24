//! Audio subsystem module

pub mod block;
pub mod bridge;
pub mod buffer;
pub mod denormal;

pub use block::StereoBuffer;
pub use bridge::{AudioBridge, BridgeCounters, StagingSink};
pub use buffer::{SharedStagingRing, StagingRing, StagingStats};
pub use denormal::ScopedNoDenormals;
