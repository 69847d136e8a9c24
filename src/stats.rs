//! Point-in-time statistics for logging and diagnostics

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::Ordering;

use crate::audio::{BridgeCounters, StagingStats};
use crate::network::{EndpointState, Link, LinkFault, Role};

/// Snapshot of every bridge counter
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStats {
    pub role: Option<Role>,
    pub state: EndpointState,
    pub last_fault: Option<LinkFault>,
    pub connected_since: Option<DateTime<Utc>>,
    pub connections: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub frames_received: u64,
    pub bytes_received: u64,
    pub frames_dropped_send: u64,
    pub frames_dropped_size_mismatch: u64,
    pub frames_unstaged: u64,
    pub blocks_sent: u64,
    pub blocks_played: u64,
    pub staging_overruns: u64,
    pub staging_underruns: u64,
    pub frames_truncated: u64,
    pub staging_level: usize,
}

impl BridgeStats {
    pub fn collect(link: &Link, counters: &BridgeCounters, staging: Option<StagingStats>) -> Self {
        let lc = link.counters();
        let staging = staging.unwrap_or_default();
        Self {
            role: link.role(),
            state: link.state(),
            last_fault: link.last_fault(),
            connected_since: link.connected_since(),
            connections: lc.connections.load(Ordering::Relaxed),
            frames_sent: lc.frames_sent.load(Ordering::Relaxed),
            bytes_sent: lc.bytes_sent.load(Ordering::Relaxed),
            frames_received: lc.frames_received.load(Ordering::Relaxed),
            bytes_received: lc.bytes_received.load(Ordering::Relaxed),
            frames_dropped_send: link.outbox().dropped(),
            frames_dropped_size_mismatch: counters.size_mismatches.load(Ordering::Relaxed),
            frames_unstaged: counters.unstaged_frames.load(Ordering::Relaxed),
            blocks_sent: counters.blocks_sent.load(Ordering::Relaxed),
            blocks_played: counters.blocks_played.load(Ordering::Relaxed),
            staging_overruns: staging.overruns,
            staging_underruns: staging.underruns,
            frames_truncated: staging.truncated,
            staging_level: staging.level,
        }
    }

    /// Seconds since the current connection was made
    pub fn uptime_seconds(&self) -> Option<i64> {
        self.connected_since
            .map(|since| (Utc::now() - since).num_seconds())
    }
}

impl std::fmt::Display for BridgeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {:?}: {} frames / {:.1} KB sent, {} frames / {:.1} KB received, \
             {} send drops, {} size mismatches, {} overruns, {} underruns",
            self.role.map(|r| r.to_string()).unwrap_or_else(|| "idle".into()),
            self.state,
            self.frames_sent,
            self.bytes_sent as f64 / 1024.0,
            self.frames_received,
            self.bytes_received as f64 / 1024.0,
            self.frames_dropped_send,
            self.frames_dropped_size_mismatch,
            self.staging_overruns,
            self.staging_underruns,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;

    #[test]
    fn test_collect_and_serialize() {
        let link = Link::new(&BridgeConfig::default());
        link.set_role(Some(Role::Sender));
        link.mark_connected();
        let counters = BridgeCounters::default();
        counters.blocks_sent.fetch_add(3, Ordering::Relaxed);

        let stats = BridgeStats::collect(&link, &counters, None);
        assert_eq!(stats.state, EndpointState::Connected);
        assert_eq!(stats.blocks_sent, 3);
        assert_eq!(stats.connections, 1);
        assert!(stats.uptime_seconds().unwrap() >= 0);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["role"], "Sender");
        assert_eq!(json["state"], "Connected");
    }
}
