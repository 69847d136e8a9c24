#![allow(dead_code)]

use std::net::TcpListener;
use std::time::{Duration, Instant};

use interconnect_bridge::audio::StereoBuffer;
use interconnect_bridge::plugin::AudioProcessor;
use interconnect_bridge::{create_plugin, BridgeConfig, InterConnectPlugin};

pub const BLOCK: usize = 64;

/// A port nothing is listening on right now
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("bind ephemeral")
        .local_addr()
        .expect("local addr")
        .port()
}

pub fn config(port: u16) -> BridgeConfig {
    BridgeConfig {
        host: "127.0.0.1".into(),
        port,
        // Tests start endpoints explicitly
        host_ready_delay_ms: 60_000,
        ..Default::default()
    }
}

/// A prepared plugin started in the given mode
pub fn start(config: BridgeConfig, is_sender: bool) -> InterConnectPlugin {
    let mut plugin = create_plugin(config);
    plugin.prepare(BLOCK);
    plugin.set_mode(is_sender);
    plugin.host_ready();
    plugin
}

pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Sender then receiver on a fresh port, both connected
pub fn connected_pair(config: BridgeConfig) -> (InterConnectPlugin, InterConnectPlugin) {
    let a = start(config.clone(), true);
    let b = start(config, false);
    assert!(
        wait_until(Duration::from_secs(2), || a.is_connected() && b.is_connected()),
        "pair did not connect: sender {:?}, receiver {:?}",
        a.state(),
        b.state()
    );
    (a, b)
}

/// Run one block through `plugin`, returning its output planes
pub fn process(plugin: &mut InterConnectPlugin, left: &[f32], right: &[f32]) -> (Vec<f32>, Vec<f32>) {
    let mut left = left.to_vec();
    let mut right = right.to_vec();
    plugin.process(&mut StereoBuffer::new(&mut left, &mut right));
    (left, right)
}

/// Wait for a frame to be staged on the receiver, then play it
pub fn receive(plugin: &mut InterConnectPlugin, len: usize) -> (Vec<f32>, Vec<f32>) {
    assert!(
        wait_until(Duration::from_secs(2), || plugin.stats().staging_level > 0),
        "no frame staged"
    );
    process(plugin, &vec![0.0; len], &vec![0.0; len])
}
