//! Host-facing plugin shell
//!
//! [`InterConnectPlugin`] is what a host instantiates. It owns the
//! parameter registry, the [`RoleController`] and the [`AudioBridge`], and
//! exposes them through three small capability traits.

pub mod deferred;
pub mod params;
pub mod state;

pub use deferred::DeferredInit;
pub use params::{BoolParam, ParamRegistry};
pub use state::{PersistedState, STATE_FORMAT};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::audio::{AudioBridge, BridgeCounters, StagingSink, StereoBuffer};
use crate::config::BridgeConfig;
use crate::constants::IN_OUT_PARAM_ID;
use crate::error::Result;
use crate::network::{EndpointState, Link, Role, RoleController};
use crate::stats::BridgeStats;

/// Static plugin metadata
pub struct PluginInfo;

impl PluginInfo {
    pub const NAME: &'static str = "InterConnect";
    pub const INPUT_CHANNELS: u16 = 2;
    pub const OUTPUT_CHANNELS: u16 = 2;
    pub const ACCEPTS_MIDI: bool = false;
    pub const PRODUCES_MIDI: bool = false;
    pub const TAIL_SECONDS: f64 = 0.0;
}

/// Audio lifecycle, driven by the host
pub trait AudioProcessor {
    fn prepare(&mut self, max_block_size: usize);

    /// Runs on the audio thread. Never fails, never blocks.
    fn process(&mut self, buffer: &mut StereoBuffer<'_>);

    fn release(&mut self);
}

/// Notified on the host thread when the Send/Receive switch toggles
pub trait ParameterListener {
    fn on_role_changed(&self, is_sender: bool);
}

/// Opaque state blob round-trip
pub trait StatePersistence {
    fn persist_state(&self) -> Vec<u8>;
    fn restore_state(&self, data: &[u8]) -> Result<()>;
}

/// Host-thread state shared with parameter listeners and deferred init
struct Shared {
    params: ParamRegistry,
    link: Arc<Link>,
    controller: Mutex<RoleController>,
    ready: AtomicBool,
}

impl Shared {
    fn host_ready(&self) {
        if self.ready.swap(true, Ordering::AcqRel) {
            return;
        }
        let role = Role::from_mode(self.params.in_out().get());
        tracing::info!("Host ready, starting as {}", role);
        self.controller.lock().start(role);
    }

    fn apply_mode(&self, is_sender: bool) {
        // Before host_ready the new value is simply picked up at start
        if !self.ready.load(Ordering::Acquire) {
            return;
        }
        self.controller
            .lock()
            .on_role_change(Role::from_mode(is_sender));
    }

    fn stats(&self, sink: &StagingSink, counters: &BridgeCounters) -> BridgeStats {
        BridgeStats::collect(&self.link, counters, sink.staging_stats())
    }
}

/// Cloneable host-thread view of a plugin, usable while the plugin itself
/// lives inside an audio callback.
#[derive(Clone)]
pub struct PluginHandle {
    shared: Arc<Shared>,
    sink: Arc<StagingSink>,
    counters: Arc<BridgeCounters>,
}

impl PluginHandle {
    pub fn host_ready(&self) {
        self.shared.host_ready();
    }

    /// Set the Send/Receive switch (true = Sender)
    pub fn set_mode(&self, is_sender: bool) {
        self.shared.params.set_bool(IN_OUT_PARAM_ID, is_sender);
    }

    pub fn mode(&self) -> bool {
        self.shared.params.in_out().get()
    }

    pub fn state(&self) -> EndpointState {
        self.shared.link.state()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.link.is_connected()
    }

    pub fn link(&self) -> &Arc<Link> {
        &self.shared.link
    }

    pub fn stats(&self) -> BridgeStats {
        self.shared.stats(&self.sink, &self.counters)
    }
}

/// One plugin instance
pub struct InterConnectPlugin {
    shared: Arc<Shared>,
    bridge: AudioBridge,
    deferred: Option<DeferredInit>,
}

impl InterConnectPlugin {
    fn new(config: BridgeConfig) -> Self {
        let link = Arc::new(Link::new(&config));
        let bridge = AudioBridge::new(&config, link.clone());
        let controller = RoleController::new(config, link.clone(), bridge.sink());

        let shared = Arc::new(Shared {
            params: ParamRegistry::new(),
            link,
            controller: Mutex::new(controller),
            ready: AtomicBool::new(false),
        });

        let weak: Weak<Shared> = Arc::downgrade(&shared);
        shared.params.add_listener(move |id, value| {
            if id != IN_OUT_PARAM_ID {
                return;
            }
            if let Some(shared) = weak.upgrade() {
                shared.apply_mode(value);
            }
        });

        Self {
            shared,
            bridge,
            deferred: None,
        }
    }

    /// Schedule [`host_ready`](Self::host_ready) after the configured delay.
    /// The pending call is cancelled if the plugin is dropped first.
    pub fn schedule_host_ready(&mut self) {
        let delay = self.shared.controller.lock().config().host_ready_delay();
        let weak = Arc::downgrade(&self.shared);
        match DeferredInit::schedule(delay, move || {
            if let Some(shared) = weak.upgrade() {
                shared.host_ready();
            }
        }) {
            Ok(deferred) => self.deferred = Some(deferred),
            Err(e) => {
                tracing::warn!("Could not defer initialisation ({}), starting now", e);
                self.shared.host_ready();
            }
        }
    }

    /// Start the endpoint for the current mode. Only the first call acts.
    pub fn host_ready(&self) {
        self.shared.host_ready();
    }

    pub fn is_host_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire)
    }

    pub fn params(&self) -> &ParamRegistry {
        &self.shared.params
    }

    /// Current mode: true = Sender, false = Receiver
    pub fn mode(&self) -> bool {
        self.shared.params.in_out().get()
    }

    /// Toggle the Send/Receive switch as the host would
    pub fn set_mode(&self, is_sender: bool) {
        self.shared.params.set_bool(IN_OUT_PARAM_ID, is_sender);
    }

    pub fn role(&self) -> Option<Role> {
        self.shared.link.role()
    }

    pub fn state(&self) -> EndpointState {
        self.shared.link.state()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.link.is_connected()
    }

    pub fn link(&self) -> &Arc<Link> {
        &self.shared.link
    }

    pub fn stats(&self) -> BridgeStats {
        self.shared.stats(&self.bridge.sink(), self.bridge.counters())
    }

    pub fn handle(&self) -> PluginHandle {
        PluginHandle {
            shared: self.shared.clone(),
            sink: self.bridge.sink(),
            counters: self.bridge.counters().clone(),
        }
    }

    /// Close the endpoint and join its threads. Idempotent.
    pub fn stop(&self) {
        self.shared.controller.lock().stop();
    }
}

impl AudioProcessor for InterConnectPlugin {
    fn prepare(&mut self, max_block_size: usize) {
        self.bridge.prepare(max_block_size);
    }

    #[inline]
    fn process(&mut self, buffer: &mut StereoBuffer<'_>) {
        // Until host_ready and after stop there is no role; follow the switch
        let idle = Role::from_mode(self.shared.params.in_out().get());
        self.bridge.process_as(buffer, idle);
    }

    fn release(&mut self) {
        self.bridge.release();
    }
}

impl ParameterListener for InterConnectPlugin {
    fn on_role_changed(&self, is_sender: bool) {
        self.shared.apply_mode(is_sender);
    }
}

impl StatePersistence for InterConnectPlugin {
    fn persist_state(&self) -> Vec<u8> {
        PersistedState::new(self.shared.params.values()).to_bytes()
    }

    fn restore_state(&self, data: &[u8]) -> Result<()> {
        let state = PersistedState::from_bytes(data)?;
        for (id, value) in &state.params {
            if self.shared.params.bool_param(id).is_none() {
                tracing::debug!("Ignoring unknown persisted parameter {:?}", id);
                continue;
            }
            self.shared.params.set_bool(id, *value);
        }
        Ok(())
    }
}

impl Drop for InterConnectPlugin {
    fn drop(&mut self) {
        if let Some(mut deferred) = self.deferred.take() {
            deferred.cancel();
        }
        self.shared.params.clear_listeners();
        self.shared.controller.lock().stop();
        self.bridge.release();
    }
}

/// The single constructor hosts use to instantiate the plugin.
///
/// Endpoint construction is deferred by `host_ready_delay_ms` so the host
/// can restore parameters first; call [`InterConnectPlugin::host_ready`]
/// to start immediately instead.
pub fn create_plugin(config: BridgeConfig) -> InterConnectPlugin {
    let mut plugin = InterConnectPlugin::new(config);
    plugin.schedule_host_ready();
    plugin
}
