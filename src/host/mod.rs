//! Minimal standalone host
//!
//! Runs an [`InterConnectPlugin`] on a real audio device so the bridge can be
//! used without a plugin host: the sender binary captures the default input,
//! the receiver binary plays to the default output.

pub mod device;
pub mod planes;

pub use device::{default_device, device_name, stream_config, Direction};
pub use planes::PlaneScratch;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver};
use std::time::Duration;

use crate::config::BridgeConfig;
use crate::error::{AudioError, ConfigError};
use crate::network::Role;
use crate::plugin::{create_plugin, AudioProcessor, InterConnectPlugin, PluginHandle};

/// Largest block handed to the plugin; device buffers are split to fit
pub const HOST_MAX_BLOCK: usize = 1024;

/// How often the standalone host logs bridge statistics
pub const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// A running device stream with the plugin inside its callback
pub struct StandaloneHost {
    stream: cpal::Stream,
    handle: PluginHandle,
    errors: Receiver<AudioError>,
    config: StreamConfig,
    device: String,
}

impl StandaloneHost {
    /// Open the default device for `direction` and start streaming through
    /// `plugin`. The plugin is prepared here and moves into the callback.
    pub fn start(mut plugin: InterConnectPlugin, direction: Direction) -> Result<Self, AudioError> {
        let device = default_device(direction)?;
        let config = stream_config(&device, direction)?;
        let name = device_name(&device);
        tracing::info!(
            "Opening {:?} device {:?}: {} ch @ {} Hz",
            direction,
            name,
            config.channels,
            config.sample_rate.0
        );

        plugin.prepare(HOST_MAX_BLOCK);
        let handle = plugin.handle();
        let mut scratch = PlaneScratch::new(config.channels, HOST_MAX_BLOCK);
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        let on_error = move |err: cpal::StreamError| {
            let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
        };

        let stream = match direction {
            Direction::Input => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    scratch.run_input(data, &mut plugin);
                },
                on_error,
                None,
            ),
            Direction::Output => device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    scratch.run_output(data, &mut plugin);
                },
                on_error,
                None,
            ),
        }
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        Ok(Self {
            stream,
            handle,
            errors: error_rx,
            config,
            device: name,
        })
    }

    /// Host-thread view of the plugin running in the callback
    pub fn plugin(&self) -> &PluginHandle {
        &self.handle
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn device_name(&self) -> &str {
        &self.device
    }

    /// Next stream error reported by the device, if any
    pub fn check_errors(&self) -> Option<AudioError> {
        self.errors.try_recv().ok()
    }

    pub fn pause(&self) {
        if let Err(e) = self.stream.pause() {
            tracing::warn!("Failed to pause stream: {}", e);
        }
    }
}

/// Config from the optional first CLI argument, else the per-user file,
/// else defaults
pub fn config_from_args() -> Result<BridgeConfig, ConfigError> {
    match std::env::args().nth(1) {
        Some(path) => BridgeConfig::load(path),
        None => match BridgeConfig::default_path() {
            Some(path) => BridgeConfig::load_or_default(path),
            None => Ok(BridgeConfig::default()),
        },
    }
}

/// Run one plugin instance on the default device until Ctrl+C
pub async fn run(config: BridgeConfig, is_sender: bool) -> crate::Result<()> {
    let direction = if is_sender {
        Direction::Input
    } else {
        Direction::Output
    };

    let plugin = create_plugin(config);
    plugin.set_mode(is_sender);
    let host = StandaloneHost::start(plugin, direction)?;
    host.plugin().host_ready();

    tracing::info!(
        "{} running on {:?} - press Ctrl+C to stop",
        Role::from_mode(is_sender),
        host.device_name()
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(STATS_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutting down");
                break;
            }
            _ = ticker.tick() => {
                while let Some(err) = host.check_errors() {
                    tracing::warn!("Audio stream error: {}", err);
                }
                tracing::info!("Stats: {}", host.plugin().stats());
            }
        }
    }

    host.pause();
    Ok(())
}
