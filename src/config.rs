//! Bridge configuration
//!
//! Plugin builds run on the defaults. A TOML file can override them, which
//! the standalone hosts and the integration tests use to pick another port.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::ConfigError;

/// Runtime settings for one plugin instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Host the receiver dials
    pub host: String,

    /// Rendezvous port; 0 lets the sender pick an ephemeral port
    pub port: u16,

    /// Receiver connect timeout
    pub connect_timeout_ms: u64,

    /// Filled blocks the receiver may hold before dropping the oldest
    pub staging_depth: usize,

    /// Preallocated outbound frame slots
    pub send_queue_depth: usize,

    /// Largest payload accepted or produced, in bytes
    pub max_frame_bytes: usize,

    /// Delay before the deferred host-ready step runs
    pub host_ready_delay_ms: u64,

    /// Transport thread socket poll granularity
    pub poll_interval_ms: u64,

    /// Re-bind / re-dial interval after a failure; 0 disables retrying
    pub retry_interval_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
            staging_depth: DEFAULT_STAGING_DEPTH,
            send_queue_depth: DEFAULT_SEND_QUEUE_DEPTH,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            host_ready_delay_ms: HOST_READY_DELAY_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            retry_interval_ms: 0,
        }
    }
}

impl BridgeConfig {
    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Load `path`, falling back to defaults when the file does not exist
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Parse and validate TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Per-user config file location
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "interconnect-bridge")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "host",
                reason: "must not be empty".into(),
            });
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "connect_timeout_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.staging_depth < 2 {
            return Err(ConfigError::Invalid {
                field: "staging_depth",
                reason: format!("{} is below the minimum of 2", self.staging_depth),
            });
        }
        if self.send_queue_depth == 0 {
            return Err(ConfigError::Invalid {
                field: "send_queue_depth",
                reason: "must be greater than zero".into(),
            });
        }
        if self.max_frame_bytes == 0 || self.max_frame_bytes % BYTES_PER_STEREO_SAMPLE != 0 {
            return Err(ConfigError::Invalid {
                field: "max_frame_bytes",
                reason: format!(
                    "{} is not a positive multiple of {}",
                    self.max_frame_bytes, BYTES_PER_STEREO_SAMPLE
                ),
            });
        }
        if self.max_frame_bytes > u32::MAX as usize {
            return Err(ConfigError::Invalid {
                field: "max_frame_bytes",
                reason: "does not fit the u32 length prefix".into(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Largest block, in samples per channel, a single frame can carry
    pub fn max_frame_samples(&self) -> usize {
        self.max_frame_bytes / BYTES_PER_STEREO_SAMPLE
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn host_ready_delay(&self) -> Duration {
        Duration::from_millis(self.host_ready_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_interval(&self) -> Option<Duration> {
        (self.retry_interval_ms > 0).then(|| Duration::from_millis(self.retry_interval_ms))
    }

    /// `host:port` string the receiver dials
    pub fn dial_target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
