//! Bridge configuration, loaded from YAML.
//!
//! ```yaml
//! sync:
//!   tolerance_ms: 20.0
//!   queue_size: 10
//! channels:
//!   input_capacity: 10
//! publish:
//!   stamp_source: publish_time   # or capture_time
//!   log_odometry: true
//! log_level: info
//! ```
//!
//! Every field is optional.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::publish::StampSource;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Largest capture-time gap accepted between paired frames.
    pub tolerance_ms: f64,
    /// Per-stream buffer bound.
    pub queue_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tolerance_ms: 20.0,
            queue_size: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Capacity of each bounded input channel of the threaded bridge.
    pub input_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { input_capacity: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub stamp_source: StampSource,
    /// Attach a `LogSink` for odometry.
    pub log_odometry: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            stamp_source: StampSource::PublishTime,
            log_odometry: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub sync: SyncConfig,
    pub channels: ChannelConfig,
    pub publish: PublishConfig,
    /// Fallback filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            channels: ChannelConfig::default(),
            publish: PublishConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open config {}", path.display()))?;
        let config: Self = serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.sync.tolerance_ms.is_finite() || self.sync.tolerance_ms < 0.0 {
            bail!(
                "sync.tolerance_ms must be a non-negative number, got {}",
                self.sync.tolerance_ms
            );
        }
        if self.sync.queue_size == 0 {
            bail!("sync.queue_size must be at least 1");
        }
        if self.channels.input_capacity == 0 {
            bail!("channels.input_capacity must be at least 1");
        }
        Ok(())
    }

    pub fn tolerance_ns(&self) -> u64 {
        (self.sync.tolerance_ms * 1e6).round() as u64
    }
}
