//! Coordinator configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration document is not valid JSON for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range or inconsistent with another value.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Tunables for the coordinator. Defaults match the documented behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Memory loop cadence.
    pub memory_poll_interval_ms: u64,

    /// Network loop cadence.
    pub network_poll_interval_ms: u64,

    /// Voice is considered inactive after this long without an audio event.
    pub voice_timeout_ms: u64,

    /// Voice activity younger than this gets the longer yield delay.
    pub yield_recent_window_ms: u64,

    /// Yield delay while voice activity is very recent.
    pub yield_delay_recent_ms: u64,

    /// Yield delay while voice is active but not very recent.
    pub yield_delay_ms: u64,

    /// Voice activity younger than this skips every other video frame.
    pub skip_recent_window_ms: u64,

    /// Latency average above this marks the network congested.
    pub congestion_threshold_ms: u32,

    /// When set, congestion clears only once the average drops below this
    /// value. `None` uses `congestion_threshold_ms` in both directions.
    pub congestion_exit_threshold_ms: Option<u32>,

    /// Latency above this (while not congested) trims the bitrate.
    pub elevated_latency_ms: u32,

    /// Bitrate floor while congested.
    pub congested_bitrate_floor_kbps: u32,

    /// Bitrate floor while latency is elevated.
    pub elevated_bitrate_floor_kbps: u32,

    /// Frame rate floor while congested.
    pub congested_fps_floor: u32,

    /// Frame rate floor while voice is active.
    pub voice_fps_floor: u32,

    /// Memory warning threshold.
    pub memory_warning_mb: u64,

    /// Memory cleanup threshold.
    pub memory_cleanup_mb: u64,

    /// Sustained time above the warning threshold before a compaction is
    /// requested.
    pub compaction_after_secs: u64,

    /// Latency samples kept for the moving average.
    pub latency_window: usize,

    /// Sent-frame timestamps kept for throughput estimation.
    pub frame_timestamp_capacity: usize,

    /// Small (audio) buffer size class in bytes.
    pub small_buffer_size: usize,

    /// Large (video) buffer size class in bytes.
    pub large_buffer_size: usize,

    /// Maximum buffers held by each pool.
    pub pool_capacity: usize,

    /// Small pool occupancy after a memory cleanup.
    pub small_pool_floor: usize,

    /// Large pool occupancy after a memory cleanup.
    pub large_pool_floor: usize,

    /// Upper bound on how long shutdown waits for each monitor loop.
    pub shutdown_join_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            memory_poll_interval_ms: 1000,
            network_poll_interval_ms: 500,
            voice_timeout_ms: 300,
            yield_recent_window_ms: 100,
            yield_delay_recent_ms: 20,
            yield_delay_ms: 10,
            skip_recent_window_ms: 50,
            congestion_threshold_ms: 100,
            congestion_exit_threshold_ms: None,
            elevated_latency_ms: 50,
            congested_bitrate_floor_kbps: 1000,
            elevated_bitrate_floor_kbps: 2000,
            congested_fps_floor: 15,
            voice_fps_floor: 20,
            memory_warning_mb: 500,
            memory_cleanup_mb: 400,
            compaction_after_secs: 300,
            latency_window: 30,
            frame_timestamp_capacity: 100,
            small_buffer_size: 4096,
            large_buffer_size: 1024 * 1024,
            pool_capacity: 20,
            small_pool_floor: 5,
            large_pool_floor: 2,
            shutdown_join_timeout_ms: 1000,
        }
    }
}

impl CoordinatorConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Check ranges and cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_poll_interval_ms == 0 || self.network_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll intervals must be non-zero".into(),
            ));
        }
        if self.memory_cleanup_mb > self.memory_warning_mb {
            return Err(ConfigError::Invalid(format!(
                "cleanup threshold {} MB is above warning threshold {} MB",
                self.memory_cleanup_mb, self.memory_warning_mb
            )));
        }
        if let Some(exit) = self.congestion_exit_threshold_ms {
            if exit > self.congestion_threshold_ms {
                return Err(ConfigError::Invalid(format!(
                    "congestion exit threshold {exit} ms is above enter threshold {} ms",
                    self.congestion_threshold_ms
                )));
            }
        }
        if self.latency_window == 0 || self.frame_timestamp_capacity == 0 {
            return Err(ConfigError::Invalid(
                "sample windows must hold at least one entry".into(),
            ));
        }
        if self.small_buffer_size == 0 || self.large_buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer sizes must be non-zero".into()));
        }
        if self.pool_capacity == 0 {
            return Err(ConfigError::Invalid("pool capacity must be non-zero".into()));
        }
        if self.small_pool_floor > self.pool_capacity || self.large_pool_floor > self.pool_capacity
        {
            return Err(ConfigError::Invalid(format!(
                "pool floors ({}, {}) exceed pool capacity {}",
                self.small_pool_floor, self.large_pool_floor, self.pool_capacity
            )));
        }
        Ok(())
    }

    pub fn memory_poll_interval(&self) -> Duration {
        Duration::from_millis(self.memory_poll_interval_ms)
    }

    pub fn network_poll_interval(&self) -> Duration {
        Duration::from_millis(self.network_poll_interval_ms)
    }

    pub fn voice_timeout(&self) -> Duration {
        Duration::from_millis(self.voice_timeout_ms)
    }

    pub fn compaction_after(&self) -> Duration {
        Duration::from_secs(self.compaction_after_secs)
    }

    pub fn shutdown_join_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_join_timeout_ms)
    }
}
