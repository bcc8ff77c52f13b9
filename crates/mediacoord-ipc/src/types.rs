//! Snapshot types reported to observers.

use serde::{Deserialize, Serialize};

/// Point-in-time statistics for one buffer pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Size class in bytes.
    pub buffer_size: usize,

    /// Buffers currently held by the pool.
    pub pooled: usize,

    /// Rentals served from the pool.
    pub hits: u64,

    /// Rentals that had to allocate.
    pub misses: u64,

    /// Returned buffers that were dropped (wrong size or pool full).
    pub rejected_returns: u64,
}

/// Immutable snapshot of the coordinator state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorStats {
    /// Audio packets sent since the last reset.
    pub audio_packets_sent: u64,

    /// Audio packets received since the last reset.
    pub audio_packets_received: u64,

    /// Video frames sent since the last reset.
    pub video_frames_sent: u64,

    /// Video frames dropped since the last reset.
    pub video_frames_dropped: u64,

    /// Completed memory reclamation cycles since the last reset.
    pub reclamation_cycles: u64,

    /// Last sampled process memory in megabytes.
    pub current_memory_mb: u64,

    /// Highest sampled process memory since the last reset.
    pub peak_memory_mb: u64,

    /// Latency moving average in milliseconds.
    pub network_latency_ms: i32,

    /// Whether the network is considered congested.
    pub network_congested: bool,

    /// Frame-drop ratio as an integer percentage, computed by the network
    /// loop. This is a proxy, not transport-layer packet loss.
    pub frame_loss_percent: i32,

    /// Frame-drop ratio computed at snapshot time.
    pub video_drop_rate_percent: f64,

    /// Send rate observed over the recent frame timestamp ring.
    pub video_send_fps: f32,

    /// Whether voice is currently considered active.
    pub voice_active: bool,

    /// Seconds since the coordinator started.
    pub uptime_seconds: u64,

    /// Small (audio) pool statistics.
    pub small_pool: PoolStats,

    /// Large (video) pool statistics.
    pub large_pool: PoolStats,
}

impl CoordinatorStats {
    /// Total video frames seen (sent and dropped).
    pub fn video_frames_total(&self) -> u64 {
        self.video_frames_sent + self.video_frames_dropped
    }
}
