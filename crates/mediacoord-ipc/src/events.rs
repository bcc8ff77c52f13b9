//! Events sent from the coordinator to subscribers.

use serde::{Deserialize, Serialize};

/// Notifications raised by the coordinator.
///
/// Delivery is best effort: a subscriber whose channel is full misses the
/// event rather than stalling the thread that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinatorEvent {
    /// Voice started (`true`) or timed out (`false`).
    VoiceActivityChanged(bool),

    /// The latency moving average crossed the congestion threshold.
    NetworkCongestionChanged(bool),

    /// Process memory rose above the warning threshold.
    MemoryWarning {
        /// Sampled process memory in megabytes.
        current_mb: u64,
    },
}

impl CoordinatorEvent {
    /// Returns a short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::VoiceActivityChanged(_) => "VoiceActivityChanged",
            Self::NetworkCongestionChanged(_) => "NetworkCongestionChanged",
            Self::MemoryWarning { .. } => "MemoryWarning",
        }
    }
}
