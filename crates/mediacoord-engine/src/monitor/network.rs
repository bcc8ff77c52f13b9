//! Network monitor: latency average, congestion verdict and voice expiry.

use std::sync::Arc;

use tracing::{debug, info, instrument, trace};

use mediacoord_ipc::CoordinatorEvent;

use crate::context::CoordinatorContext;
use crate::CoordinatorResult;

/// Turns the latency window into a congestion verdict each tick.
pub struct NetworkMonitor {
    context: Arc<CoordinatorContext>,
}

impl NetworkMonitor {
    /// Create a monitor over the shared context.
    pub fn new(context: Arc<CoordinatorContext>) -> Self {
        Self { context }
    }

    /// Recompute network state and expire stale voice activity.
    #[instrument(name = "network_tick", skip(self), level = "trace")]
    pub fn tick(&mut self) -> CoordinatorResult<()> {
        let config = self.context.config();
        let resources = self.context.resources();

        // With no samples the previous average and verdict stand.
        if let Some(latency_ms) = self.context.activity().latency_average() {
            resources.set_network_latency_ms(latency_ms);

            let was_congested = resources.is_congested();
            let threshold = if was_congested {
                config
                    .congestion_exit_threshold_ms
                    .unwrap_or(config.congestion_threshold_ms)
            } else {
                config.congestion_threshold_ms
            };
            let congested = i64::from(latency_ms) > i64::from(threshold);

            if resources.set_congested(congested) != congested {
                info!(latency_ms, congested, "Network congestion changed");
                self.context
                    .events()
                    .publish(CoordinatorEvent::NetworkCongestionChanged(congested));
            }
        }

        let frame_loss = self.context.metrics().frame_loss_percent();
        resources.set_frame_loss_percent(frame_loss);

        if self.context.activity().expire_voice(config.voice_timeout()) {
            debug!("Voice became inactive");
            self.context
                .events()
                .publish(CoordinatorEvent::VoiceActivityChanged(false));
        }

        trace!(
            latency_ms = resources.network_latency_ms(),
            frame_loss,
            "Network sample"
        );
        Ok(())
    }
}
