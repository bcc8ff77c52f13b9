//! Video adaptation decisions.
//!
//! Everything here is a pure function of an [`AdaptationInputs`] snapshot,
//! so producers can call it right before acting without blocking and tests
//! can exercise it without real time passing.
//!
//! Frame skipping checks voice before congestion, while the frame rate
//! recommendation checks congestion before voice.

use std::time::Duration;

use mediacoord_ipc::CoordinatorConfig;

/// The state an adaptation decision is based on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdaptationInputs {
    /// Cached voice flag.
    pub voice_active: bool,

    /// Time since the last audio event, if there was one.
    pub since_voice_activity: Option<Duration>,

    /// Congestion verdict from the network loop.
    pub congested: bool,

    /// Latency moving average from the network loop.
    pub latency_ms: i32,
}

impl AdaptationInputs {
    /// Voice is active and the last audio event is younger than `window`.
    fn voice_within(&self, window: Duration) -> bool {
        self.voice_active
            && self
                .since_voice_activity
                .is_some_and(|elapsed| elapsed < window)
    }
}

/// Thresholds and floors used by the adaptation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptationPolicy {
    pub yield_recent_window: Duration,
    pub yield_delay_recent: Duration,
    pub yield_delay: Duration,
    pub skip_recent_window: Duration,
    pub elevated_latency_ms: i32,
    pub congested_bitrate_floor_kbps: u32,
    pub elevated_bitrate_floor_kbps: u32,
    pub congested_fps_floor: u32,
    pub voice_fps_floor: u32,
}

impl AdaptationPolicy {
    pub fn from_config(config: &CoordinatorConfig) -> Self {
        Self {
            yield_recent_window: Duration::from_millis(config.yield_recent_window_ms),
            yield_delay_recent: Duration::from_millis(config.yield_delay_recent_ms),
            yield_delay: Duration::from_millis(config.yield_delay_ms),
            skip_recent_window: Duration::from_millis(config.skip_recent_window_ms),
            elevated_latency_ms: config.elevated_latency_ms.min(i32::MAX as u32) as i32,
            congested_bitrate_floor_kbps: config.congested_bitrate_floor_kbps,
            elevated_bitrate_floor_kbps: config.elevated_bitrate_floor_kbps,
            congested_fps_floor: config.congested_fps_floor,
            voice_fps_floor: config.voice_fps_floor,
        }
    }

    /// How long a video frame should wait so concurrent audio goes first.
    pub fn video_yield_delay(&self, inputs: &AdaptationInputs) -> Duration {
        if !inputs.voice_active {
            Duration::ZERO
        } else if inputs.voice_within(self.yield_recent_window) {
            self.yield_delay_recent
        } else {
            self.yield_delay
        }
    }

    /// Whether the frame at `frame_index` should be dropped.
    pub fn should_skip_video_frame(&self, inputs: &AdaptationInputs, frame_index: u64) -> bool {
        if inputs.voice_within(self.skip_recent_window) {
            frame_index % 2 == 0
        } else if inputs.congested {
            frame_index % 3 == 0
        } else {
            false
        }
    }

    /// Encoder bitrate for a given baseline.
    pub fn recommended_bitrate_kbps(&self, inputs: &AdaptationInputs, baseline_kbps: u32) -> u32 {
        if inputs.congested {
            (baseline_kbps / 2).max(self.congested_bitrate_floor_kbps)
        } else if inputs.latency_ms > self.elevated_latency_ms {
            scale_three_quarters(baseline_kbps).max(self.elevated_bitrate_floor_kbps)
        } else {
            baseline_kbps
        }
    }

    /// Encoder frame rate for a given target.
    pub fn recommended_fps(&self, inputs: &AdaptationInputs, target_fps: u32) -> u32 {
        if inputs.congested {
            (target_fps / 2).max(self.congested_fps_floor)
        } else if inputs.voice_active {
            scale_three_quarters(target_fps).max(self.voice_fps_floor)
        } else {
            target_fps
        }
    }
}

impl Default for AdaptationPolicy {
    fn default() -> Self {
        Self::from_config(&CoordinatorConfig::default())
    }
}

fn scale_three_quarters(value: u32) -> u32 {
    (u64::from(value) * 3 / 4) as u32
}
