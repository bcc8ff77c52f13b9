//! The shared coordinator context handed to producers.

use std::time::Duration;

use bytes::BytesMut;
use crossbeam_channel::Receiver;
use tracing::{debug, trace};

use mediacoord_ipc::{CoordinatorConfig, CoordinatorEvent, CoordinatorStats};

use crate::activity::{ActivityTracker, AudioDirection};
use crate::adaptation::{AdaptationInputs, AdaptationPolicy};
use crate::events::EventBus;
use crate::metrics::MetricsCollector;
use crate::pool::BufferPool;
use crate::state::ResourceState;
use crate::CoordinatorResult;

/// State shared by producers, monitor loops and observers.
///
/// Created once by the composition root and shared behind an `Arc`. Every
/// method here is safe to call from audio and video threads: none of them
/// block on the monitor loops.
pub struct CoordinatorContext {
    config: CoordinatorConfig,
    policy: AdaptationPolicy,
    activity: ActivityTracker,
    resources: ResourceState,
    metrics: MetricsCollector,
    small_pool: BufferPool,
    large_pool: BufferPool,
    events: EventBus,
}

impl CoordinatorContext {
    /// Validate `config` and build an idle context.
    pub fn new(config: CoordinatorConfig) -> CoordinatorResult<Self> {
        config.validate()?;

        Ok(Self {
            policy: AdaptationPolicy::from_config(&config),
            activity: ActivityTracker::new(config.latency_window, config.frame_timestamp_capacity),
            resources: ResourceState::new(),
            metrics: MetricsCollector::new(),
            small_pool: BufferPool::new("small", config.small_buffer_size, config.pool_capacity, true),
            large_pool: BufferPool::new(
                "large",
                config.large_buffer_size,
                config.pool_capacity,
                false,
            ),
            events: EventBus::new(),
            config,
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // ----- activity -------------------------------------------------------

    /// Called once per transmitted audio packet.
    pub fn signal_audio_send(&self) {
        self.metrics.record_audio_sent();
        self.record_audio(AudioDirection::Send);
    }

    /// Called once per received audio packet.
    pub fn signal_audio_receive(&self) {
        self.metrics.record_audio_received();
        self.record_audio(AudioDirection::Receive);
    }

    fn record_audio(&self, direction: AudioDirection) {
        if self.activity.record_audio(direction) {
            trace!(?direction, "Voice became active");
            self.events.publish(CoordinatorEvent::VoiceActivityChanged(true));
        }
    }

    /// Called after a video frame was sent successfully.
    pub fn signal_video_frame_sent(&self) {
        self.metrics.record_video_sent();
        self.activity.record_frame_sent();
    }

    /// Called when a video frame is discarded.
    pub fn signal_video_frame_dropped(&self) {
        self.metrics.record_video_dropped();
    }

    /// Called after each round-trip measurement.
    pub fn record_latency(&self, latency_ms: u32) {
        trace!(latency_ms, "Latency sample");
        self.activity.record_latency(latency_ms);
    }

    pub fn is_voice_active(&self) -> bool {
        self.activity.is_voice_active()
    }

    pub fn is_sending_audio(&self) -> bool {
        self.activity.is_sending_audio()
    }

    pub fn is_receiving_audio(&self) -> bool {
        self.activity.is_receiving_audio()
    }

    pub fn is_network_congested(&self) -> bool {
        self.resources.is_congested()
    }

    pub fn network_latency_ms(&self) -> i32 {
        self.resources.network_latency_ms()
    }

    // ----- adaptation -----------------------------------------------------

    /// Snapshot of everything the adaptation functions look at.
    pub fn adaptation_inputs(&self) -> AdaptationInputs {
        AdaptationInputs {
            voice_active: self.activity.is_voice_active(),
            since_voice_activity: self.activity.since_voice_activity(),
            congested: self.resources.is_congested(),
            latency_ms: self.resources.network_latency_ms(),
        }
    }

    /// How long the video pipeline should sleep before sending a frame.
    pub fn video_yield_delay(&self) -> Duration {
        self.policy.video_yield_delay(&self.adaptation_inputs())
    }

    /// Whether the video pipeline should drop frame `frame_index`.
    pub fn should_skip_video_frame(&self, frame_index: u64) -> bool {
        self.policy
            .should_skip_video_frame(&self.adaptation_inputs(), frame_index)
    }

    /// Target encoder bitrate for `baseline_kbps`.
    pub fn recommended_bitrate_kbps(&self, baseline_kbps: u32) -> u32 {
        self.policy
            .recommended_bitrate_kbps(&self.adaptation_inputs(), baseline_kbps)
    }

    /// Target encoder frame rate for `target_fps`.
    pub fn recommended_fps(&self, target_fps: u32) -> u32 {
        self.policy
            .recommended_fps(&self.adaptation_inputs(), target_fps)
    }

    // ----- buffer pools ---------------------------------------------------

    /// Borrow an audio-sized buffer.
    pub fn rent_small_buffer(&self) -> BytesMut {
        self.small_pool.rent()
    }

    /// Return an audio-sized buffer. It is zeroed before reuse.
    pub fn return_small_buffer(&self, buffer: BytesMut) -> bool {
        self.small_pool.give_back(buffer)
    }

    /// Borrow a video-frame-sized buffer.
    pub fn rent_large_buffer(&self) -> BytesMut {
        self.large_pool.rent()
    }

    /// Return a video-frame-sized buffer. Contents are not cleared.
    pub fn return_large_buffer(&self, buffer: BytesMut) -> bool {
        self.large_pool.give_back(buffer)
    }

    pub fn small_pool(&self) -> &BufferPool {
        &self.small_pool
    }

    pub fn large_pool(&self) -> &BufferPool {
        &self.large_pool
    }

    /// Trim both pools to their configured floors.
    pub fn shrink_pools(&self) -> (usize, usize) {
        (
            self.small_pool.shrink_to(self.config.small_pool_floor),
            self.large_pool.shrink_to(self.config.large_pool_floor),
        )
    }

    /// Empty both pools.
    pub fn release_pools(&self) {
        let small = self.small_pool.clear();
        let large = self.large_pool.clear();
        debug!(small, large, "Released pooled buffers");
    }

    // ----- observability --------------------------------------------------

    /// Subscribe to voice, congestion and memory notifications.
    pub fn subscribe(&self) -> Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    /// Subscribers still holding their receiver.
    pub fn subscriber_count(&self) -> usize {
        self.events.subscriber_count()
    }

    /// Point-in-time snapshot of counters and readings.
    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            audio_packets_sent: self.metrics.audio_packets_sent(),
            audio_packets_received: self.metrics.audio_packets_received(),
            video_frames_sent: self.metrics.video_frames_sent(),
            video_frames_dropped: self.metrics.video_frames_dropped(),
            reclamation_cycles: self.metrics.reclamation_cycles(),
            current_memory_mb: self.resources.current_memory_mb(),
            peak_memory_mb: self.resources.peak_memory_mb(),
            network_latency_ms: self.resources.network_latency_ms(),
            network_congested: self.resources.is_congested(),
            frame_loss_percent: self.resources.frame_loss_percent(),
            video_drop_rate_percent: self.metrics.video_drop_rate_percent(),
            video_send_fps: self.activity.video_send_fps(),
            voice_active: self.activity.is_voice_active(),
            uptime_seconds: self.metrics.uptime_seconds(),
            small_pool: self.small_pool.stats(),
            large_pool: self.large_pool.stats(),
        }
    }

    /// Zero the counters and start a new peak-memory epoch.
    pub fn reset_stats(&self) {
        self.metrics.reset();
        self.resources.reset_peak();
        self.small_pool.reset_stats();
        self.large_pool.reset_stats();
        debug!("Statistics reset");
    }

    pub(crate) fn activity(&self) -> &ActivityTracker {
        &self.activity
    }

    pub(crate) fn resources(&self) -> &ResourceState {
        &self.resources
    }

    pub(crate) fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.events
    }
}
