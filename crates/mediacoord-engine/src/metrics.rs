//! Monotonic event counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counts producer events and reclamation cycles.
///
/// Counters only grow between calls to [`MetricsCollector::reset`].
pub struct MetricsCollector {
    start_time: Instant,
    audio_packets_sent: AtomicU64,
    audio_packets_received: AtomicU64,
    video_frames_sent: AtomicU64,
    video_frames_dropped: AtomicU64,
    reclamation_cycles: AtomicU64,
}

impl MetricsCollector {
    /// Create a collector with every counter at zero.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            audio_packets_sent: AtomicU64::new(0),
            audio_packets_received: AtomicU64::new(0),
            video_frames_sent: AtomicU64::new(0),
            video_frames_dropped: AtomicU64::new(0),
            reclamation_cycles: AtomicU64::new(0),
        }
    }

    /// Count one transmitted audio packet.
    pub fn record_audio_sent(&self) {
        self.audio_packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one received audio packet.
    pub fn record_audio_received(&self) {
        self.audio_packets_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one transmitted video frame.
    pub fn record_video_sent(&self) {
        self.video_frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one skipped video frame.
    pub fn record_video_dropped(&self) {
        self.video_frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Add cycles reported by the reclaimer.
    pub fn add_reclamation_cycles(&self, cycles: u64) {
        self.reclamation_cycles.fetch_add(cycles, Ordering::Relaxed);
    }

    /// Audio packets sent since the last reset.
    pub fn audio_packets_sent(&self) -> u64 {
        self.audio_packets_sent.load(Ordering::Relaxed)
    }

    /// Audio packets received since the last reset.
    pub fn audio_packets_received(&self) -> u64 {
        self.audio_packets_received.load(Ordering::Relaxed)
    }

    /// Video frames sent since the last reset.
    pub fn video_frames_sent(&self) -> u64 {
        self.video_frames_sent.load(Ordering::Relaxed)
    }

    /// Video frames dropped since the last reset.
    pub fn video_frames_dropped(&self) -> u64 {
        self.video_frames_dropped.load(Ordering::Relaxed)
    }

    /// Reclamation cycles since the last reset.
    pub fn reclamation_cycles(&self) -> u64 {
        self.reclamation_cycles.load(Ordering::Relaxed)
    }

    /// Integer percentage of video frames dropped, truncated.
    pub fn frame_loss_percent(&self) -> i32 {
        let sent = self.video_frames_sent();
        let dropped = self.video_frames_dropped();
        let total = sent + dropped;
        if total == 0 {
            0
        } else {
            (dropped * 100 / total) as i32
        }
    }

    /// Fractional percentage of video frames dropped.
    pub fn video_drop_rate_percent(&self) -> f64 {
        let sent = self.video_frames_sent();
        let dropped = self.video_frames_dropped();
        let total = sent + dropped;
        if total == 0 {
            0.0
        } else {
            dropped as f64 * 100.0 / total as f64
        }
    }

    /// Whole seconds since the collector was created.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Zero every counter. Uptime is not affected.
    pub fn reset(&self) {
        self.audio_packets_sent.store(0, Ordering::Relaxed);
        self.audio_packets_received.store(0, Ordering::Relaxed);
        self.video_frames_sent.store(0, Ordering::Relaxed);
        self.video_frames_dropped.store(0, Ordering::Relaxed);
        self.reclamation_cycles.store(0, Ordering::Relaxed);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn frame_loss_is_truncated_percentage() {
        let metrics = MetricsCollector::new();
        for _ in 0..97 {
            metrics.record_video_sent();
        }
        for _ in 0..3 {
            metrics.record_video_dropped();
        }
        assert_eq!(metrics.frame_loss_percent(), 3);
        assert!((metrics.video_drop_rate_percent() - 3.0).abs() < f64::EPSILON);

        metrics.record_video_sent();
        // 3 / 101 = 2.97%
        assert_eq!(metrics.frame_loss_percent(), 2);
    }

    #[test]
    fn no_frames_means_no_loss() {
        let metrics = MetricsCollector::new();
        assert_eq!(metrics.frame_loss_percent(), 0);
        assert_eq!(metrics.video_drop_rate_percent(), 0.0);
    }

    #[test]
    fn reset_zeroes_counters() {
        let metrics = MetricsCollector::new();
        metrics.record_audio_sent();
        metrics.record_audio_received();
        metrics.add_reclamation_cycles(4);
        metrics.reset();

        assert_eq!(metrics.audio_packets_sent(), 0);
        assert_eq!(metrics.audio_packets_received(), 0);
        assert_eq!(metrics.reclamation_cycles(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Concurrent writers never make a counter go backwards.
        #[test]
        fn counters_never_decrease(threads in 2usize..6, per_thread in 10u64..500) {
            let metrics = Arc::new(MetricsCollector::new());
            let writers: Vec<_> = (0..threads)
                .map(|_| {
                    let metrics = Arc::clone(&metrics);
                    thread::spawn(move || {
                        for _ in 0..per_thread {
                            metrics.record_audio_sent();
                            metrics.record_video_dropped();
                        }
                    })
                })
                .collect();

            let mut last_sent = 0;
            let mut last_dropped = 0;
            while writers.iter().any(|w| !w.is_finished()) {
                let sent = metrics.audio_packets_sent();
                let dropped = metrics.video_frames_dropped();
                prop_assert!(sent >= last_sent);
                prop_assert!(dropped >= last_dropped);
                last_sent = sent;
                last_dropped = dropped;
            }
            for writer in writers {
                writer.join().unwrap();
            }

            let expected = threads as u64 * per_thread;
            prop_assert_eq!(metrics.audio_packets_sent(), expected);
            prop_assert_eq!(metrics.video_frames_dropped(), expected);
        }
    }
}
