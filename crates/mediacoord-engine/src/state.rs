//! Resource state written by the monitor loops.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};

/// Memory and network readings shared between the monitors and producers.
///
/// Each field has a single writer (its monitor loop) and any number of
/// readers; readers may see a value up to one polling interval old.
#[derive(Default)]
pub struct ResourceState {
    current_memory_mb: AtomicU64,
    peak_memory_mb: AtomicU64,
    network_latency_ms: AtomicI32,
    network_congested: AtomicBool,
    frame_loss_percent: AtomicI32,
}

impl ResourceState {
    /// Create with zeroed readings and no congestion.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a memory sample and raise the peak if needed.
    pub fn record_memory_sample(&self, mb: u64) {
        self.current_memory_mb.store(mb, Ordering::Relaxed);

        let mut peak = self.peak_memory_mb.load(Ordering::Relaxed);
        while mb > peak {
            match self.peak_memory_mb.compare_exchange_weak(
                peak,
                mb,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => peak = actual,
            }
        }
    }

    /// Most recent memory sample.
    pub fn current_memory_mb(&self) -> u64 {
        self.current_memory_mb.load(Ordering::Relaxed)
    }

    /// Highest sample in the current peak epoch.
    pub fn peak_memory_mb(&self) -> u64 {
        self.peak_memory_mb.load(Ordering::Relaxed)
    }

    /// Start a new peak epoch at the current sample.
    pub fn reset_peak(&self) {
        self.peak_memory_mb
            .store(self.current_memory_mb(), Ordering::Relaxed);
    }

    /// Store the rolling latency average.
    pub fn set_network_latency_ms(&self, latency_ms: i32) {
        self.network_latency_ms.store(latency_ms, Ordering::Relaxed);
    }

    /// Rolling latency average, in milliseconds.
    pub fn network_latency_ms(&self) -> i32 {
        self.network_latency_ms.load(Ordering::Relaxed)
    }

    /// Store the congestion verdict, returning the previous one.
    pub fn set_congested(&self, congested: bool) -> bool {
        self.network_congested.swap(congested, Ordering::AcqRel)
    }

    /// Last congestion verdict.
    pub fn is_congested(&self) -> bool {
        self.network_congested.load(Ordering::Acquire)
    }

    /// Store the frame-drop percentage.
    pub fn set_frame_loss_percent(&self, percent: i32) {
        self.frame_loss_percent.store(percent, Ordering::Relaxed);
    }

    /// Frame-drop ratio percentage. Not transport-layer packet loss.
    pub fn frame_loss_percent(&self) -> i32 {
        self.frame_loss_percent.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn peak_tracks_highest_sample() {
        let state = ResourceState::new();
        for mb in [350, 420, 380] {
            state.record_memory_sample(mb);
        }
        assert_eq!(state.current_memory_mb(), 380);
        assert_eq!(state.peak_memory_mb(), 420);

        state.reset_peak();
        assert_eq!(state.peak_memory_mb(), 380);
    }

    #[test]
    fn peak_is_monotonic_under_concurrent_samples() {
        let state = Arc::new(ResourceState::new());
        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    for i in 0..1000u64 {
                        state.record_memory_sample(t * 1000 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(state.peak_memory_mb(), 3999);
    }

    #[test]
    fn congestion_swap_reports_previous() {
        let state = ResourceState::new();
        assert!(!state.set_congested(true));
        assert!(state.set_congested(true));
        assert!(state.is_congested());
    }
}
