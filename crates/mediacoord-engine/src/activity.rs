//! Hot-path activity tracking for audio and video producers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

// Voice state packs into one word: three flag bits over a microsecond stamp.
const VOICE_ACTIVE: u64 = 1 << 63;
const SENDING_AUDIO: u64 = 1 << 62;
const RECEIVING_AUDIO: u64 = 1 << 61;
const STAMP_MASK: u64 = RECEIVING_AUDIO - 1;

/// Stamp value for "no voice activity recorded yet".
const NEVER: u64 = STAMP_MASK;

/// Which side of the call produced an audio event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioDirection {
    Send,
    Receive,
}

impl AudioDirection {
    fn flag(self) -> u64 {
        match self {
            Self::Send => SENDING_AUDIO,
            Self::Receive => RECEIVING_AUDIO,
        }
    }
}

/// Tracks voice activity and the short sample windows fed by producers.
///
/// The voice flags and the last-activity stamp live in a single atomic word
/// (`voice`), so an audio event and a timeout expiry can never interleave
/// into a state where voice is off right after a packet. Stamps are
/// microseconds since `epoch`; writes use `AcqRel` and reads `Acquire`, so a
/// query on another thread that runs after a signal sees the new stamp.
///
/// Sent-frame stamps go into a fixed ring of atomics indexed by a running
/// counter. Neither the audio nor the video signal path takes a lock.
pub struct ActivityTracker {
    epoch: Instant,
    voice: AtomicU64,
    latency_samples: Mutex<VecDeque<u32>>,
    latency_capacity: usize,
    frame_stamps: Box<[AtomicU64]>,
    frames_recorded: AtomicU64,
}

impl ActivityTracker {
    /// Create a tracker with the given latency window and frame ring sizes.
    pub fn new(latency_capacity: usize, frame_capacity: usize) -> Self {
        Self {
            epoch: Instant::now(),
            voice: AtomicU64::new(NEVER),
            latency_samples: Mutex::new(VecDeque::with_capacity(latency_capacity)),
            latency_capacity,
            frame_stamps: (0..frame_capacity.max(1)).map(|_| AtomicU64::new(0)).collect(),
            frames_recorded: AtomicU64::new(0),
        }
    }

    /// Record an audio packet. Returns true if voice just became active.
    pub fn record_audio(&self, direction: AudioDirection) -> bool {
        let stamp = self.micros_since_epoch();
        let flag = direction.flag();
        let previous = self
            .voice
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                Some((word & (SENDING_AUDIO | RECEIVING_AUDIO)) | flag | VOICE_ACTIVE | stamp)
            })
            .unwrap_or_else(|word| word);

        previous & VOICE_ACTIVE == 0
    }

    /// Time since the most recent audio event, if any.
    pub fn since_voice_activity(&self) -> Option<Duration> {
        let stamp = self.voice.load(Ordering::Acquire) & STAMP_MASK;
        if stamp == NEVER {
            return None;
        }
        let now = self.micros_since_epoch();
        Some(Duration::from_micros(now.saturating_sub(stamp)))
    }

    /// Cached voice flag.
    pub fn is_voice_active(&self) -> bool {
        self.voice.load(Ordering::Acquire) & VOICE_ACTIVE != 0
    }

    /// An outgoing packet was seen since voice last went quiet.
    pub fn is_sending_audio(&self) -> bool {
        self.voice.load(Ordering::Acquire) & SENDING_AUDIO != 0
    }

    /// An incoming packet was seen since voice last went quiet.
    pub fn is_receiving_audio(&self) -> bool {
        self.voice.load(Ordering::Acquire) & RECEIVING_AUDIO != 0
    }

    /// Flip voice to inactive if nothing was heard for longer than
    /// `timeout`. Returns true if this call performed the transition.
    pub fn expire_voice(&self, timeout: Duration) -> bool {
        self.expire_voice_then(timeout, || {})
    }

    /// Expiry with a step run between the timeout check and the commit.
    ///
    /// The commit only succeeds against the exact word the timeout was
    /// judged on; any audio event in between makes it fail.
    fn expire_voice_then(&self, timeout: Duration, before_commit: impl FnOnce()) -> bool {
        let word = self.voice.load(Ordering::Acquire);
        if word & VOICE_ACTIVE == 0 {
            return false;
        }
        let stamp = word & STAMP_MASK;
        let elapsed = Duration::from_micros(self.micros_since_epoch().saturating_sub(stamp));
        if elapsed <= timeout {
            return false;
        }

        before_commit();

        self.voice
            .compare_exchange(word, stamp, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Append a round-trip sample, evicting the oldest when full.
    pub fn record_latency(&self, latency_ms: u32) {
        let mut samples = self.latency_samples.lock();
        if samples.len() == self.latency_capacity {
            samples.pop_front();
        }
        samples.push_back(latency_ms);
    }

    /// Arithmetic mean of the latency window, truncated.
    pub fn latency_average(&self) -> Option<i32> {
        let samples = self.latency_samples.lock();
        if samples.is_empty() {
            return None;
        }
        let sum: u64 = samples.iter().map(|&s| u64::from(s)).sum();
        Some((sum / samples.len() as u64).min(i32::MAX as u64) as i32)
    }

    #[cfg(test)]
    pub fn latency_sample_count(&self) -> usize {
        self.latency_samples.lock().len()
    }

    /// Stamp a sent video frame into the throughput ring.
    pub fn record_frame_sent(&self) {
        // Zero marks an empty slot, so stamps are offset by one.
        let stamp = self.micros_since_epoch() + 1;
        let index = self.frames_recorded.fetch_add(1, Ordering::AcqRel);
        let slot = (index % self.frame_stamps.len() as u64) as usize;
        self.frame_stamps[slot].store(stamp, Ordering::Release);
    }

    #[cfg(test)]
    pub fn frame_timestamp_count(&self) -> usize {
        self.frame_stamps
            .iter()
            .filter(|slot| slot.load(Ordering::Acquire) != 0)
            .count()
    }

    /// Frames per second across the timestamp ring.
    ///
    /// Reads the ring without coordinating with writers, so a frame being
    /// recorded concurrently may or may not be counted.
    pub fn video_send_fps(&self) -> f32 {
        let mut filled = 0u32;
        let mut oldest = u64::MAX;
        let mut newest = 0u64;
        for slot in self.frame_stamps.iter() {
            let stamp = slot.load(Ordering::Acquire);
            if stamp != 0 {
                filled += 1;
                oldest = oldest.min(stamp);
                newest = newest.max(stamp);
            }
        }

        if filled < 2 || newest <= oldest {
            return 0.0;
        }
        let span = Duration::from_micros(newest - oldest).as_secs_f32();
        (filled - 1) as f32 / span
    }

    fn micros_since_epoch(&self) -> u64 {
        (self.epoch.elapsed().as_micros() as u64).min(NEVER - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn first_audio_event_activates_voice() {
        let tracker = ActivityTracker::new(30, 100);
        assert!(!tracker.is_voice_active());
        assert!(tracker.since_voice_activity().is_none());

        assert!(tracker.record_audio(AudioDirection::Send));
        assert!(!tracker.record_audio(AudioDirection::Receive));

        assert!(tracker.is_voice_active());
        assert!(tracker.is_sending_audio());
        assert!(tracker.is_receiving_audio());
        assert!(tracker.since_voice_activity().unwrap() < Duration::from_millis(50));
    }

    #[test]
    fn voice_does_not_expire_inside_timeout() {
        let tracker = ActivityTracker::new(30, 100);
        tracker.record_audio(AudioDirection::Send);

        assert!(!tracker.expire_voice(Duration::from_millis(300)));
        assert!(tracker.is_voice_active());
    }

    #[test]
    fn voice_expires_after_timeout_and_clears_flags() {
        let tracker = ActivityTracker::new(30, 100);
        tracker.record_audio(AudioDirection::Receive);
        thread::sleep(Duration::from_millis(30));

        assert!(tracker.expire_voice(Duration::from_millis(10)));
        assert!(!tracker.is_voice_active());
        assert!(!tracker.is_receiving_audio());
        assert!(!tracker.expire_voice(Duration::from_millis(10)));

        // The next packet re-activates voice.
        assert!(tracker.record_audio(AudioDirection::Send));
    }

    #[test]
    fn audio_between_timeout_check_and_commit_keeps_voice_active() {
        let tracker = ActivityTracker::new(30, 100);
        tracker.record_audio(AudioDirection::Receive);
        thread::sleep(Duration::from_millis(30));

        let expired = tracker.expire_voice_then(Duration::from_millis(10), || {
            assert!(!tracker.record_audio(AudioDirection::Send));
        });

        assert!(!expired);
        assert!(tracker.is_voice_active());
        assert!(tracker.is_sending_audio());
        assert!(tracker.since_voice_activity().unwrap() < Duration::from_millis(10));
    }

    #[test]
    fn latency_window_evicts_oldest() {
        let tracker = ActivityTracker::new(3, 100);
        assert_eq!(tracker.latency_average(), None);

        for sample in [1000, 10, 20, 30] {
            tracker.record_latency(sample);
        }

        assert_eq!(tracker.latency_sample_count(), 3);
        assert_eq!(tracker.latency_average(), Some(20));
    }

    #[test]
    fn latency_average_truncates() {
        let tracker = ActivityTracker::new(30, 100);
        for sample in [20, 30, 250, 261] {
            tracker.record_latency(sample);
        }
        assert_eq!(tracker.latency_average(), Some(140));
    }

    #[test]
    fn frame_ring_is_bounded() {
        let tracker = ActivityTracker::new(30, 100);
        for _ in 0..150 {
            tracker.record_frame_sent();
        }
        assert_eq!(tracker.frame_timestamp_count(), 100);
    }

    #[test]
    fn send_fps_needs_two_frames() {
        let tracker = ActivityTracker::new(30, 100);
        assert_eq!(tracker.video_send_fps(), 0.0);
        tracker.record_frame_sent();
        assert_eq!(tracker.video_send_fps(), 0.0);

        thread::sleep(Duration::from_millis(20));
        tracker.record_frame_sent();
        let fps = tracker.video_send_fps();
        assert!(fps > 0.0 && fps <= 50.0, "fps was {fps}");
    }

    #[test]
    fn send_fps_does_not_stall_frame_writer() {
        let tracker = Arc::new(ActivityTracker::new(30, 100));
        let done = Arc::new(AtomicBool::new(false));

        let reader = {
            let tracker = Arc::clone(&tracker);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    tracker.video_send_fps();
                }
            })
        };

        let mut slowest = Duration::ZERO;
        for _ in 0..1000 {
            let started = Instant::now();
            tracker.record_frame_sent();
            slowest = slowest.max(started.elapsed());
        }
        done.store(true, Ordering::Release);
        reader.join().unwrap();

        assert!(slowest < Duration::from_millis(50), "slowest write took {slowest:?}");
        assert_eq!(tracker.frame_timestamp_count(), 100);
    }
}
