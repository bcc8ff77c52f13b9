//! Memory monitor: samples process memory and reclaims proactively.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{debug, info, instrument, trace, warn};

use mediacoord_ipc::CoordinatorEvent;

use crate::context::CoordinatorContext;
use crate::{CoordinatorError, CoordinatorResult};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Source of process memory readings.
pub trait MemorySampler: Send {
    /// Current memory usage in megabytes.
    fn sample_mb(&mut self) -> CoordinatorResult<u64>;
}

/// Samples the resident set size of the current process.
pub struct ProcessMemorySampler {
    system: System,
    pid: Pid,
}

impl ProcessMemorySampler {
    pub fn new() -> CoordinatorResult<Self> {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| CoordinatorError::SampleUnavailable(e.to_string()))?;
        Ok(Self {
            system: System::new(),
            pid,
        })
    }
}

impl MemorySampler for ProcessMemorySampler {
    fn sample_mb(&mut self) -> CoordinatorResult<u64> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );

        self.system
            .process(self.pid)
            .map(|process| process.memory() / BYTES_PER_MB)
            .ok_or_else(|| {
                CoordinatorError::SampleUnavailable(format!("process {} not found", self.pid))
            })
    }
}

/// Kind of reclamation pass to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimMode {
    /// Cheap pass over short-lived allocations.
    Young,

    /// One-off pass that also compacts large allocations.
    Compacting,
}

/// The host's memory reclaimer.
///
/// The coordinator only asks; the reclaimer decides what a pass means for
/// its allocator and reports how many passes have completed.
pub trait Reclaimer: Send + Sync {
    /// Total completed passes since the reclaimer was created.
    fn completed_cycles(&self) -> u64;

    /// Ask for a pass. Must not block.
    fn request(&self, mode: ReclaimMode);
}

/// Default reclaimer: treats each request as a completed pass.
///
/// The actual memory release happens in the coordinator's pool shrink,
/// so this only keeps the cycle counters meaningful.
#[derive(Debug, Default)]
pub struct CountingReclaimer {
    cycles: AtomicU64,
    compactions: AtomicU64,
}

impl CountingReclaimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compactions(&self) -> u64 {
        self.compactions.load(Ordering::Relaxed)
    }
}

impl Reclaimer for CountingReclaimer {
    fn completed_cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    fn request(&self, mode: ReclaimMode) {
        if mode == ReclaimMode::Compacting {
            self.compactions.fetch_add(1, Ordering::Relaxed);
        }
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }
}

/// State carried between memory loop ticks.
pub struct MemoryMonitor {
    context: Arc<CoordinatorContext>,
    sampler: Box<dyn MemorySampler>,
    reclaimer: Arc<dyn Reclaimer>,
    last_cycles: u64,
    warning_raised: bool,
    above_warning_since: Option<Instant>,
    compaction_pending: bool,
    compaction_requested: bool,
}

impl MemoryMonitor {
    pub fn new(
        context: Arc<CoordinatorContext>,
        sampler: Box<dyn MemorySampler>,
        reclaimer: Arc<dyn Reclaimer>,
    ) -> Self {
        let last_cycles = reclaimer.completed_cycles();
        Self {
            context,
            sampler,
            reclaimer,
            last_cycles,
            warning_raised: false,
            above_warning_since: None,
            compaction_pending: false,
            compaction_requested: false,
        }
    }

    /// Take one sample and act on it.
    pub fn tick(&mut self) -> CoordinatorResult<()> {
        self.tick_at(Instant::now())
    }

    #[instrument(name = "memory_tick", skip(self), level = "trace")]
    fn tick_at(&mut self, now: Instant) -> CoordinatorResult<()> {
        let sampled_mb = self.sampler.sample_mb()?;
        let config = self.context.config();
        self.context.resources().record_memory_sample(sampled_mb);

        let cycles = self.reclaimer.completed_cycles();
        let delta = cycles.saturating_sub(self.last_cycles);
        self.last_cycles = cycles;
        if delta > 0 {
            self.context.metrics().add_reclamation_cycles(delta);
        }

        trace!(sampled_mb, reclaimed_cycles = delta, "Memory sample");

        if sampled_mb > config.memory_warning_mb {
            if !self.warning_raised {
                self.warning_raised = true;
                warn!(
                    current_mb = sampled_mb,
                    threshold_mb = config.memory_warning_mb,
                    "Memory above warning threshold"
                );
                self.context
                    .events()
                    .publish(CoordinatorEvent::MemoryWarning {
                        current_mb: sampled_mb,
                    });
            }

            let since = *self.above_warning_since.get_or_insert(now);
            if !self.compaction_requested
                && now.duration_since(since) > config.compaction_after()
            {
                info!(
                    sustained_secs = now.duration_since(since).as_secs(),
                    "Memory high for a sustained period, scheduling compaction"
                );
                self.compaction_pending = true;
                self.compaction_requested = true;
            }
        } else {
            if self.warning_raised {
                debug!(current_mb = sampled_mb, "Memory back below warning threshold");
            }
            self.warning_raised = false;
            self.above_warning_since = None;
            self.compaction_requested = false;
        }

        if sampled_mb > config.memory_cleanup_mb {
            let mode = if std::mem::take(&mut self.compaction_pending) {
                ReclaimMode::Compacting
            } else {
                ReclaimMode::Young
            };
            self.reclaimer.request(mode);
            let (small, large) = self.context.shrink_pools();
            debug!(
                current_mb = sampled_mb,
                ?mode,
                released_small = small,
                released_large = large,
                "Proactive memory cleanup"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;

    use bytes::BytesMut;
    use mediacoord_ipc::CoordinatorConfig;

    struct ScriptedSampler(VecDeque<u64>);

    impl MemorySampler for ScriptedSampler {
        fn sample_mb(&mut self) -> CoordinatorResult<u64> {
            self.0
                .pop_front()
                .ok_or_else(|| CoordinatorError::SampleUnavailable("script exhausted".into()))
        }
    }

    fn monitor_with(
        samples: &[u64],
    ) -> (MemoryMonitor, Arc<CoordinatorContext>, Arc<CountingReclaimer>) {
        let context = Arc::new(CoordinatorContext::new(CoordinatorConfig::default()).unwrap());
        let reclaimer = Arc::new(CountingReclaimer::new());
        let monitor = MemoryMonitor::new(
            Arc::clone(&context),
            Box::new(ScriptedSampler(samples.iter().copied().collect())),
            reclaimer.clone(),
        );
        (monitor, context, reclaimer)
    }

    fn fill_pools(context: &CoordinatorContext) {
        for _ in 0..20 {
            context.return_small_buffer(BytesMut::zeroed(4096));
            context.return_large_buffer(BytesMut::zeroed(1024 * 1024));
        }
    }

    #[test]
    fn threshold_scenario() {
        let (mut monitor, context, _) = monitor_with(&[350, 420, 510]);
        let events = context.subscribe();
        fill_pools(&context);

        monitor.tick().unwrap();
        assert_eq!(context.small_pool().len(), 20);
        assert_eq!(context.large_pool().len(), 20);
        assert!(events.try_recv().is_err());

        monitor.tick().unwrap();
        assert_eq!(context.small_pool().len(), 5);
        assert_eq!(context.large_pool().len(), 2);
        assert!(events.try_recv().is_err());

        monitor.tick().unwrap();
        assert_eq!(
            events.try_recv(),
            Ok(CoordinatorEvent::MemoryWarning { current_mb: 510 })
        );
        assert!(events.try_recv().is_err());

        let stats = context.stats();
        assert_eq!(stats.current_memory_mb, 510);
        assert_eq!(stats.peak_memory_mb, 510);
    }

    #[test]
    fn warning_fires_once_per_crossing() {
        let (mut monitor, context, _) = monitor_with(&[510, 520, 530, 450, 505]);
        let events = context.subscribe();

        for _ in 0..5 {
            monitor.tick().unwrap();
        }

        let warnings: Vec<_> = events.try_iter().collect();
        assert_eq!(
            warnings,
            vec![
                CoordinatorEvent::MemoryWarning { current_mb: 510 },
                CoordinatorEvent::MemoryWarning { current_mb: 505 },
            ]
        );
        assert_eq!(context.stats().peak_memory_mb, 530);
    }

    #[test]
    fn cleanup_requests_count_as_reclamation_cycles() {
        let (mut monitor, context, reclaimer) = monitor_with(&[420, 430, 300, 310]);

        for _ in 0..4 {
            monitor.tick().unwrap();
        }

        // Two cleanups; the second is observed on the following tick.
        assert_eq!(reclaimer.completed_cycles(), 2);
        assert_eq!(context.stats().reclamation_cycles, 2);
        assert_eq!(reclaimer.compactions(), 0);
    }

    #[test]
    fn sustained_pressure_requests_one_compaction() {
        let (mut monitor, _, reclaimer) = monitor_with(&[510, 510, 510, 510, 450, 510, 510]);
        let start = Instant::now();
        let after = |secs| start + Duration::from_secs(secs);

        monitor.tick_at(after(0)).unwrap();
        monitor.tick_at(after(200)).unwrap();
        assert_eq!(reclaimer.compactions(), 0);

        monitor.tick_at(after(301)).unwrap();
        assert_eq!(reclaimer.compactions(), 1);

        monitor.tick_at(after(700)).unwrap();
        assert_eq!(reclaimer.compactions(), 1);

        // Dropping below the warning threshold starts a new episode.
        monitor.tick_at(after(701)).unwrap();
        monitor.tick_at(after(702)).unwrap();
        monitor.tick_at(after(1003)).unwrap();
        assert_eq!(reclaimer.compactions(), 2);
    }

    #[test]
    fn failed_sample_leaves_state_untouched() {
        let (mut monitor, context, _) = monitor_with(&[420]);
        monitor.tick().unwrap();

        assert!(matches!(
            monitor.tick(),
            Err(CoordinatorError::SampleUnavailable(_))
        ));
        assert_eq!(context.stats().current_memory_mb, 420);
    }

    #[test]
    fn process_sampler_reads_current_process() {
        let mut sampler = ProcessMemorySampler::new().unwrap();
        // Truncated to whole megabytes, so the value itself may be zero.
        assert!(sampler.sample_mb().is_ok());
    }
}
