//! Coordinator lifecycle: start the monitor loops, stop them once.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use mediacoord_ipc::{CoordinatorConfig, LifecycleState, ShutdownPhase};

use crate::context::CoordinatorContext;
use crate::monitor::{
    self, CountingReclaimer, MemoryMonitor, MemorySampler, NetworkMonitor, ProcessMemorySampler,
    Reclaimer,
};
use crate::CoordinatorResult;

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Owns the monitor loops around a shared [`CoordinatorContext`].
///
/// Dropping the coordinator shuts it down.
pub struct Coordinator {
    context: Arc<CoordinatorContext>,
    state: RwLock<LifecycleState>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    workers: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl Coordinator {
    /// Start with the process memory sampler and the default reclaimer.
    pub fn start(config: CoordinatorConfig) -> CoordinatorResult<Self> {
        let sampler = ProcessMemorySampler::new()?;
        Self::start_with(config, Box::new(sampler), Arc::new(CountingReclaimer::new()))
    }

    /// Start with a custom memory sampler and reclaimer.
    #[instrument(name = "coordinator_start", skip_all)]
    pub fn start_with(
        config: CoordinatorConfig,
        sampler: Box<dyn MemorySampler>,
        reclaimer: Arc<dyn Reclaimer>,
    ) -> CoordinatorResult<Self> {
        let context = Arc::new(CoordinatorContext::new(config)?);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);

        let coordinator = Self {
            context: Arc::clone(&context),
            state: RwLock::new(LifecycleState::Running),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            workers: Mutex::new(Vec::with_capacity(2)),
        };

        let mut memory = MemoryMonitor::new(Arc::clone(&context), sampler, reclaimer);
        let memory_handle = monitor::spawn_monitor(
            "memory",
            context.config().memory_poll_interval(),
            shutdown_rx.clone(),
            move || memory.tick(),
        )?;
        coordinator.workers.lock().push(("memory", memory_handle));

        // If this spawn fails, dropping `coordinator` stops the memory loop.
        let mut network = NetworkMonitor::new(Arc::clone(&context));
        let network_handle = monitor::spawn_monitor(
            "network",
            context.config().network_poll_interval(),
            shutdown_rx,
            move || network.tick(),
        )?;
        coordinator.workers.lock().push(("network", network_handle));

        info!(
            memory_interval_ms = context.config().memory_poll_interval_ms,
            network_interval_ms = context.config().network_poll_interval_ms,
            "Coordinator started"
        );
        Ok(coordinator)
    }

    /// The shared context producers talk to.
    pub fn context(&self) -> &Arc<CoordinatorContext> {
        &self.context
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    /// Stop the loops and release pooled buffers.
    ///
    /// Safe to call more than once and from several threads; only the first
    /// call does any work. Each loop gets the configured join timeout and is
    /// abandoned if it has not finished by then.
    #[instrument(name = "coordinator_shutdown", skip(self))]
    pub fn shutdown(&self) {
        let first_phase = ShutdownPhase::SignalWorkers;
        {
            let mut state = self.state.write();
            if state.is_stopping() {
                debug!("Shutdown already in progress, ignoring");
                return;
            }
            if !state.is_running() {
                debug!(state = state.name(), "Already shut down, ignoring");
                return;
            }
            *state = LifecycleState::Stopping { phase: first_phase };
        }
        debug!(
            previous = "Running",
            current = "Stopping",
            phase = first_phase.name(),
            "State transition"
        );
        info!("Coordinator shutting down");

        let mut phase = first_phase;
        loop {
            self.run_shutdown_phase(phase);
            match phase.next() {
                Some(next) => {
                    self.transition_to(LifecycleState::Stopping { phase: next });
                    phase = next;
                }
                None => break,
            }
        }

        self.transition_to(LifecycleState::Stopped);
        info!("Coordinator stopped");
    }

    fn run_shutdown_phase(&self, phase: ShutdownPhase) {
        match phase {
            // Disconnecting the channel wakes every loop.
            ShutdownPhase::SignalWorkers => drop(self.shutdown_tx.lock().take()),
            ShutdownPhase::JoinWorkers => {
                let timeout = self.context.config().shutdown_join_timeout();
                let workers = std::mem::take(&mut *self.workers.lock());
                for (name, handle) in workers {
                    join_with_timeout(name, handle, timeout);
                }
            }
            ShutdownPhase::ReleasePools => self.context.release_pools(),
        }
    }

    fn transition_to(&self, new_state: LifecycleState) {
        let previous = std::mem::replace(&mut *self.state.write(), new_state);

        match new_state {
            LifecycleState::Stopping { phase } => debug!(
                previous = %previous.name(),
                current = %new_state.name(),
                phase = phase.name(),
                "State transition"
            ),
            _ => debug!(
                previous = %previous.name(),
                current = %new_state.name(),
                "State transition"
            ),
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn join_with_timeout(name: &'static str, handle: JoinHandle<()>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!(monitor = name, ?timeout, "Monitor loop did not stop in time, abandoning");
            return;
        }
        thread::sleep(JOIN_POLL_INTERVAL);
    }

    if handle.join().is_err() {
        warn!(monitor = name, "Monitor loop panicked");
    }
}
