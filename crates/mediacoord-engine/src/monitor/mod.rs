//! Background monitor loops.
//!
//! Both loops share one runner: wait on the shutdown channel for one
//! interval, tick, repeat. Dropping the shutdown sender disconnects the
//! channel, which wakes every loop immediately.

mod memory;
mod network;

pub use memory::{
    CountingReclaimer, MemoryMonitor, MemorySampler, ProcessMemorySampler, ReclaimMode, Reclaimer,
};
pub use network::NetworkMonitor;

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, error, warn};

use crate::{CoordinatorError, CoordinatorResult};

/// Spawn a named monitor thread that calls `tick` every `interval` until
/// `shutdown_rx` is disconnected.
pub(crate) fn spawn_monitor<F>(
    name: &'static str,
    interval: Duration,
    shutdown_rx: Receiver<()>,
    tick: F,
) -> CoordinatorResult<JoinHandle<()>>
where
    F: FnMut() -> CoordinatorResult<()> + Send + 'static,
{
    thread::Builder::new()
        .name(format!("mediacoord-{name}"))
        .spawn(move || run_monitor(name, interval, shutdown_rx, tick))
        .map_err(|source| CoordinatorError::ThreadSpawn {
            name: name.to_string(),
            source,
        })
}

fn run_monitor<F>(name: &'static str, interval: Duration, shutdown_rx: Receiver<()>, mut tick: F)
where
    F: FnMut() -> CoordinatorResult<()>,
{
    debug!(monitor = name, ?interval, "Monitor loop starting");

    loop {
        match shutdown_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        // One failed tick must not end the loop.
        match panic::catch_unwind(AssertUnwindSafe(&mut tick)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(monitor = name, "Monitor tick failed: {}", e),
            Err(_) => error!(monitor = name, "Monitor tick panicked"),
        }
    }

    debug!(monitor = name, "Monitor loop stopped");
}
