//! Typed coordinator<->observer messages for the media coordinator.
//!
//! This crate defines the notification events, statistics snapshots,
//! lifecycle states and configuration shared between the coordinator
//! engine and whatever observes it (UI, logging, tests).

mod config;
mod events;
mod state;
mod types;

pub use config::{ConfigError, CoordinatorConfig};
pub use events::CoordinatorEvent;
pub use state::{LifecycleState, ShutdownPhase};
pub use types::{CoordinatorStats, PoolStats};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for events (coordinator → observer).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded event channel.
pub fn event_channel() -> (Sender<CoordinatorEvent>, Receiver<CoordinatorEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}
