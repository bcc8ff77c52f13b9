//! Process-wide media coordinator.
//!
//! This crate arbitrates CPU, memory and network resources between a
//! real-time voice pipeline and a video pipeline sharing one process.
//! Producers report activity through a [`CoordinatorContext`]; two
//! background loops owned by a [`Coordinator`] turn those reports into
//! congestion, voice and memory state that the adaptation queries read.

mod activity;
mod adaptation;
mod context;
mod error;
mod events;
mod metrics;
mod monitor;
mod orchestrator;
mod pool;
mod state;

pub use adaptation::{AdaptationInputs, AdaptationPolicy};
pub use context::CoordinatorContext;
pub use error::CoordinatorError;
pub use monitor::{
    CountingReclaimer, MemoryMonitor, MemorySampler, NetworkMonitor, ProcessMemorySampler,
    ReclaimMode, Reclaimer,
};
pub use orchestrator::Coordinator;
pub use pool::BufferPool;

pub use mediacoord_ipc::{
    CoordinatorConfig, CoordinatorEvent, CoordinatorStats, LifecycleState, PoolStats,
};

/// Result alias used throughout the engine.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
