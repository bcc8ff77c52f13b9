//! Error types for the coordinator.

use thiserror::Error;

use mediacoord_ipc::ConfigError;

/// Errors that can occur while building or running the coordinator.
///
/// None of these reach hot-path callers; monitor loops log and swallow
/// the ones raised during a tick.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Configuration could not be loaded or failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Process memory could not be sampled.
    #[error("Memory sample unavailable: {0}")]
    SampleUnavailable(String),

    /// A monitor thread could not be spawned.
    #[error("Failed to spawn {name} thread: {source}")]
    ThreadSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
