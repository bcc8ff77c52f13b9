//! Subscriber fan-out for coordinator notifications.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use tracing::{debug, trace};

use mediacoord_ipc::{event_channel, CoordinatorEvent};

/// Fans events out to every subscriber without blocking the publisher.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Sender<CoordinatorEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> Receiver<CoordinatorEvent> {
        let (tx, rx) = event_channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver an event to all subscribers.
    ///
    /// Full channels miss the event; disconnected subscribers are pruned.
    pub fn publish(&self, event: CoordinatorEvent) {
        let mut dead: Vec<Sender<CoordinatorEvent>> = Vec::new();

        for tx in self.subscribers.read().iter() {
            match tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    trace!(event = event.name(), "Subscriber channel full, event dropped");
                }
                Err(TrySendError::Disconnected(_)) => dead.push(tx.clone()),
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write();
            subscribers.retain(|tx| !dead.iter().any(|d| d.same_channel(tx)));
            debug!(remaining = subscribers.len(), "Pruned disconnected subscribers");
        }
    }
}
