//! In-process event bus.
//!
//! The health-check endpoint publishes [`ConsulEvent::HealthCheck`]; the
//! cyclic registrar listens for it. The access point updater publishes
//! change notifications for whoever subscribed.

use consul_sync_types::{AccessPoint, FieldChange};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsulEvent {
    /// The registry agent probed our health endpoint
    HealthCheck,
    /// One access point changed after polling
    AccessPointUpdated { point: AccessPoint, changes: Vec<FieldChange> },
    /// A polling cycle changed at least one access point
    AccessPointsUpdated,
}

/// Cloneable handle to a broadcast channel of [`ConsulEvent`].
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ConsulEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConsulEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn emit(&self, event: ConsulEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event dropped: no subscribers");
        }
    }

    /// Called by the health endpoint handler.
    pub fn health_check(&self) {
        self.emit(ConsulEvent::HealthCheck);
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.health_check();
        bus.emit(ConsulEvent::AccessPointsUpdated);
        assert_eq!(rx.recv().await.ok(), Some(ConsulEvent::HealthCheck));
        assert_eq!(rx.recv().await.ok(), Some(ConsulEvent::AccessPointsUpdated));
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::default();
        bus.health_check();
        assert_eq!(bus.receiver_count(), 0);
    }
}
