//! In-process domain event fan-out over a `tokio::sync::broadcast` channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub const PROPOSAL_MERGED: &str = "proposal.merged";
pub const GRANT_CREATED: &str = "grant.created";
pub const GRANT_PURCHASED: &str = "grant.purchased";

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Dot-separated event name, e.g. `proposal.merged`.
    pub event_type: String,
    pub dataset_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(event_type: &str, dataset_id: impl Into<String>) -> Self {
        Self {
            event_type: event_type.to_string(),
            dataset_id: dataset_id.into(),
            actor_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    /// Slow receivers observe `RecvError::Lagged` once `capacity` events are unread.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes to current subscribers. Dropped when nobody listens.
    pub fn publish(&self, event: DomainEvent) {
        tracing::debug!(event_type = %event.event_type, dataset_id = %event.dataset_id, "publishing event");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(
            DomainEvent::new(PROPOSAL_MERGED, "ds-1")
                .with_actor("user-1")
                .with_payload(serde_json::json!({"pull_request_id": "pr-1"})),
        );

        let a = rx1.recv().await.unwrap();
        let b = rx2.recv().await.unwrap();
        assert_eq!(a.event_type, PROPOSAL_MERGED);
        assert_eq!(b.actor_id.as_deref(), Some("user-1"));
        assert_eq!(b.payload["pull_request_id"], "pr-1");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        bus.publish(DomainEvent::new(GRANT_CREATED, "ds-1"));
    }
}
