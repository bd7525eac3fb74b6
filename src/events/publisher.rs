use tokio::sync::broadcast;
use tracing::debug;

use super::DomainEvent;

/// Broadcast publisher for domain events.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        debug!(event = event.name(), "publishing domain event");
        // A broadcast send with zero subscribers returns an error; that is
        // acceptable here, events are emitted whether or not anyone listens.
        match self.sender.send(event) {
            Ok(_) => Ok(()),
            Err(broadcast::error::SendError(_)) => Ok(()),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Error types for event publishing
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Event channel is closed")]
    ChannelClosed,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let publisher = EventPublisher::new(8);
        let result = publisher.publish(DomainEvent::UnitCompleted {
            unit_id: Uuid::new_v4(),
            serial_number: "SN-1".to_string(),
            work_order_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        });
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_subscriber_receives_event() {
        let publisher = EventPublisher::new(8);
        let mut rx = publisher.subscribe();
        assert_eq!(publisher.subscriber_count(), 1);

        publisher
            .publish(DomainEvent::StepBlocked {
                unit_id: Uuid::new_v4(),
                serial_number: "SN-2".to_string(),
                step_number: 30,
                retry_count: 1,
                timestamp: Utc::now(),
            })
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.name(), "step_blocked");
    }
}
