//! Per-session event bus: one publisher (the agent loop), exactly one
//! subscriber (the streaming endpoint). Bounded so a slow subscriber
//! throttles the loop via backpressure rather than unbounded buffering.

use stepwise_domain::agent::AgentEvent;
use tokio::sync::mpsc;

/// Bus capacity. Small by design — the point is to throttle the loop when
/// the subscriber falls behind, not to buffer a long backlog.
const CHANNEL_CAPACITY: usize = 32;

/// The publisher half, held by the agent loop.
pub struct EventPublisher {
    tx: mpsc::Sender<AgentEvent>,
}

impl EventPublisher {
    /// Hand an event to the subscriber. Blocks (backpressure) if the
    /// subscriber's buffer is full; if the subscriber has gone away the
    /// event is silently dropped — streaming runs only publish while a
    /// subscriber is attached.
    pub async fn publish(&self, event: AgentEvent) {
        let _ = self.tx.send(event).await;
    }
}

/// The subscriber half, held by the streaming endpoint.
pub struct EventSubscriber {
    rx: mpsc::Receiver<AgentEvent>,
}

impl EventSubscriber {
    /// Receive the next event, or `None` once the publisher has closed the
    /// bus (the agent loop finished or errored).
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        self.rx.recv().await
    }
}

/// Create a new per-session bus. The publisher and subscriber halves are
/// dropped, and the bus torn down, when either side is dropped or the
/// loop completes.
pub fn channel() -> (EventPublisher, EventSubscriber) {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    (EventPublisher { tx }, EventSubscriber { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_domain::agent::AgentEventType;

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let (publisher, mut subscriber) = channel();
        publisher.publish(AgentEvent::new(AgentEventType::SessionStarted, None)).await;
        publisher.publish(AgentEvent::new(AgentEventType::PlanningStarted, None)).await;

        let first = subscriber.recv().await.unwrap();
        let second = subscriber.recv().await.unwrap();
        assert_eq!(first.event_type, AgentEventType::SessionStarted);
        assert_eq!(second.event_type, AgentEventType::PlanningStarted);
    }

    #[tokio::test]
    async fn dropped_subscriber_does_not_panic_publisher() {
        let (publisher, subscriber) = channel();
        drop(subscriber);
        publisher.publish(AgentEvent::new(AgentEventType::SessionStarted, None)).await;
    }

    #[tokio::test]
    async fn closed_publisher_ends_subscription() {
        let (publisher, mut subscriber) = channel();
        drop(publisher);
        assert!(subscriber.recv().await.is_none());
    }
}
