//! In-process event channel the cart core publishes to.

use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::events::DomainEvent;

#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> { self.sender.subscribe() }

    /// Publishes to whoever is listening; having no listener is fine.
    pub fn publish(&self, event: impl Into<DomainEvent>) {
        let event = event.into();
        if self.sender.send(event).is_err() {
            debug!("event dropped, no subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self { Self::new(64) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::Notification;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::new(4);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        bus.publish(Notification::MutationFailed { message: "boom".into() });
        let expected = DomainEvent::Notice(Notification::MutationFailed { message: "boom".into() });
        assert_eq!(first.recv().await.ok(), Some(expected.clone()));
        assert_eq!(second.recv().await.ok(), Some(expected));
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        EventBus::default().publish(Notification::RefreshFailed { message: "offline".into() });
    }
}
