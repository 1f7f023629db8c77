use super::SubstrateEvent;
use tokio::sync::broadcast;
use tracing::trace;

/// Publisher for substrate lifecycle notifications
///
/// ```rust
/// use substrate_core::events::{EventPublisher, SubstrateEvent};
///
/// # tokio_test::block_on(async {
/// let publisher = EventPublisher::new(16);
/// let mut receiver = publisher.subscribe();
///
/// publisher.publish(SubstrateEvent::ServiceReady {
///     service: "datastore".to_string(),
/// });
///
/// let received = receiver.recv().await.unwrap();
/// assert_eq!(received.name(), "service.ready");
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub event: SubstrateEvent,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl PublishedEvent {
    pub fn name(&self) -> &'static str {
        self.event.name()
    }
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to every current subscriber.
    ///
    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event: SubstrateEvent) {
        trace!(event = event.name(), "Publishing substrate event");
        let published = PublishedEvent {
            event,
            published_at: chrono::Utc::now(),
        };
        // SendError only means nobody is listening
        let _ = self.sender.send(published);
    }

    /// Subscribe to events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Error types for event consumption
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Event channel is closed")]
    ChannelClosed,
    #[error("Subscriber lagged behind and missed {0} events")]
    Lagged(u64),
}

impl From<broadcast::error::RecvError> for PublishError {
    fn from(error: broadcast::error::RecvError) -> Self {
        match error {
            broadcast::error::RecvError::Closed => PublishError::ChannelClosed,
            broadcast::error::RecvError::Lagged(missed) => PublishError::Lagged(missed),
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}
