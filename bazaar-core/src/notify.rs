use async_trait::async_trait;
use bazaar_shared::NotificationEvent;
use std::sync::Arc;

/// Inbound side of the notification dispatcher.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(
        &self,
        event: &NotificationEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Sink that only writes the event to the log.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn publish(
        &self,
        event: &NotificationEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!(topic = event.topic(), key = %event.key(), "Notification: {:?}", event);
        Ok(())
    }
}

/// Hands `event` to `sink` on a background task.
///
/// The caller's state change is already committed; a delivery failure is logged and
/// dropped.
pub fn dispatch_best_effort(sink: Arc<dyn NotificationSink>, event: NotificationEvent) {
    tokio::spawn(async move {
        if let Err(e) = sink.publish(&event).await {
            tracing::error!(topic = event.topic(), key = %event.key(), "Notification delivery failed: {}", e);
        }
    });
}
