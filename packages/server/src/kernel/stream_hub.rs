//! In-process pub/sub hub for real-time streaming.
//!
//! A single broadcast channel carries every application event as a JSON
//! envelope `{type, timestamp, payload}`. The SSE endpoint subscribes here;
//! producers publish through the [`EventPublisher`] trait and never see the
//! transport.

use chrono::Utc;
use tokio::sync::broadcast;

use super::events::{AppEvent, EventPublisher};

/// Cloneable handle to the application event feed.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<serde_json::Value>,
}

impl EventHub {
    /// Create a hub with the default buffer (256 events per subscriber).
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to the feed. Slow subscribers that fall more than the
    /// buffer behind observe a lag error, not backpressure.
    pub fn subscribe(&self) -> broadcast::Receiver<serde_json::Value> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for EventHub {
    fn publish(&self, event: AppEvent) {
        let mut envelope = match serde_json::to_value(&event) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, kind = event.kind(), "failed to serialize event");
                return;
            }
        };
        if let Some(obj) = envelope.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(Utc::now().to_rfc3339()),
            );
        }

        // Ignore send errors (no active subscribers)
        let _ = self.tx.send(envelope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::JobRunId;

    #[tokio::test]
    async fn publish_subscribe_roundtrip() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();

        hub.publish(AppEvent::RunStarted {
            job_run_id: JobRunId::new(),
            total_items: 2,
        });

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope["type"], "job:started");
        assert_eq!(envelope["payload"]["totalItems"], 2);
        assert!(envelope["timestamp"].is_string());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let hub = EventHub::new();
        // Should not panic
        hub.publish(AppEvent::PrecheckStarted { total_checks: 1 });
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive() {
        let hub = EventHub::new();
        let mut rx1 = hub.subscribe();
        let mut rx2 = hub.subscribe();

        hub.publish(AppEvent::PrecheckCompleted {
            total: 1,
            passed: 1,
            failed: 0,
        });

        assert_eq!(rx1.recv().await.unwrap()["type"], "precheck:completed");
        assert_eq!(rx2.recv().await.unwrap()["type"], "precheck:completed");
    }
}
