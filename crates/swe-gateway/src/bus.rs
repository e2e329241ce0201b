//! Event bus implementations (spec.md §6 "Event bus"): an in-process
//! broadcast channel for the gateway's own subscribers, and an HTTP-POST
//! sink against `EVENT_HTTP_ENDPOINT` for external consumers.

use async_trait::async_trait;
use swe_core::{BusEvent, EventBus, Result, SessionKey};
use tokio::sync::broadcast;

/// Fans every published event out to whatever is subscribed on the
/// gateway's own channel (e.g. a websocket handler, or a test harness).
/// Lagging or absent subscribers never block a publish.
pub struct BroadcastEventBus {
    sender: broadcast::Sender<(SessionKey, BusEvent)>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(SessionKey, BusEvent)> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventBus for BroadcastEventBus {
    async fn publish(&self, worker_id: &SessionKey, event: BusEvent) -> Result<()> {
        // No receivers is a normal, expected state; `send` only errors then.
        let _ = self.sender.send((worker_id.clone(), event));
        Ok(())
    }
}

/// Posts every event as JSON to a configured HTTP endpoint (spec.md §6
/// `EVENT_HTTP_ENDPOINT`). A delivery failure is logged, not propagated —
/// the turn loop's publishes are already fire-and-forget.
pub struct HttpEventBus {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEventBus {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl EventBus for HttpEventBus {
    async fn publish(&self, worker_id: &SessionKey, event: BusEvent) -> Result<()> {
        let body = serde_json::json!({
            "workerId": worker_id.as_str(),
            "event": event,
        });
        if let Err(e) = self.client.post(&self.endpoint).json(&body).send().await {
            tracing::warn!(endpoint = %self.endpoint, error = %e, "event delivery failed");
        }
        Ok(())
    }
}

/// Publishes to both an in-process broadcast channel and, when configured,
/// an HTTP sink — the shape the gateway actually wires up at startup.
pub struct FanOutEventBus {
    broadcast: BroadcastEventBus,
    http: Option<HttpEventBus>,
}

impl FanOutEventBus {
    pub fn new(capacity: usize, http_endpoint: Option<String>) -> Self {
        Self {
            broadcast: BroadcastEventBus::new(capacity),
            http: http_endpoint.map(HttpEventBus::new),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<(SessionKey, BusEvent)> {
        self.broadcast.subscribe()
    }
}

#[async_trait]
impl EventBus for FanOutEventBus {
    async fn publish(&self, worker_id: &SessionKey, event: BusEvent) -> Result<()> {
        self.broadcast.publish(worker_id, event.clone()).await?;
        if let Some(http) = &self.http {
            http.publish(worker_id, event).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_delivers_to_subscriber() {
        let bus = BroadcastEventBus::new(8);
        let mut rx = bus.subscribe();
        let worker_id = SessionKey::new("s1");
        bus.publish(
            &worker_id,
            BusEvent::Message {
                role: "assistant".into(),
                text: "hi".into(),
            },
        )
        .await
        .unwrap();
        let (got_worker, event) = rx.recv().await.unwrap();
        assert_eq!(got_worker.as_str(), "s1");
        matches!(event, BusEvent::Message { .. });
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_error() {
        let bus = BroadcastEventBus::new(8);
        let worker_id = SessionKey::new("s1");
        let result = bus
            .publish(
                &worker_id,
                BusEvent::Message {
                    role: "assistant".into(),
                    text: "hi".into(),
                },
            )
            .await;
        assert!(result.is_ok());
    }
}
