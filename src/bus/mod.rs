//! Pub/sub bus abstraction.
//!
//! The underlying message bus client is an external collaborator (spec §1
//! Non-goals) — this module only defines the narrow contract the rest of
//! the gateway needs, the same way `cloudllm`'s `HttpServerAdapter` trait
//! lets a concrete HTTP framework be swapped in without touching the
//! `MCPServerBuilder` API (see that trait's doc comment for the pattern
//! this mirrors).

pub mod jsonrpc;
pub mod topics;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::GatewayError;

/// User-properties carried on every outbound A2A request (spec §6.2).
#[derive(Debug, Clone, Default)]
pub struct MessageProperties {
    pub reply_to: Option<String>,
    pub a2a_status_topic: Option<String>,
    pub client_id: Option<String>,
    pub user_id: Option<String>,
    pub extra: HashMap<String, String>,
}

/// A message received off a subscription.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub payload: serde_json::Value,
    pub properties: MessageProperties,
}

/// The pluggable bus boundary. A production implementation adapts a real
/// pub/sub client (e.g. a Solace PubSub+ or MQTT binding); tests and the
/// in-memory repository backend use `InMemoryBus` below.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Publishes once. Failures are fatal to the caller's operation (spec
    /// §4.1 "Publishing is attempted once").
    async fn publish(
        &self,
        topic: &str,
        payload: serde_json::Value,
        properties: MessageProperties,
    ) -> Result<(), GatewayError>;

    /// Subscribes to a topic, returning a subscription id (for later
    /// `unsubscribe`) paired with the channel delivered messages arrive on.
    async fn subscribe(
        &self,
        topic_filter: &str,
    ) -> Result<(String, tokio::sync::mpsc::Receiver<BusMessage>), GatewayError>;

    async fn unsubscribe(&self, subscription_id: &str) -> Result<(), GatewayError>;
}

/// A minimal in-process bus used by tests and by the default in-memory
/// repository backend: publishing on a topic immediately fans out to every
/// registered listener closure for a matching filter (exact match or
/// trailing `*` wildcard on the last segment).
pub struct InMemoryBus {
    listeners: std::sync::Mutex<Vec<(String, String, tokio::sync::mpsc::Sender<BusMessage>)>>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self {
            listeners: std::sync::Mutex::new(Vec::new()),
        }
    }
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a channel that receives every message published on a topic
    /// matching `topic_filter`. Returns the subscription id.
    pub fn listen(&self, topic_filter: &str) -> (String, tokio::sync::mpsc::Receiver<BusMessage>) {
        let (tx, rx) = tokio::sync::mpsc::channel(1024);
        let id = uuid::Uuid::new_v4().to_string();
        self.listeners
            .lock()
            .unwrap()
            .push((id.clone(), topic_filter.to_string(), tx));
        (id, rx)
    }

    fn matches(filter: &str, topic: &str) -> bool {
        if let Some(prefix) = filter.strip_suffix('*') {
            topic.starts_with(prefix)
        } else {
            filter == topic
        }
    }
}

#[async_trait]
impl Bus for InMemoryBus {
    async fn publish(
        &self,
        topic: &str,
        payload: serde_json::Value,
        properties: MessageProperties,
    ) -> Result<(), GatewayError> {
        let msg = BusMessage {
            topic: topic.to_string(),
            payload,
            properties,
        };
        let listeners: Vec<_> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, filter, _)| Self::matches(filter, topic))
            .map(|(_, _, tx)| tx.clone())
            .collect();
        for tx in listeners {
            let _ = tx.send(msg.clone()).await;
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic_filter: &str,
    ) -> Result<(String, tokio::sync::mpsc::Receiver<BusMessage>), GatewayError> {
        Ok(self.listen(topic_filter))
    }

    async fn unsubscribe(&self, subscription_id: &str) -> Result<(), GatewayError> {
        self.listeners
            .lock()
            .unwrap()
            .retain(|(id, _, _)| id != subscription_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_fans_out_to_matching_listeners() {
        let bus = InMemoryBus::new();
        let (_id, mut rx) = bus.listen("a2a/v1/agent/echo/*");
        bus.publish(
            "a2a/v1/agent/echo/request",
            serde_json::json!({"hello": "world"}),
            MessageProperties::default(),
        )
        .await
        .unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.topic, "a2a/v1/agent/echo/request");
    }
}
