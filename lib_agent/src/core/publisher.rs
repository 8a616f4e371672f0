//! # Envelope Publisher
//!
//! Serializes outbound envelopes and publishes them onto the agent-scoped
//! topics. A publish issued while the session is not `Connected` is a silent
//! no-op: once the link drops, callers must never block on an
//! acknowledgment that cannot come.
//!
//! Besides the broker-backed sink there is a channel-backed capture sink,
//! used by tests and dry runs to observe exactly what would go on the wire.

use std::sync::Arc;

use rumqttc::{AsyncClient, QoS};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};

use crate::connections::broker_mqtt::SessionState;
use crate::core::envelopes::{self, DataEnvelope, ResponseEnvelope, StatusEnvelope};

/// A publish recorded by the capture sink.
#[derive(Debug, Clone)]
pub struct CapturedPublish {
    pub topic: String,
    pub payload: serde_json::Value,
}

enum Sink {
    Broker(AsyncClient),
    Capture(mpsc::UnboundedSender<CapturedPublish>),
}

/// Publishes envelopes onto the agent's topics while the session is live.
pub struct Publisher {
    agent_id: String,
    state: Arc<RwLock<SessionState>>,
    sink: Sink,
}

impl Publisher {
    /// A publisher backed by the broker session.
    pub fn for_broker(agent_id: String, state: Arc<RwLock<SessionState>>, client: AsyncClient) -> Self {
        Self {
            agent_id,
            state,
            sink: Sink::Broker(client),
        }
    }

    /// A publisher backed by an in-process channel instead of the broker.
    pub fn capture(
        agent_id: String,
        state: Arc<RwLock<SessionState>>,
    ) -> (Self, mpsc::UnboundedReceiver<CapturedPublish>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                agent_id,
                state,
                sink: Sink::Capture(tx),
            },
            rx,
        )
    }

    /// The agent identity all topics are scoped to.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Publishes a status heartbeat.
    pub async fn publish_status(&self, envelope: &StatusEnvelope) {
        let topic = envelopes::status_topic(&self.agent_id);
        self.publish_json(topic, envelope).await;
    }

    /// Publishes a correlated command response.
    pub async fn publish_response(&self, envelope: &ResponseEnvelope) {
        let topic = envelopes::response_topic(&self.agent_id);
        self.publish_json(topic, envelope).await;
    }

    /// Publishes a per-service data envelope.
    pub async fn publish_data(&self, service: &str, envelope: &DataEnvelope) {
        let topic = envelopes::data_topic(&self.agent_id, service);
        self.publish_json(topic, envelope).await;
    }

    async fn publish_json<T: Serialize>(&self, topic: String, envelope: &T) {
        if *self.state.read().await != SessionState::Connected {
            log::debug!("Session not connected, skipping publish to {topic}");
            return;
        }
        let payload = match serde_json::to_vec(envelope) {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("Failed to serialize envelope for {topic}: {e}");
                return;
            }
        };
        match &self.sink {
            Sink::Broker(client) => {
                if let Err(e) = client.publish(&topic, QoS::AtLeastOnce, false, payload).await {
                    log::error!("Failed to publish to {topic}: {e}");
                }
            }
            Sink::Capture(tx) => {
                let payload = serde_json::from_slice(&payload).unwrap_or(serde_json::Value::Null);
                let _ = tx.send(CapturedPublish { topic, payload });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::envelopes::now_millis;
    use std::collections::BTreeMap;

    fn status(agent_id: &str) -> StatusEnvelope {
        StatusEnvelope {
            agent_id: agent_id.to_string(),
            timestamp: now_millis(),
            services: BTreeMap::new(),
            connection_state: "online".to_string(),
        }
    }

    #[tokio::test]
    async fn publish_is_a_no_op_while_not_connected() {
        let state = Arc::new(RwLock::new(SessionState::Reconnecting));
        let (publisher, mut rx) = Publisher::capture("A1".to_string(), state.clone());

        publisher.publish_status(&status("A1")).await;
        assert!(rx.try_recv().is_err());

        // The same publisher delivers once the session is connected again.
        *state.write().await = SessionState::Connected;
        publisher.publish_status(&status("A1")).await;
        let captured = rx.try_recv().unwrap();
        assert_eq!(captured.topic, "agents/A1/status");
        assert_eq!(captured.payload["connectionState"], "online");
    }
}
