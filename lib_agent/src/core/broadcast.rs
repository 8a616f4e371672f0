//! # Broadcast Handler
//!
//! Reacts to messages on the shared `server/broadcast` topic. Broadcasts are
//! fire-and-forget from the control plane's side: no response is ever
//! published for this class, and unknown types are ignored silently.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::core::collector::Collector;
use crate::core::envelopes::BroadcastMessage;

/// Side effects raised by broadcast messages, consumed by the daemon main.
#[derive(Debug, Clone)]
pub enum AgentNotification {
    /// The control plane asked every agent to shut down.
    Shutdown,
    /// A newer agent version is available; payload carries the details.
    UpdateAvailable(Value),
    /// The control plane asked for a configuration reload.
    ConfigRefresh,
}

/// Decodes broadcast payloads and triggers their local side effects.
pub struct BroadcastHandler {
    collector: Arc<Collector>,
    notify_tx: broadcast::Sender<AgentNotification>,
}

impl BroadcastHandler {
    pub fn new(collector: Arc<Collector>, notify_tx: broadcast::Sender<AgentNotification>) -> Self {
        Self { collector, notify_tx }
    }

    /// Handles one inbound broadcast payload. Never publishes anything.
    pub async fn handle_payload(&self, payload: &[u8]) {
        let message: BroadcastMessage = match serde_json::from_slice(payload) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Failed to parse broadcast payload: {e}");
                return;
            }
        };
        log::info!("Received broadcast: {}", message.kind);

        match message.kind.as_str() {
            "shutdown" => {
                let _ = self.notify_tx.send(AgentNotification::Shutdown);
            }
            "update" => {
                let _ = self.notify_tx.send(AgentNotification::UpdateAvailable(message.data));
            }
            "config-refresh" => {
                let _ = self.notify_tx.send(AgentNotification::ConfigRefresh);
            }
            "force-data-sync" => {
                // Run the cycle body immediately, off the session task, so a
                // slow upstream cannot starve the broker event loop.
                let collector = self.collector.clone();
                tokio::spawn(async move {
                    let report = collector.force_sync().await;
                    log::info!("Broadcast-triggered sync finished: {}", report["message"]);
                });
            }
            other => {
                log::debug!("Ignoring unknown broadcast type: {other}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::broker_mqtt::SessionState;
    use crate::core::publisher::Publisher;
    use crate::retrieve::media_adapter::{ArrAdapter, ServiceKind};
    use serde_json::json;
    use tokio::sync::RwLock;

    fn handler() -> (
        BroadcastHandler,
        broadcast::Receiver<AgentNotification>,
        tokio::sync::mpsc::UnboundedReceiver<crate::core::publisher::CapturedPublish>,
    ) {
        let state = Arc::new(RwLock::new(SessionState::Connected));
        let (publisher, rx) = Publisher::capture("A1".to_string(), state.clone());
        let collector = Arc::new(Collector::new(
            Arc::new(ArrAdapter::new(ServiceKind::Radarr)),
            Arc::new(ArrAdapter::new(ServiceKind::Sonarr)),
            Arc::new(publisher),
            state,
        ));
        let (notify_tx, notify_rx) = broadcast::channel(8);
        (BroadcastHandler::new(collector, notify_tx), notify_rx, rx)
    }

    #[tokio::test]
    async fn shutdown_broadcast_raises_one_notification_and_no_publish() {
        let (handler, mut notify_rx, mut publish_rx) = handler();
        handler
            .handle_payload(&serde_json::to_vec(&json!({"type": "shutdown"})).unwrap())
            .await;

        assert!(matches!(notify_rx.try_recv().unwrap(), AgentNotification::Shutdown));
        assert!(notify_rx.try_recv().is_err());
        assert!(publish_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn update_broadcast_carries_its_payload() {
        let (handler, mut notify_rx, _publish_rx) = handler();
        handler
            .handle_payload(
                &serde_json::to_vec(&json!({"type": "update", "data": {"version": "2.1.0"}})).unwrap(),
            )
            .await;
        match notify_rx.try_recv().unwrap() {
            AgentNotification::UpdateAvailable(data) => assert_eq!(data["version"], "2.1.0"),
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_and_malformed_broadcasts_are_ignored() {
        let (handler, mut notify_rx, mut publish_rx) = handler();
        handler
            .handle_payload(&serde_json::to_vec(&json!({"type": "confetti"})).unwrap())
            .await;
        handler.handle_payload(b"][ nonsense").await;

        assert!(notify_rx.try_recv().is_err());
        assert!(publish_rx.try_recv().is_err());
    }
}
