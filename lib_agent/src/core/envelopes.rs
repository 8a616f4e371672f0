//! # Wire Envelopes and Topics
//!
//! The structured, timestamped message units exchanged over the broker, and
//! the agent-scoped topic layout. Everything is camelCase JSON on the wire.
//!
//! Topic layout:
//! - subscribe: `agents/{agentId}/commands`, `server/broadcast`
//! - publish:   `agents/{agentId}/status`, `agents/{agentId}/response`,
//!   `agents/{agentId}/data/{service}`

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The shared broadcast topic every agent subscribes to.
pub const BROADCAST_TOPIC: &str = "server/broadcast";

/// The agent's private command topic.
pub fn command_topic(agent_id: &str) -> String {
    format!("agents/{agent_id}/commands")
}

/// Topic for status heartbeats.
pub fn status_topic(agent_id: &str) -> String {
    format!("agents/{agent_id}/status")
}

/// Topic for correlated command responses.
pub fn response_topic(agent_id: &str) -> String {
    format!("agents/{agent_id}/response")
}

/// Topic for per-service data pushes.
pub fn data_topic(agent_id: &str, service: &str) -> String {
    format!("agents/{agent_id}/data/{service}")
}

/// Milliseconds since the Unix epoch, the timestamp unit of every envelope.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// An inbound command from the control plane.
///
/// `command` is the current field; `action` is the legacy spelling still
/// sent by older control planes. A message without a `requestId` is not
/// decodable and is dropped, since no response could ever be correlated.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCommand {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub timestamp: i64,
    pub request_id: String,
}

impl ServerCommand {
    /// The effective command name, falling back to the legacy field.
    pub fn name(&self) -> &str {
        self.command
            .as_deref()
            .or(self.action.as_deref())
            .unwrap_or("unknown")
    }

    /// The target service, checking the top-level field before the payload.
    pub fn target_service(&self) -> Option<&str> {
        self.service
            .as_deref()
            .or_else(|| self.data["service"].as_str())
    }
}

/// An inbound message on the shared broadcast topic. Never answered.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

/// The correlated response to one [`ServerCommand`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub request_id: String,
    pub command: String,
    pub data: Value,
    pub timestamp: i64,
    pub agent_id: String,
}

/// One service's entry in a status heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    /// `connected`, `disconnected`, or `unknown`.
    pub status: String,
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub last_check: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// The periodic status heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEnvelope {
    pub agent_id: String,
    pub timestamp: i64,
    pub services: BTreeMap<String, ServiceStatus>,
    pub connection_state: String,
}

/// A per-service data push (snapshot, id catalog, or server config).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataEnvelope {
    pub endpoint: String,
    pub data: Value,
    pub timestamp: i64,
    pub agent_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_name_falls_back_to_legacy_action() {
        let cmd: ServerCommand = serde_json::from_value(json!({
            "action": "status",
            "requestId": "r1",
        }))
        .unwrap();
        assert_eq!(cmd.name(), "status");

        let cmd: ServerCommand = serde_json::from_value(json!({
            "command": "force-sync",
            "action": "ignored",
            "requestId": "r2",
        }))
        .unwrap();
        assert_eq!(cmd.name(), "force-sync");

        let cmd: ServerCommand = serde_json::from_value(json!({"requestId": "r3"})).unwrap();
        assert_eq!(cmd.name(), "unknown");
    }

    #[test]
    fn missing_request_id_is_not_decodable() {
        assert!(serde_json::from_value::<ServerCommand>(json!({"command": "status"})).is_err());
    }

    #[test]
    fn target_service_prefers_top_level_field() {
        let cmd: ServerCommand = serde_json::from_value(json!({
            "command": "add-item",
            "service": "radarr",
            "data": {"service": "sonarr"},
            "requestId": "r1",
        }))
        .unwrap();
        assert_eq!(cmd.target_service(), Some("radarr"));

        let cmd: ServerCommand = serde_json::from_value(json!({
            "command": "add-item",
            "data": {"service": "sonarr"},
            "requestId": "r2",
        }))
        .unwrap();
        assert_eq!(cmd.target_service(), Some("sonarr"));
    }

    #[test]
    fn topics_are_agent_scoped() {
        assert_eq!(command_topic("A1"), "agents/A1/commands");
        assert_eq!(status_topic("A1"), "agents/A1/status");
        assert_eq!(response_topic("A1"), "agents/A1/response");
        assert_eq!(data_topic("A1", "radarr"), "agents/A1/data/radarr");
    }
}
