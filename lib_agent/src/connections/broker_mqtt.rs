//! # Broker Session Primitives
//!
//! Builds the MQTT client options for the one broker session the process is
//! allowed to hold, and defines the session lifecycle state machine shared
//! between the engine, the publisher, and the collection scheduler.
//!
//! Client identities are derived per session from the agent id plus a
//! millisecond timestamp so no two sessions ever share an identity, even
//! across fast restarts of the same agent.

use std::time::Duration;

use rumqttc::MqttOptions;
use url::Url;

use crate::configs::agent_config::Credentials;
use crate::error::AgentError;

/// Seconds the initial connection may take before `initialize()` fails.
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Fixed pacing between transport reconnect attempts, in seconds.
pub const RECONNECT_INTERVAL_SECS: u64 = 30;

/// Broker keep-alive interval, in seconds.
pub const KEEP_ALIVE_SECS: u64 = 30;

const DEFAULT_MQTT_PORT: u16 = 1883;

/// Lifecycle of the broker session.
///
/// `Disconnected` is terminal for a session: only an explicit `disconnect()`
/// reaches it, and a fresh `initialize()` starts a new cycle from `Idle`.
/// Transport errors while connected move to `Reconnecting` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session has been started yet.
    Idle,
    /// Initial connection in progress.
    Connecting,
    /// Live session; subscriptions active, scheduler running.
    Connected,
    /// Transport dropped; the client is retrying on a fixed interval.
    Reconnecting,
    /// Session deliberately closed.
    Disconnected,
}

/// Derives the time-unique client identity for one session.
pub fn derive_client_id(agent_id: &str) -> String {
    format!("reacharr-agent-{agent_id}-{}", chrono::Utc::now().timestamp_millis())
}

/// Splits a broker URL into host and port, accepting `mqtt://` and `tcp://`.
pub fn parse_broker_url(raw: &str) -> Result<(String, u16), AgentError> {
    let url = Url::parse(raw).map_err(|e| AgentError::BadBrokerUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "mqtt" | "tcp" => {}
        other => {
            return Err(AgentError::BadBrokerUrl(format!(
                "{raw}: unsupported scheme {other:?} (expected mqtt:// or tcp://)"
            )))
        }
    }
    let host = url
        .host_str()
        .ok_or_else(|| AgentError::BadBrokerUrl(format!("{raw}: missing host")))?
        .to_string();
    Ok((host, url.port().unwrap_or(DEFAULT_MQTT_PORT)))
}

/// Builds the MQTT options for a new session.
pub fn mqtt_options(credentials: &Credentials, agent_id: &str) -> Result<MqttOptions, AgentError> {
    let (host, port) = parse_broker_url(&credentials.broker_url)?;
    let mut options = MqttOptions::new(derive_client_id(agent_id), host, port);
    options
        .set_credentials(credentials.username.clone(), credentials.password.clone())
        .set_keep_alive(Duration::from_secs(KEEP_ALIVE_SECS))
        .set_clean_session(true);
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mqtt_urls() {
        assert_eq!(
            parse_broker_url("mqtt://broker.example.com:8883").unwrap(),
            ("broker.example.com".to_string(), 8883)
        );
        // Default port applies when none is given.
        assert_eq!(
            parse_broker_url("tcp://10.0.0.5").unwrap(),
            ("10.0.0.5".to_string(), DEFAULT_MQTT_PORT)
        );
    }

    #[test]
    fn rejects_unsupported_schemes() {
        assert!(parse_broker_url("ws://broker:9001").is_err());
        assert!(parse_broker_url("mqtts://broker:8883").is_err());
        assert!(parse_broker_url("not a url").is_err());
    }

    #[test]
    fn client_id_embeds_agent_identity() {
        let id = derive_client_id("owner1_abc");
        assert!(id.starts_with("reacharr-agent-owner1_abc-"));
        let suffix = id.rsplit('-').next().unwrap();
        assert!(suffix.parse::<i64>().is_ok());
    }
}
