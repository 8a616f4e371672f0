//! Error taxonomy for the agent engine.
//!
//! Only the initial connection failure surfaces to the caller of
//! `initialize()`; everything raised inside a command handler or a cycle
//! task is contained at that task's boundary and converted into an
//! error-shaped response payload or a log line.

use thiserror::Error;

/// Errors produced by the agent engine and its collaborators.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The initial broker connection did not come up within the deadline.
    #[error("broker connection timed out after {0} seconds")]
    ConnectionTimeout(u64),

    /// The broker client rejected a subscribe/publish/disconnect request.
    #[cfg(feature = "connections")]
    #[error("broker client error: {0}")]
    Broker(#[from] rumqttc::ClientError),

    /// The broker URL could not be parsed into host/port.
    #[error("invalid broker url: {0}")]
    BadBrokerUrl(String),

    /// Loading or saving the persisted agent configuration failed.
    #[error("configuration persistence failed: {0}")]
    Persistence(#[from] std::io::Error),

    /// A command targeted a data-source adapter that has no url/key pair.
    #[error("Service not configured")]
    NotConfigured(&'static str),

    /// A command referenced a service, endpoint, or payload shape the agent
    /// does not expose. Local validation, nothing was sent upstream.
    #[error("{0}")]
    InvalidRequest(String),

    /// An upstream Radarr/Sonarr request failed.
    #[error("upstream request failed: {0}")]
    Upstream(String),
}
