//! # Connections Module
//!
//! This module handles the persistent connection to the message broker that
//! links the agent to the remote control plane.

/// MQTT session options, broker URL parsing, and session lifecycle state.
pub mod broker_mqtt;

pub use broker_mqtt::{SessionState, CONNECT_TIMEOUT_SECS, RECONNECT_INTERVAL_SECS};
