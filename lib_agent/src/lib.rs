//! # Reacharr Local Agent Library
//!
//! Core building blocks for the local agent that bridges self-hosted
//! Radarr/Sonarr installations to the remote control plane over MQTT.
//! Modules are folder-organized and feature-gated so leaner binaries can
//! pull in only what they need.

// Declare the feature-gated modules.
#[cfg(feature = "configs")]
pub mod configs;
#[cfg(feature = "connections")]
pub mod connections;
#[cfg(feature = "core")]
pub mod core;
#[cfg(feature = "loggers")]
pub mod loggers;
#[cfg(feature = "retrieve")]
pub mod retrieve;

/// Shared error taxonomy for the agent engine.
pub mod error;

pub use error::AgentError;
