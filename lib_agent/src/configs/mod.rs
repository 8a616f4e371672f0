//! # Configuration Modules
//!
//! This module aggregates the agent's configuration concerns: the in-memory
//! configuration record exchanged with the control plane, and its durable
//! JSON-file persistence.

/// The agent configuration record, broker credentials, and partial merging.
pub mod agent_config;

/// Durable load/save/clear of the agent configuration on disk.
pub mod config_store;

pub use agent_config::{AgentConfig, AgentConfigPatch, Credentials};
pub use config_store::ConfigStore;
