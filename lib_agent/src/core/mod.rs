//! # Core Module
//!
//! The agent's control loop: message envelopes and topics, the broker
//! publisher, the command dispatcher, the periodic collector, the broadcast
//! handler, and the engine that wires them into one session.

pub mod broadcast;
pub mod collector;
pub mod dispatcher;
pub mod engine;
pub mod envelopes;
pub mod publisher;

pub use broadcast::AgentNotification;
pub use collector::Collector;
pub use dispatcher::CommandDispatcher;
pub use engine::AgentEngine;
pub use publisher::Publisher;
