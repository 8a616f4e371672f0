//! # Data Retrieval Module
//!
//! HTTP-based access to the upstream media managers. The `arr_http` client
//! encapsulates request building, api-key auth, timeouts, and retry
//! middleware so the adapters can focus on endpoint semantics.

/// Retrying HTTP client for the *arr REST APIs.
pub mod arr_http;

/// Radarr/Sonarr data-source adapters.
pub mod media_adapter;

pub use arr_http::ArrHttp;
pub use media_adapter::{ArrAdapter, ServiceKind, TestOutcome};
