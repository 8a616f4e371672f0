//! # Command Dispatcher
//!
//! Turns one inbound byte payload from the agent's command topic into
//! exactly one correlated response on the response topic.
//!
//! Decode failures are logged and dropped without a response: a sender whose
//! payload cannot be parsed has no `requestId` to correlate against, so
//! silence is the defined behavior. Everything after a successful decode is
//! answered, including unknown command names and handler failures, which
//! come back as error-shaped payloads rather than dropped messages.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::configs::agent_config::{AgentConfig, AgentConfigPatch};
use crate::configs::config_store::ConfigStore;
use crate::connections::broker_mqtt::SessionState;
use crate::core::collector::Collector;
use crate::core::envelopes::{now_millis, ResponseEnvelope, ServerCommand};
use crate::core::publisher::Publisher;
use crate::error::AgentError;
use crate::retrieve::media_adapter::ArrAdapter;

/// Routes decoded commands to their handlers and publishes the response.
pub struct CommandDispatcher {
    config: Arc<RwLock<AgentConfig>>,
    store: Arc<ConfigStore>,
    radarr: Arc<ArrAdapter>,
    sonarr: Arc<ArrAdapter>,
    publisher: Arc<Publisher>,
    collector: Arc<Collector>,
    state: Arc<RwLock<SessionState>>,
}

impl CommandDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<RwLock<AgentConfig>>,
        store: Arc<ConfigStore>,
        radarr: Arc<ArrAdapter>,
        sonarr: Arc<ArrAdapter>,
        publisher: Arc<Publisher>,
        collector: Arc<Collector>,
        state: Arc<RwLock<SessionState>>,
    ) -> Self {
        Self {
            config,
            store,
            radarr,
            sonarr,
            publisher,
            collector,
            state,
        }
    }

    /// Decodes one inbound payload and answers it with exactly one response.
    pub async fn handle_payload(&self, payload: &[u8]) {
        let command: ServerCommand = match serde_json::from_slice(payload) {
            Ok(command) => command,
            Err(e) => {
                log::warn!("Failed to parse command payload: {e}");
                return;
            }
        };

        let name = command.name().to_string();
        log::info!("Received command: {name}");

        // Handler errors are contained here and answered, never propagated.
        let data = match self.route(&command).await {
            Ok(data) => data,
            Err(e) => {
                log::error!("Error handling command {name}: {e}");
                json!({ "error": e.to_string() })
            }
        };

        let envelope = ResponseEnvelope {
            request_id: command.request_id.clone(),
            command: name,
            data,
            timestamp: now_millis(),
            agent_id: self.publisher.agent_id().to_string(),
        };
        self.publisher.publish_response(&envelope).await;
    }

    async fn route(&self, command: &ServerCommand) -> Result<Value, AgentError> {
        match command.name() {
            "status" => Ok(self.agent_status().await),
            "get-data" => self.get_data(command).await,
            "test-connection" => Ok(self.test_connections().await),
            "update-config" => self.update_config(command).await,
            "collect-radarr-data" => self.collector.collect_service(&self.radarr).await,
            "collect-sonarr-data" => self.collector.collect_service(&self.sonarr).await,
            "force-sync" => Ok(self.collector.force_sync().await),
            "add-item" | "add_item" => {
                let adapter = self.resolve_adapter(command.target_service()).await?;
                adapter.add_item(&command.data).await
            }
            "get-server-config" | "get_server_config" => {
                let adapter = self.resolve_adapter(command.target_service()).await?;
                adapter.server_config().await
            }
            "get-server-info" | "get_server_info" => Ok(self.server_info().await),
            other => Ok(json!({ "error": format!("Unknown command: {other}") })),
        }
    }

    /// Resolves the adapter a command targets, requiring it to be configured.
    async fn resolve_adapter(&self, service: Option<&str>) -> Result<&Arc<ArrAdapter>, AgentError> {
        let adapter = match service {
            Some("radarr") => &self.radarr,
            Some("sonarr") => &self.sonarr,
            _ => return Err(AgentError::InvalidRequest(format!("Unknown service: {}", service.unwrap_or("(none)")))),
        };
        if !adapter.is_configured().await {
            return Err(AgentError::NotConfigured(adapter.kind().name()));
        }
        Ok(adapter)
    }

    async fn agent_status(&self) -> Value {
        let config = self.config.read().await.clone();
        let online = *self.state.read().await == SessionState::Connected;
        let (radarr_probe, sonarr_probe) = tokio::join!(
            probe_if_configured(&self.radarr),
            probe_if_configured(&self.sonarr),
        );

        json!({
            "agentId": config.agent_id,
            "online": online,
            "timestamp": now_millis(),
            "services": {
                "radarr": service_summary(&self.radarr, config.radarr_url.as_deref(), radarr_probe).await,
                "sonarr": service_summary(&self.sonarr, config.sonarr_url.as_deref(), sonarr_probe).await,
            },
        })
    }

    async fn server_info(&self) -> Value {
        let config = self.config.read().await.clone();
        json!({
            "agentId": config.agent_id,
            "online": *self.state.read().await == SessionState::Connected,
            "timestamp": now_millis(),
            "services": {
                "radarr": {
                    "configured": self.radarr.is_configured().await,
                    "url": config.radarr_url,
                },
                "sonarr": {
                    "configured": self.sonarr.is_configured().await,
                    "url": config.sonarr_url,
                },
            },
        })
    }

    async fn get_data(&self, command: &ServerCommand) -> Result<Value, AgentError> {
        let adapter = self.resolve_adapter(command.target_service()).await?;
        let endpoint = command.data["endpoint"].as_str().unwrap_or("comprehensive");
        match endpoint {
            "movies" | "series" => adapter.items().await,
            "activity" => adapter.activity(1, 50).await,
            "health" => adapter.health().await,
            "comprehensive" => adapter.comprehensive_snapshot().await,
            other => Err(AgentError::InvalidRequest(format!(
                "Unknown {} endpoint: {other}",
                adapter.kind().display_name()
            ))),
        }
    }

    async fn test_connections(&self) -> Value {
        let (radarr, sonarr) = tokio::join!(
            probe_if_configured(&self.radarr),
            probe_if_configured(&self.sonarr),
        );
        let (radarr_ok, radarr_detail) = match radarr {
            Some(outcome) => (outcome.success, outcome.message),
            None => (false, "Not configured".to_string()),
        };
        let (sonarr_ok, sonarr_detail) = match sonarr {
            Some(outcome) => (outcome.success, outcome.message),
            None => (false, "Not configured".to_string()),
        };
        json!({
            "radarr": radarr_ok,
            "sonarr": sonarr_ok,
            "details": { "radarr": radarr_detail, "sonarr": sonarr_detail },
        })
    }

    /// Merges a partial update into the live config, persists it, and
    /// reinitializes only the adapters whose url/key the patch touched.
    async fn update_config(&self, command: &ServerCommand) -> Result<Value, AgentError> {
        let patch: AgentConfigPatch = serde_json::from_value(command.data.clone())
            .map_err(|e| AgentError::InvalidRequest(format!("Invalid config update: {e}")))?;

        let (updated, changes) = {
            let mut config = self.config.write().await;
            let changes = config.apply(patch);
            (config.clone(), changes)
        };

        // Persistence failure is logged, not fatal: the in-memory config
        // stays authoritative for the running session.
        if let Err(e) = self.store.save(&updated) {
            log::error!("Failed to save updated configuration: {e}");
        }

        if changes.radarr {
            if let Some((url, key)) = updated.radarr_pair() {
                self.radarr.configure(url, key).await?;
            }
        }
        if changes.sonarr {
            if let Some((url, key)) = updated.sonarr_pair() {
                self.sonarr.configure(url, key).await?;
            }
        }

        Ok(json!({ "success": true, "config": updated }))
    }
}

async fn probe_if_configured(adapter: &ArrAdapter) -> Option<crate::retrieve::media_adapter::TestOutcome> {
    if adapter.is_configured().await {
        Some(adapter.test_connection().await)
    } else {
        None
    }
}

async fn service_summary(
    adapter: &ArrAdapter,
    url: Option<&str>,
    probe: Option<crate::retrieve::media_adapter::TestOutcome>,
) -> Value {
    json!({
        "configured": adapter.is_configured().await,
        "url": url,
        "connected": probe.as_ref().map(|p| p.success).unwrap_or(false),
        "version": probe.and_then(|p| p.version),
    })
}
