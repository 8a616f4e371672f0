//! # Data Collection Scheduler
//!
//! The recurring cycle that keeps the control plane informed independently
//! of command traffic. Every period it publishes a status heartbeat built by
//! live-probing the configured adapters, then fans out per-adapter data
//! pushes: the comprehensive snapshot, the cross-reference-ID catalog, and
//! the server configuration bundle.
//!
//! The fan-out settles all tasks: every launched task runs to completion and
//! reports its own outcome, so one adapter's failure never cancels or delays
//! the other's publishes, nor the next cycle. The same cycle body backs the
//! `force-sync` command, which reports the per-task outcomes to its caller
//! instead of only logging them.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, RwLock};
use tokio::time::interval;

use crate::connections::broker_mqtt::SessionState;
use crate::core::envelopes::{now_millis, DataEnvelope, ServiceStatus, StatusEnvelope};
use crate::core::publisher::Publisher;
use crate::error::AgentError;
use crate::retrieve::media_adapter::ArrAdapter;

/// Seconds between collection cycles.
pub const COLLECTION_INTERVAL_SECS: u64 = 30;

/// One fan-out slot of a collection cycle.
#[derive(Debug, Clone, Copy)]
enum CycleTask {
    Comprehensive,
    IdCatalog,
    ServerConfig,
}

impl CycleTask {
    const ALL: [Self; 3] = [Self::Comprehensive, Self::IdCatalog, Self::ServerConfig];

    fn endpoint(self) -> &'static str {
        match self {
            Self::Comprehensive => "comprehensive",
            Self::IdCatalog => "tmdb-ids",
            Self::ServerConfig => "server-config",
        }
    }
}

/// Outcome of one fan-out task, reported back by `force-sync`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub service: String,
    pub task: String,
    pub success: bool,
    pub message: String,
}

/// Runs the periodic heartbeat and data-collection fan-out.
pub struct Collector {
    radarr: Arc<ArrAdapter>,
    sonarr: Arc<ArrAdapter>,
    publisher: Arc<Publisher>,
    state: Arc<RwLock<SessionState>>,
}

impl Collector {
    pub fn new(
        radarr: Arc<ArrAdapter>,
        sonarr: Arc<ArrAdapter>,
        publisher: Arc<Publisher>,
        state: Arc<RwLock<SessionState>>,
    ) -> Self {
        Self {
            radarr,
            sonarr,
            publisher,
            state,
        }
    }

    /// The scheduler loop. Runs until the session shutdown signal fires;
    /// ticks where the session is not `Connected` are skipped entirely.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(Duration::from_secs(COLLECTION_INTERVAL_SECS));
        // The first tick completes immediately; the engine already emitted
        // the initial heartbeat on subscription, so consume it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    log::info!("Collection scheduler received shutdown signal.");
                    break;
                }
                _ = ticker.tick() => {
                    if *self.state.read().await != SessionState::Connected {
                        continue;
                    }
                    self.heartbeat("online").await;
                    let outcomes = self.collect_all().await;
                    for outcome in outcomes.iter().filter(|o| !o.success) {
                        log::warn!("Cycle task {}/{} failed: {}", outcome.service, outcome.task, outcome.message);
                    }
                }
            }
        }
    }

    /// Publishes a status heartbeat built by live-probing both adapters.
    ///
    /// A probe failure shows up as a `disconnected` entry; it is never a
    /// scheduler fault. Unconfigured adapters are left out of the map.
    pub async fn heartbeat(&self, connection_state: &str) {
        let (radarr_entry, sonarr_entry) =
            tokio::join!(service_entry(&self.radarr), service_entry(&self.sonarr));

        let mut services = std::collections::BTreeMap::new();
        if let Some(entry) = radarr_entry {
            services.insert(self.radarr.kind().name().to_string(), entry);
        }
        if let Some(entry) = sonarr_entry {
            services.insert(self.sonarr.kind().name().to_string(), entry);
        }

        let envelope = StatusEnvelope {
            agent_id: self.publisher.agent_id().to_string(),
            timestamp: now_millis(),
            services,
            connection_state: connection_state.to_string(),
        };
        self.publisher.publish_status(&envelope).await;
    }

    /// One cycle body: fan out every task for every configured adapter and
    /// settle them all, collecting a per-task outcome.
    pub async fn collect_all(&self) -> Vec<SyncOutcome> {
        let mut tasks = Vec::new();
        for adapter in [&self.radarr, &self.sonarr] {
            if !adapter.is_configured().await {
                continue;
            }
            for task in CycleTask::ALL {
                tasks.push(self.run_task(adapter, task).boxed());
            }
        }
        join_all(tasks).await
    }

    /// Runs the cycle body immediately, outside the timer, and reports the
    /// outcome per adapter task. Zero configured adapters is a success with
    /// an empty outcome list.
    pub async fn force_sync(&self) -> Value {
        log::info!("Force syncing all data...");
        let outcomes = self.collect_all().await;
        let success = outcomes.iter().all(|o| o.success);
        json!({
            "success": success,
            "message": if success { "All data synced successfully" } else { "One or more sync tasks failed" },
            "results": outcomes,
        })
    }

    /// Fetches and publishes one adapter's comprehensive snapshot, reporting
    /// how many top-level data points it carried. Backs the
    /// `collect-<service>-data` commands.
    pub async fn collect_service(&self, adapter: &ArrAdapter) -> Result<Value, AgentError> {
        let snapshot = adapter.comprehensive_snapshot().await?;
        let data_points = snapshot.as_object().map_or(0, |o| o.len());
        self.publish_payload(adapter, CycleTask::Comprehensive.endpoint(), snapshot)
            .await;
        Ok(json!({ "success": true, "dataPoints": data_points }))
    }

    async fn run_task(&self, adapter: &ArrAdapter, task: CycleTask) -> SyncOutcome {
        let service = adapter.kind().name().to_string();
        let result = match task {
            CycleTask::Comprehensive => adapter.comprehensive_snapshot().await,
            CycleTask::IdCatalog => adapter.id_catalog().await,
            CycleTask::ServerConfig => adapter.server_config().await.and_then(|wrapper| {
                if wrapper["success"].as_bool().unwrap_or(false) {
                    Ok(wrapper["data"].clone())
                } else {
                    Err(AgentError::Upstream(format!(
                        "failed to fetch {} server configuration",
                        adapter.kind().display_name()
                    )))
                }
            }),
        };

        match result {
            Ok(data) => {
                self.publish_payload(adapter, task.endpoint(), data).await;
                SyncOutcome {
                    service,
                    task: task.endpoint().to_string(),
                    success: true,
                    message: "ok".to_string(),
                }
            }
            Err(e) => SyncOutcome {
                service,
                task: task.endpoint().to_string(),
                success: false,
                message: e.to_string(),
            },
        }
    }

    async fn publish_payload(&self, adapter: &ArrAdapter, endpoint: &str, data: Value) {
        let envelope = DataEnvelope {
            endpoint: endpoint.to_string(),
            data,
            timestamp: now_millis(),
            agent_id: self.publisher.agent_id().to_string(),
        };
        self.publisher.publish_data(adapter.kind().name(), &envelope).await;
    }
}

/// Builds one adapter's heartbeat entry, `None` when unconfigured.
async fn service_entry(adapter: &ArrAdapter) -> Option<ServiceStatus> {
    let url = adapter.url().await?;
    let probe = adapter.test_connection().await;
    Some(ServiceStatus {
        status: if probe.success { "connected" } else { "disconnected" }.to_string(),
        name: adapter.kind().display_name().to_string(),
        message: if probe.success {
            "Service is running".to_string()
        } else {
            "Service offline or unreachable".to_string()
        },
        version: probe.version,
        last_check: chrono::Utc::now().to_rfc3339(),
        url: Some(url),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieve::media_adapter::ServiceKind;

    fn collector_with_capture(
        state: SessionState,
    ) -> (
        Arc<Collector>,
        Arc<RwLock<SessionState>>,
        tokio::sync::mpsc::UnboundedReceiver<crate::core::publisher::CapturedPublish>,
    ) {
        let state = Arc::new(RwLock::new(state));
        let (publisher, rx) = Publisher::capture("A1".to_string(), state.clone());
        let collector = Arc::new(Collector::new(
            Arc::new(ArrAdapter::new(ServiceKind::Radarr)),
            Arc::new(ArrAdapter::new(ServiceKind::Sonarr)),
            Arc::new(publisher),
            state.clone(),
        ));
        (collector, state, rx)
    }

    #[tokio::test]
    async fn force_sync_with_zero_adapters_is_an_empty_success() {
        let (collector, _state, _rx) = collector_with_capture(SessionState::Connected);
        let report = collector.force_sync().await;
        assert_eq!(report["success"], true);
        assert_eq!(report["results"], json!([]));
    }

    #[tokio::test]
    async fn heartbeat_skips_unconfigured_adapters() {
        let (collector, _state, mut rx) = collector_with_capture(SessionState::Connected);
        collector.heartbeat("online").await;
        let captured = rx.try_recv().unwrap();
        assert_eq!(captured.topic, "agents/A1/status");
        assert_eq!(captured.payload["services"], json!({}));
        assert_eq!(captured.payload["connectionState"], "online");
        assert_eq!(captured.payload["agentId"], "A1");
    }

    #[tokio::test]
    async fn a_failing_adapter_never_blocks_the_heartbeat_or_other_slots() {
        let (collector, _state, mut rx) = collector_with_capture(SessionState::Connected);
        // Nothing listens on this port, so every radarr call fails fast.
        collector
            .radarr
            .configure_with_retries("http://127.0.0.1:1", "key", 0)
            .await
            .unwrap();

        // The heartbeat still publishes, carrying the failing service as a
        // disconnected entry rather than faulting the cycle.
        collector.heartbeat("online").await;
        let heartbeat = rx.try_recv().unwrap();
        assert_eq!(heartbeat.topic, "agents/A1/status");
        assert_eq!(heartbeat.payload["connectionState"], "online");
        assert_eq!(heartbeat.payload["services"]["radarr"]["status"], "disconnected");

        // Every slot settles with its own outcome; the unconfigured adapter
        // contributes none and is unaffected.
        let report = collector.force_sync().await;
        assert_eq!(report["success"], false);
        let results = report["results"].as_array().unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|o| o["service"] == "radarr"));
        let by_task = |name: &str| results.iter().find(|o| o["task"] == name).unwrap();
        // The comprehensive snapshot settles per endpoint, defaulting the
        // failed slots, so it still publishes; the catalog and server-config
        // slots report their failures instead of faulting the cycle.
        assert_eq!(by_task("comprehensive")["success"], true);
        assert_eq!(by_task("tmdb-ids")["success"], false);
        assert_eq!(by_task("server-config")["success"], false);

        // The surviving slot's envelope went out despite its siblings.
        let published = rx.try_recv().unwrap();
        assert_eq!(published.topic, "agents/A1/data/radarr");
        assert_eq!(published.payload["endpoint"], "comprehensive");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_ticks_while_connected_and_stops_on_shutdown() {
        let (collector, _state, mut rx) = collector_with_capture(SessionState::Connected);
        let (shutdown_tx, _) = broadcast::channel(1);
        let handle = tokio::spawn(collector.clone().run(shutdown_tx.subscribe()));

        // One full interval elapses: exactly one heartbeat.
        tokio::time::sleep(Duration::from_secs(COLLECTION_INTERVAL_SECS + 1)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        // After shutdown the timer is cancelled for good.
        shutdown_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_secs(3 * COLLECTION_INTERVAL_SECS)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_never_runs_while_not_connected() {
        let (collector, state, mut rx) = collector_with_capture(SessionState::Reconnecting);
        let (shutdown_tx, _) = broadcast::channel(1);
        tokio::spawn(collector.clone().run(shutdown_tx.subscribe()));

        tokio::time::sleep(Duration::from_secs(2 * COLLECTION_INTERVAL_SECS + 1)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        // Once the session is connected again the cycle resumes.
        *state.write().await = SessionState::Connected;
        tokio::time::sleep(Duration::from_secs(COLLECTION_INTERVAL_SECS + 1)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_ok());
    }
}
