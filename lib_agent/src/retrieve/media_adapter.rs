//! # Media-Manager Adapters
//!
//! Per-service clients wrapping the Radarr (movies) and Sonarr (series) REST
//! APIs behind one uniform capability surface: connectivity test, item
//! enumeration, activity/health, comprehensive snapshot, cross-reference-ID
//! catalog, add-item, and the server-side configuration bundle (quality
//! profiles and root folders).
//!
//! An adapter starts unconfigured and can be (re)configured in place at any
//! time; reconfiguration swaps the HTTP client atomically and only affects
//! calls issued afterwards, never one already in flight.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::error::AgentError;
use crate::retrieve::arr_http::ArrHttp;

/// Which upstream service an adapter talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// Movie manager (Radarr).
    Radarr,
    /// Series manager (Sonarr).
    Sonarr,
}

impl ServiceKind {
    /// Topic/wire name of the service.
    pub fn name(self) -> &'static str {
        match self {
            Self::Radarr => "radarr",
            Self::Sonarr => "sonarr",
        }
    }

    /// Human-readable name for status messages.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Radarr => "Radarr",
            Self::Sonarr => "Sonarr",
        }
    }

    fn items_path(self) -> &'static str {
        match self {
            Self::Radarr => "api/v3/movie",
            Self::Sonarr => "api/v3/series",
        }
    }

    fn items_key(self) -> &'static str {
        match self {
            Self::Radarr => "movies",
            Self::Sonarr => "series",
        }
    }
}

/// Result of a connectivity probe against the upstream service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SystemStatus {
    #[serde(default)]
    version: String,
}

struct Configured {
    http: ArrHttp,
    url: String,
}

/// A data-source adapter for one media manager instance.
pub struct ArrAdapter {
    kind: ServiceKind,
    inner: RwLock<Option<Configured>>,
}

impl ArrAdapter {
    /// Creates an unconfigured adapter for the given service.
    pub fn new(kind: ServiceKind) -> Self {
        Self {
            kind,
            inner: RwLock::new(None),
        }
    }

    /// Which service this adapter targets.
    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    /// (Re)configures the adapter with a fresh HTTP client.
    pub async fn configure(&self, url: &str, api_key: &str) -> Result<(), AgentError> {
        self.install(ArrHttp::new(url, api_key)?, url).await;
        Ok(())
    }

    /// Like [`configure`](Self::configure) with an explicit retry budget.
    pub async fn configure_with_retries(
        &self,
        url: &str,
        api_key: &str,
        max_retries: u32,
    ) -> Result<(), AgentError> {
        self.install(ArrHttp::with_retries(url, api_key, max_retries)?, url).await;
        Ok(())
    }

    async fn install(&self, http: ArrHttp, url: &str) {
        let mut guard = self.inner.write().await;
        *guard = Some(Configured {
            http,
            url: url.trim_end_matches('/').to_string(),
        });
        log::info!("{} adapter configured for {}", self.kind.display_name(), url);
    }

    /// Whether a url+key pair has been applied.
    pub async fn is_configured(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// The configured base URL, if any.
    pub async fn url(&self) -> Option<String> {
        self.inner.read().await.as_ref().map(|c| c.url.clone())
    }

    /// Clones the HTTP client out so no lock is held across network awaits.
    async fn http(&self) -> Result<ArrHttp, AgentError> {
        self.inner
            .read()
            .await
            .as_ref()
            .map(|c| c.http.clone())
            .ok_or(AgentError::NotConfigured(self.kind.name()))
    }

    /// Probes the upstream system-status endpoint.
    ///
    /// Never fails: an unreachable service is reported as an unsuccessful
    /// outcome so status heartbeats can carry it as "disconnected".
    pub async fn test_connection(&self) -> TestOutcome {
        let http = match self.http().await {
            Ok(http) => http,
            Err(_) => {
                return TestOutcome {
                    success: false,
                    message: format!("{} is not configured", self.kind.display_name()),
                    version: None,
                }
            }
        };
        match http.get_json::<SystemStatus>("api/v3/system/status").await {
            Ok(status) => TestOutcome {
                success: true,
                message: format!("Connected to {} v{}", self.kind.display_name(), status.version),
                version: Some(status.version),
            },
            Err(e) => TestOutcome {
                success: false,
                message: format!("Failed to connect to {}: {e}", self.kind.display_name()),
                version: None,
            },
        }
    }

    /// All library items (movies or series).
    pub async fn items(&self) -> Result<Value, AgentError> {
        self.http().await?.get_json(self.kind.items_path()).await
    }

    /// Recent history ("activity") page.
    pub async fn activity(&self, page: u32, page_size: u32) -> Result<Value, AgentError> {
        self.http()
            .await?
            .get_json_with_query(
                "api/v3/history",
                &[
                    ("page", page.to_string()),
                    ("pageSize", page_size.to_string()),
                    ("sortKey", "date".to_string()),
                    ("sortDirection", "descending".to_string()),
                ],
            )
            .await
    }

    /// Health check messages reported by the service itself.
    pub async fn health(&self) -> Result<Value, AgentError> {
        self.http().await?.get_json("api/v3/health").await
    }

    async fn system_status(&self) -> Result<Value, AgentError> {
        self.http().await?.get_json("api/v3/system/status").await
    }

    async fn disk_space(&self) -> Result<Value, AgentError> {
        self.http().await?.get_json("api/v3/diskspace").await
    }

    async fn quality_profiles(&self) -> Result<Value, AgentError> {
        self.http().await?.get_json("api/v3/qualityprofile").await
    }

    async fn root_folders(&self) -> Result<Value, AgentError> {
        self.http().await?.get_json("api/v3/rootfolder").await
    }

    async fn queue(&self) -> Result<Value, AgentError> {
        self.http().await?.get_json("api/v3/queue").await
    }

    /// A comprehensive snapshot of the installation.
    ///
    /// Settle-all over the individual endpoints: one failing endpoint leaves
    /// a default in its slot rather than failing the snapshot. Fails only
    /// when the adapter is unconfigured.
    pub async fn comprehensive_snapshot(&self) -> Result<Value, AgentError> {
        // Reject unconfigured adapters up front rather than eight times over.
        let _ = self.http().await?;

        let (items, activity, system_status, health, disk_space, quality_profiles, root_folders, queue) = tokio::join!(
            self.items(),
            self.activity(1, 20),
            self.system_status(),
            self.health(),
            self.disk_space(),
            self.quality_profiles(),
            self.root_folders(),
            self.queue(),
        );

        let items = settle(self.kind, "items", items, json!([]));
        let statistics = self.statistics(&items);

        Ok(json!({
            self.kind.items_key(): items,
            "activity": settle(self.kind, "activity", activity, json!({"records": []})),
            "systemStatus": settle(self.kind, "systemStatus", system_status, Value::Null),
            "health": settle(self.kind, "health", health, json!([])),
            "diskSpace": settle(self.kind, "diskSpace", disk_space, json!([])),
            "qualityProfiles": settle(self.kind, "qualityProfiles", quality_profiles, json!([])),
            "rootFolders": settle(self.kind, "rootFolders", root_folders, json!([])),
            "queue": settle(self.kind, "queue", queue, json!({"records": []})),
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "statistics": statistics,
        }))
    }

    fn statistics(&self, items: &Value) -> Value {
        let empty = Vec::new();
        let list = items.as_array().unwrap_or(&empty);
        let monitored = list
            .iter()
            .filter(|i| i["monitored"].as_bool().unwrap_or(false))
            .count();
        let size_on_disk: i64 = list
            .iter()
            .map(|i| {
                i["sizeOnDisk"]
                    .as_i64()
                    .or_else(|| i["statistics"]["sizeOnDisk"].as_i64())
                    .unwrap_or(0)
            })
            .sum();
        match self.kind {
            ServiceKind::Radarr => {
                let downloaded = list
                    .iter()
                    .filter(|i| i["hasFile"].as_bool().unwrap_or(false))
                    .count();
                json!({
                    "totalMovies": list.len(),
                    "monitoredMovies": monitored,
                    "downloadedMovies": downloaded,
                    "totalSizeOnDisk": size_on_disk,
                })
            }
            ServiceKind::Sonarr => {
                let ended = list
                    .iter()
                    .filter(|i| i["ended"].as_bool().unwrap_or(false))
                    .count();
                json!({
                    "totalSeries": list.len(),
                    "monitoredSeries": monitored,
                    "endedSeries": ended,
                    "totalSizeOnDisk": size_on_disk,
                })
            }
        }
    }

    /// The lightweight cross-reference-ID subset published each cycle so the
    /// control plane can diff collections without the full snapshot.
    pub async fn id_catalog(&self) -> Result<Value, AgentError> {
        let items = self.items().await?;
        let empty = Vec::new();
        let list = items.as_array().unwrap_or(&empty);

        let mapped: Vec<Value> = match self.kind {
            ServiceKind::Radarr => list
                .iter()
                .filter(|m| m["tmdbId"].as_i64().unwrap_or(0) > 0)
                .map(|m| {
                    json!({
                        "tmdbId": m["tmdbId"],
                        "imdbId": m["imdbId"],
                        "title": m["title"],
                        "year": m["year"],
                        "monitored": m["monitored"],
                        "hasFile": m["hasFile"],
                        "status": m["status"],
                        "added": m["added"],
                        "sizeOnDisk": m["sizeOnDisk"].as_i64().unwrap_or(0),
                    })
                })
                .collect(),
            ServiceKind::Sonarr => list
                .iter()
                .filter(|s| s["tvdbId"].as_i64().unwrap_or(0) > 0)
                .map(|s| {
                    json!({
                        "tvdbId": s["tvdbId"],
                        "imdbId": s["imdbId"],
                        "title": s["title"],
                        "year": s["year"],
                        "firstAired": s["firstAired"],
                        "monitored": s["monitored"],
                        "status": s["status"],
                        "ended": s["ended"],
                        "added": s["added"],
                        "seasonCount": s["statistics"]["seasonCount"].as_i64().unwrap_or(0),
                        "episodeCount": s["statistics"]["episodeCount"].as_i64().unwrap_or(0),
                        "episodeFileCount": s["statistics"]["episodeFileCount"].as_i64().unwrap_or(0),
                        "sizeOnDisk": s["statistics"]["sizeOnDisk"].as_i64().unwrap_or(0),
                    })
                })
                .collect(),
        };

        Ok(json!({
            self.kind.items_key(): mapped,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "totalCount": mapped.len(),
        }))
    }

    /// Adds an item to the library.
    ///
    /// Root folder and quality profile default to the first ones the server
    /// reports unless the request names them. Returns a `{success, message,
    /// data?}` payload either way; only an unconfigured adapter is an error.
    pub async fn add_item(&self, request: &Value) -> Result<Value, AgentError> {
        let _ = self.http().await?;
        let title = request["title"].as_str().unwrap_or("(untitled)").to_string();

        let (root_folders, quality_profiles) = tokio::join!(self.root_folders(), self.quality_profiles());
        let root_folders = root_folders.unwrap_or_else(|_| json!([]));
        let quality_profiles = quality_profiles.unwrap_or_else(|_| json!([]));

        let root_folder_path = request["rootFolderPath"]
            .as_str()
            .map(str::to_string)
            .or_else(|| root_folders[0]["path"].as_str().map(str::to_string))
            .unwrap_or_default();
        let quality_profile_id = request["qualityProfile"]
            .as_i64()
            .or_else(|| quality_profiles[0]["id"].as_i64())
            .unwrap_or(1);
        let monitored = request["monitored"].as_bool().unwrap_or(true);
        let search = request["searchForMissing"].as_bool().unwrap_or(true);
        let year = request["year"]
            .as_i64()
            .unwrap_or_else(|| i64::from(chrono::Datelike::year(&chrono::Utc::now())));

        let body = match self.kind {
            ServiceKind::Radarr => json!({
                "title": title,
                "tmdbId": request["tmdbId"],
                "year": year,
                "qualityProfileId": quality_profile_id,
                "rootFolderPath": root_folder_path,
                "monitored": monitored,
                "minimumAvailability": "announced",
                "tags": [],
                "addOptions": {
                    "monitor": if monitored { "movieOnly" } else { "none" },
                    "searchForMovie": search,
                },
            }),
            ServiceKind::Sonarr => json!({
                "title": title,
                "tvdbId": request["tvdbId"],
                "qualityProfileId": quality_profile_id,
                "rootFolderPath": root_folder_path,
                "monitored": monitored,
                "seasonFolder": true,
                "tags": [],
                "addOptions": {
                    "monitor": if monitored { "all" } else { "none" },
                    "searchForMissingEpisodes": search,
                },
            }),
        };

        match self.http().await?.post_json::<Value, _>(self.kind.items_path(), &body).await {
            Ok(data) => Ok(json!({
                "success": true,
                "message": format!("Successfully added \"{title}\" to {}", self.kind.display_name()),
                "data": data,
            })),
            Err(e) => Ok(json!({
                "success": false,
                "message": format!("Failed to add \"{title}\" to {}: {e}", self.kind.display_name()),
                "error": e.to_string(),
            })),
        }
    }

    /// The server-side configuration bundle: root folders and quality
    /// profiles, trimmed to the fields the control plane renders.
    pub async fn server_config(&self) -> Result<Value, AgentError> {
        let _ = self.http().await?;
        let (root_folders, quality_profiles) = tokio::join!(self.root_folders(), self.quality_profiles());
        let root_folders = root_folders?;
        let quality_profiles = quality_profiles?;

        let empty = Vec::new();
        let folders: Vec<Value> = root_folders
            .as_array()
            .unwrap_or(&empty)
            .iter()
            .map(|f| {
                json!({
                    "id": f["id"],
                    "path": f["path"],
                    "freeSpace": f["freeSpace"].as_i64().unwrap_or(0),
                    "unmappedFolders": f["unmappedFolders"].as_array().cloned().unwrap_or_default(),
                })
            })
            .collect();
        let profiles: Vec<Value> = quality_profiles
            .as_array()
            .unwrap_or(&empty)
            .iter()
            .map(|p| {
                json!({
                    "id": p["id"],
                    "name": p["name"],
                    "cutoff": p.get("cutoff").cloned().unwrap_or_else(|| json!({})),
                    "items": p["items"].as_array().cloned().unwrap_or_default(),
                })
            })
            .collect();

        Ok(json!({
            "success": true,
            "data": {
                "service": self.kind.name(),
                "rootFolders": folders,
                "qualityProfiles": profiles,
            },
        }))
    }
}

fn settle(kind: ServiceKind, slot: &str, result: Result<Value, AgentError>, default: Value) -> Value {
    match result {
        Ok(v) => v,
        Err(e) => {
            log::warn!("{} snapshot slot {slot} failed: {e}", kind.display_name());
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_adapter_reports_not_configured() {
        let adapter = ArrAdapter::new(ServiceKind::Radarr);
        assert!(!adapter.is_configured().await);

        let outcome = adapter.test_connection().await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("not configured"));

        let err = adapter.items().await.unwrap_err();
        assert_eq!(err.to_string(), "Service not configured");
    }

    #[tokio::test]
    async fn configure_makes_adapter_configured() {
        let adapter = ArrAdapter::new(ServiceKind::Sonarr);
        adapter.configure("http://localhost:8989", "key").await.unwrap();
        assert!(adapter.is_configured().await);
        assert_eq!(adapter.url().await.as_deref(), Some("http://localhost:8989"));

        // Reconfiguring swaps the target in place.
        adapter.configure("http://other:8989/", "key2").await.unwrap();
        assert_eq!(adapter.url().await.as_deref(), Some("http://other:8989"));
    }

    #[test]
    fn statistics_shapes_follow_service_kind() {
        let radarr = ArrAdapter::new(ServiceKind::Radarr);
        let stats = radarr.statistics(&json!([
            {"monitored": true, "hasFile": true, "sizeOnDisk": 10},
            {"monitored": false, "hasFile": false, "sizeOnDisk": 5},
        ]));
        assert_eq!(stats["totalMovies"], 2);
        assert_eq!(stats["monitoredMovies"], 1);
        assert_eq!(stats["downloadedMovies"], 1);
        assert_eq!(stats["totalSizeOnDisk"], 15);

        let sonarr = ArrAdapter::new(ServiceKind::Sonarr);
        let stats = sonarr.statistics(&json!([
            {"monitored": true, "ended": true, "statistics": {"sizeOnDisk": 7}},
        ]));
        assert_eq!(stats["totalSeries"], 1);
        assert_eq!(stats["endedSeries"], 1);
        assert_eq!(stats["totalSizeOnDisk"], 7);
    }
}
