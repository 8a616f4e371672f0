//! # Durable Configuration Store
//!
//! Persists the [`AgentConfig`] as pretty-printed JSON under a data
//! directory so a restarted agent can rejoin the control plane without being
//! reconfigured. Save failures are surfaced to the caller but are treated as
//! non-fatal by the engine: the in-memory config stays authoritative for the
//! running session.

use std::fs;
use std::path::{Path, PathBuf};

use crate::configs::agent_config::AgentConfig;
use crate::error::AgentError;

const CONFIG_FILE_NAME: &str = "agent-config.json";

/// File-backed load/save/clear of the agent configuration.
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Creates a store rooted at `data_dir`, creating the directory if needed.
    pub fn new(data_dir: &Path) -> Result<Self, AgentError> {
        if !data_dir.exists() {
            fs::create_dir_all(data_dir)?;
        }
        Ok(Self {
            config_path: data_dir.join(CONFIG_FILE_NAME),
        })
    }

    /// Creates a store in the platform data directory, falling back to
    /// `./data` when no platform directory is available.
    pub fn in_default_location() -> Result<Self, AgentError> {
        let data_dir = dirs::data_dir()
            .map(|d| d.join("reacharr-agent"))
            .unwrap_or_else(|| PathBuf::from("./data"));
        Self::new(&data_dir)
    }

    /// The path of the backing file, for diagnostics.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Loads the persisted configuration, `None` when no file exists yet.
    pub fn load(&self) -> Result<Option<AgentConfig>, AgentError> {
        if !self.config_path.exists() {
            log::info!("No persisted agent configuration at {:?}", self.config_path);
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.config_path)?;
        let config: AgentConfig = serde_json::from_str(&raw).map_err(std::io::Error::other)?;
        log::info!("Loaded persisted configuration for agent {}", config.agent_id);
        Ok(Some(config))
    }

    /// Writes the configuration to disk, replacing any previous record.
    pub fn save(&self, config: &AgentConfig) -> Result<(), AgentError> {
        let raw = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;
        fs::write(&self.config_path, raw)?;
        log::info!("Agent configuration saved to {:?}", self.config_path);
        Ok(())
    }

    /// Removes the persisted configuration, if any.
    pub fn clear(&self) -> Result<(), AgentError> {
        if self.config_path.exists() {
            fs::remove_file(&self.config_path)?;
            log::info!("Persisted configuration cleared");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_clear_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path()).unwrap();

        assert!(store.load().unwrap().is_none());

        let config = AgentConfig {
            agent_id: "owner1_abc".to_string(),
            radarr_url: Some("http://localhost:7878".to_string()),
            radarr_api_key: Some("rkey".to_string()),
            ..Default::default()
        };
        store.save(&config).unwrap();
        assert_eq!(store.load().unwrap(), Some(config));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path()).unwrap();
        fs::write(store.config_path(), "{not json").unwrap();
        assert!(store.load().is_err());
    }
}
