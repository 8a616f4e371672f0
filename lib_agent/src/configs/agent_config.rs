//! # Agent Configuration Record
//!
//! The configuration record exchanged with the control plane and persisted
//! between runs. Field names are camelCase on the wire, matching the
//! envelopes the control plane sends. Partial updates arrive as an
//! [`AgentConfigPatch`] and are merged field-by-field, `Some` winning over
//! the current value.

use serde::{Deserialize, Serialize};

/// Broker credentials obtained out-of-band once per session.
///
/// Held in memory only. The persisted record is [`AgentConfig`]; credentials
/// are never written to disk.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Broker username.
    pub username: String,
    /// Broker password.
    pub password: String,
    /// Broker address, e.g. `mqtt://broker.example.com:1883`.
    pub broker_url: String,
}

/// The agent configuration record.
///
/// `agent_id` has the shape `<ownerId>_<suffix>` and must be non-empty.
/// Each service slot is usable only when both its url and api key are set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radarr_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radarr_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sonarr_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sonarr_api_key: Option<String>,
}

/// A partial configuration update, as carried by the `update-config` command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfigPatch {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub radarr_url: Option<String>,
    #[serde(default)]
    pub radarr_api_key: Option<String>,
    #[serde(default)]
    pub sonarr_url: Option<String>,
    #[serde(default)]
    pub sonarr_api_key: Option<String>,
}

/// Which service slots were touched by an applied patch.
///
/// Drives adapter reinitialization: only the slots whose url/key appeared in
/// the patch get reconfigured, the other adapter keeps its live client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedChanges {
    pub radarr: bool,
    pub sonarr: bool,
}

impl AgentConfig {
    /// A config is usable once it names an agent and at least one service
    /// slot carries both a url and an api key.
    pub fn is_usable(&self) -> bool {
        !self.agent_id.is_empty() && (self.radarr_pair().is_some() || self.sonarr_pair().is_some())
    }

    /// The radarr url+key pair, if both halves are present.
    pub fn radarr_pair(&self) -> Option<(&str, &str)> {
        match (self.radarr_url.as_deref(), self.radarr_api_key.as_deref()) {
            (Some(url), Some(key)) => Some((url, key)),
            _ => None,
        }
    }

    /// The sonarr url+key pair, if both halves are present.
    pub fn sonarr_pair(&self) -> Option<(&str, &str)> {
        match (self.sonarr_url.as_deref(), self.sonarr_api_key.as_deref()) {
            (Some(url), Some(key)) => Some((url, key)),
            _ => None,
        }
    }

    /// Merge a partial update into this config, `Some` fields winning.
    ///
    /// Returns which service slots the patch touched so the caller can
    /// reinitialize only the affected adapters.
    pub fn apply(&mut self, patch: AgentConfigPatch) -> AppliedChanges {
        let changes = AppliedChanges {
            radarr: patch.radarr_url.is_some() || patch.radarr_api_key.is_some(),
            sonarr: patch.sonarr_url.is_some() || patch.sonarr_api_key.is_some(),
        };

        if let Some(agent_id) = patch.agent_id {
            self.agent_id = agent_id;
        }
        self.radarr_url = patch.radarr_url.or(self.radarr_url.take());
        self.radarr_api_key = patch.radarr_api_key.or(self.radarr_api_key.take());
        self.sonarr_url = patch.sonarr_url.or(self.sonarr_url.take());
        self.sonarr_api_key = patch.sonarr_api_key.or(self.sonarr_api_key.take());

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AgentConfig {
        AgentConfig {
            agent_id: "owner1_abc".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn disjoint_patches_union() {
        let mut config = base_config();

        let changes = config.apply(AgentConfigPatch {
            radarr_url: Some("http://localhost:7878".to_string()),
            radarr_api_key: Some("rkey".to_string()),
            ..Default::default()
        });
        assert!(changes.radarr);
        assert!(!changes.sonarr);

        let changes = config.apply(AgentConfigPatch {
            sonarr_url: Some("http://localhost:8989".to_string()),
            sonarr_api_key: Some("skey".to_string()),
            ..Default::default()
        });
        assert!(!changes.radarr);
        assert!(changes.sonarr);

        // Both updates survive: the union of the two patches.
        assert_eq!(config.radarr_pair(), Some(("http://localhost:7878", "rkey")));
        assert_eq!(config.sonarr_pair(), Some(("http://localhost:8989", "skey")));
        assert!(config.is_usable());
    }

    #[test]
    fn patch_does_not_clear_untouched_fields() {
        let mut config = base_config();
        config.radarr_url = Some("http://radarr".to_string());
        config.radarr_api_key = Some("rkey".to_string());

        config.apply(AgentConfigPatch {
            radarr_url: Some("http://radarr-new".to_string()),
            ..Default::default()
        });

        assert_eq!(config.radarr_url.as_deref(), Some("http://radarr-new"));
        assert_eq!(config.radarr_api_key.as_deref(), Some("rkey"));
    }

    #[test]
    fn empty_config_is_not_usable() {
        assert!(!AgentConfig::default().is_usable());
        // An agent id alone is not enough, one service slot must be complete.
        assert!(!base_config().is_usable());
        let mut half = base_config();
        half.radarr_url = Some("http://radarr".to_string());
        assert!(!half.is_usable());
    }

    #[test]
    fn wire_form_is_camel_case() {
        let mut config = base_config();
        config.sonarr_url = Some("http://sonarr".to_string());
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["agentId"], "owner1_abc");
        assert_eq!(json["sonarrUrl"], "http://sonarr");
        // Empty slots are skipped entirely rather than serialized as null.
        assert!(json.get("radarrUrl").is_none());
    }
}
