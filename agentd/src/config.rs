use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Reacharr local agent daemon", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "AGENT_ID", help = "Stable identity of this agent on the control plane.")]
    pub agent_id: Option<String>,

    #[clap(long, env = "AGENT_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "AGENT_DATA_DIR", help = "Directory for the persisted agent config.")]
    pub data_dir: Option<PathBuf>,

    #[clap(long, env = "AGENT_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "AGENT_LOG_LEVEL", help = "Logging level (debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "MQTT_BROKER_URL", help = "Broker URL, e.g. mqtt://host:1883.")]
    pub mqtt_broker_url: Option<String>,

    #[clap(long, env = "MQTT_USERNAME", help = "Broker username.")]
    pub mqtt_username: Option<String>,

    #[clap(long, env = "MQTT_PASSWORD", help = "Broker password.")]
    pub mqtt_password: Option<String>,

    #[clap(long, env = "RADARR_URL", help = "Base URL of the local Radarr instance.")]
    pub radarr_url: Option<String>,

    #[clap(long, env = "RADARR_API_KEY", help = "API key for the local Radarr instance.")]
    pub radarr_api_key: Option<String>,

    #[clap(long, env = "SONARR_URL", help = "Base URL of the local Sonarr instance.")]
    pub sonarr_url: Option<String>,

    #[clap(long, env = "SONARR_API_KEY", help = "API key for the local Sonarr instance.")]
    pub sonarr_api_key: Option<String>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            agent_id: other.agent_id.or(self.agent_id),
            config_path: other.config_path.or(self.config_path),
            data_dir: other.data_dir.or(self.data_dir),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            mqtt_broker_url: other.mqtt_broker_url.or(self.mqtt_broker_url),
            mqtt_username: other.mqtt_username.or(self.mqtt_username),
            mqtt_password: other.mqtt_password.or(self.mqtt_password),
            radarr_url: other.radarr_url.or(self.radarr_url),
            radarr_api_key: other.radarr_api_key.or(self.radarr_api_key),
            sonarr_url: other.sonarr_url.or(self.sonarr_url),
            sonarr_api_key: other.sonarr_api_key.or(self.sonarr_api_key),
        }
    }
}

pub fn load_config() -> Config {
    // 1. Load defaults
    let default_config = Config {
        log_dir: Some(PathBuf::from("./logs")),
        log_level: Some("info".to_string()),
        ..Default::default()
    };

    // 2. Load from config file (agentd.conf) if present.
    //    Allow overriding default config file path with CLI arg.
    let cli_args_for_path = Config::parse();

    let config_file_path = cli_args_for_path
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("agentd.conf"));

    let mut current_config = default_config;

    if config_file_path.exists() {
        if let Ok(config_str) = fs::read_to_string(&config_file_path) {
            if let Ok(file_config) = serde_json::from_str::<Config>(&config_str) {
                current_config = current_config.merge(file_config);
            } else {
                log::warn!(
                    "Failed to parse config file: {}. Falling back to other sources.",
                    config_file_path.display()
                );
            }
        } else {
            log::warn!(
                "Failed to read config file: {}. Falling back to other sources.",
                config_file_path.display()
            );
        }
    }

    // 3. Override with environment variables and CLI arguments.
    //    clap::Parser handles both, and they win over the file.
    current_config.merge(cli_args_for_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_the_override_side() {
        let base = Config {
            agent_id: Some("stored".to_string()),
            log_level: Some("info".to_string()),
            ..Default::default()
        };
        let over = Config {
            agent_id: Some("cli".to_string()),
            ..Default::default()
        };
        let merged = base.merge(over);
        assert_eq!(merged.agent_id.as_deref(), Some("cli"));
        assert_eq!(merged.log_level.as_deref(), Some("info"));
    }
}
