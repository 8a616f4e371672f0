use anyhow::{bail, Context, Result};
use tokio::signal;

use lib_agent::configs::{AgentConfig, AgentConfigPatch, ConfigStore, Credentials};
use lib_agent::core::{AgentEngine, AgentNotification};
use lib_agent::loggers;

mod config;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config();
    let log_dir = config.log_dir.clone().unwrap_or_else(|| "./logs".into());
    let log_level = config.log_level.clone().unwrap_or_else(|| "info".into());
    loggers::setup_logging(&log_dir, &log_level)?;

    let credentials = broker_credentials(&config)?;
    let store = match &config.data_dir {
        Some(dir) => ConfigStore::new(dir)?,
        None => ConfigStore::in_default_location()?,
    };
    let agent_config = resolve_agent_config(&store, &config)?;
    log::info!("Starting agent {}", agent_config.agent_id);

    let engine = AgentEngine::new(store, agent_config);
    let mut notifications = engine.notifications();
    engine
        .initialize(&credentials)
        .await
        .context("Failed to establish the broker session")?;

    // The stream is created once so a SIGTERM arriving while another select
    // arm is being handled stays latched instead of being dropped.
    #[cfg(unix)]
    let mut term_signal = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to install the SIGTERM handler")?;

    // Run until a signal or a server-side shutdown broadcast arrives.
    loop {
        #[cfg(unix)]
        let terminate = term_signal.recv();
        #[cfg(not(unix))]
        let terminate = std::future::pending::<Option<()>>();

        tokio::select! {
            _ = signal::ctrl_c() => {
                log::info!("Ctrl-C received, initiating shutdown.");
                break;
            }
            _ = terminate => {
                log::info!("SIGTERM received, initiating shutdown.");
                break;
            }
            notification = notifications.recv() => match notification {
                Ok(AgentNotification::Shutdown) => {
                    log::info!("Shutdown broadcast received, initiating shutdown.");
                    break;
                }
                Ok(AgentNotification::UpdateAvailable(details)) => {
                    log::info!("Agent update available: {details}");
                }
                Ok(AgentNotification::ConfigRefresh) => {
                    log::info!("Config refresh requested; restart to pick up new settings.");
                }
                Err(_) => {}
            }
        }
    }

    engine.disconnect().await;
    log::info!("Shutdown complete.");
    Ok(())
}

/// Broker credentials come from the environment or CLI only. There is no
/// baked-in fallback; without all three values the daemon refuses to start.
fn broker_credentials(config: &config::Config) -> Result<Credentials> {
    match (
        config.mqtt_broker_url.clone(),
        config.mqtt_username.clone(),
        config.mqtt_password.clone(),
    ) {
        (Some(broker_url), Some(username), Some(password)) => Ok(Credentials {
            username,
            password,
            broker_url,
        }),
        _ => bail!(
            "Broker credentials are not configured. \
             Set MQTT_BROKER_URL, MQTT_USERNAME and MQTT_PASSWORD."
        ),
    }
}

/// The persisted record is the base; CLI/env service settings win over it.
/// A missing agent id falls back to a hostname-derived local identity.
fn resolve_agent_config(store: &ConfigStore, config: &config::Config) -> Result<AgentConfig> {
    let mut agent_config = store.load()?.unwrap_or_default();

    agent_config.apply(AgentConfigPatch {
        agent_id: config.agent_id.clone(),
        radarr_url: config.radarr_url.clone(),
        radarr_api_key: config.radarr_api_key.clone(),
        sonarr_url: config.sonarr_url.clone(),
        sonarr_api_key: config.sonarr_api_key.clone(),
    });

    if agent_config.agent_id.is_empty() {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        agent_config.agent_id = format!("local_{host}");
        log::warn!(
            "No agent id configured, using generated identity {}. \
             Set AGENT_ID to pair this agent with a server account.",
            agent_config.agent_id
        );
    }

    if !agent_config.is_usable() {
        log::warn!("No media service configured yet; waiting for update-config from the server.");
    }

    Ok(agent_config)
}
