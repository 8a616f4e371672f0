//! # Agent Engine
//!
//! Owns the broker session end to end: connect with a deadline, subscribe,
//! route inbound traffic, keep publishing alive through reconnects, and tear
//! everything down in order on disconnect.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet, QoS};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::configs::{AgentConfig, ConfigStore, Credentials};
use crate::connections::broker_mqtt::{
    mqtt_options, SessionState, CONNECT_TIMEOUT_SECS, RECONNECT_INTERVAL_SECS,
};
use crate::core::broadcast::{AgentNotification, BroadcastHandler};
use crate::core::collector::Collector;
use crate::core::dispatcher::CommandDispatcher;
use crate::core::envelopes::{command_topic, BROADCAST_TOPIC};
use crate::core::publisher::Publisher;
use crate::error::AgentError;

/// Seconds the session loop gets to flush the offline status and the MQTT
/// disconnect onto the wire before teardown proceeds regardless.
const DISCONNECT_FLUSH_TIMEOUT_SECS: u64 = 5;

/// Handles owned by one live broker session.
struct ActiveSession {
    client: AsyncClient,
    shutdown_tx: broadcast::Sender<()>,
    collector: Arc<Collector>,
    session_task: JoinHandle<()>,
    collect_task: JoinHandle<()>,
}

/// The long-lived agent core shared between the daemon and its signal loop.
pub struct AgentEngine {
    store: Arc<ConfigStore>,
    config: Arc<RwLock<AgentConfig>>,
    radarr: Arc<crate::retrieve::ArrAdapter>,
    sonarr: Arc<crate::retrieve::ArrAdapter>,
    state: Arc<RwLock<SessionState>>,
    notify_tx: broadcast::Sender<AgentNotification>,
    session: Mutex<Option<ActiveSession>>,
}

impl AgentEngine {
    pub fn new(store: ConfigStore, config: AgentConfig) -> Self {
        let (notify_tx, _) = broadcast::channel(16);
        Self {
            store: Arc::new(store),
            config: Arc::new(RwLock::new(config)),
            radarr: Arc::new(crate::retrieve::ArrAdapter::new(crate::retrieve::ServiceKind::Radarr)),
            sonarr: Arc::new(crate::retrieve::ArrAdapter::new(crate::retrieve::ServiceKind::Sonarr)),
            state: Arc::new(RwLock::new(SessionState::Idle)),
            notify_tx,
            session: Mutex::new(None),
        }
    }

    /// Subscribe to side effects raised by server broadcasts.
    pub fn notifications(&self) -> broadcast::Receiver<AgentNotification> {
        self.notify_tx.subscribe()
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Connects to the broker and brings the full session up. Fails if no
    /// connection is established within [`CONNECT_TIMEOUT_SECS`].
    pub async fn initialize(&self, credentials: &Credentials) -> Result<(), AgentError> {
        let mut session_slot = self.session.lock().await;
        if session_slot.is_some() {
            log::warn!("initialize() called twice, ignoring");
            return Ok(());
        }

        let config = self.config.read().await.clone();
        // Service settings survive restarts; broker credentials never touch disk.
        if let Err(e) = self.store.save(&config) {
            log::warn!("Could not persist agent config: {e}");
        }
        if let Some((url, key)) = config.radarr_pair() {
            self.radarr.configure(url, key).await?;
        }
        if let Some((url, key)) = config.sonarr_pair() {
            self.sonarr.configure(url, key).await?;
        }

        let agent_id = config.agent_id.clone();
        log::info!("Connecting to MQTT broker at {}", credentials.broker_url);
        *self.state.write().await = SessionState::Connecting;

        let options = mqtt_options(credentials, &agent_id)?;
        let (client, event_loop) = AsyncClient::new(options, 64);

        let publisher = Arc::new(Publisher::for_broker(
            agent_id.clone(),
            self.state.clone(),
            client.clone(),
        ));
        let collector = Arc::new(Collector::new(
            self.radarr.clone(),
            self.sonarr.clone(),
            publisher.clone(),
            self.state.clone(),
        ));
        let dispatcher = Arc::new(CommandDispatcher::new(
            self.config.clone(),
            self.store.clone(),
            self.radarr.clone(),
            self.sonarr.clone(),
            publisher.clone(),
            collector.clone(),
            self.state.clone(),
        ));
        let broadcasts = Arc::new(BroadcastHandler::new(collector.clone(), self.notify_tx.clone()));

        let (shutdown_tx, _) = broadcast::channel(4);
        let (ready_tx, mut ready_rx) = mpsc::channel::<()>(1);

        let driver = SessionDriver {
            agent_id,
            client: client.clone(),
            state: self.state.clone(),
            collector: collector.clone(),
            dispatcher,
            broadcasts,
            ready_tx,
        };
        let session_task = tokio::spawn(driver.run(event_loop, shutdown_tx.subscribe()));
        let collect_task = tokio::spawn(collector.clone().run(shutdown_tx.subscribe()));

        let connected = tokio::time::timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            ready_rx.recv(),
        )
        .await;
        if !matches!(connected, Ok(Some(()))) {
            session_task.abort();
            collect_task.abort();
            *self.state.write().await = SessionState::Disconnected;
            return Err(AgentError::ConnectionTimeout(CONNECT_TIMEOUT_SECS));
        }

        *session_slot = Some(ActiveSession {
            client,
            shutdown_tx,
            collector,
            session_task,
            collect_task,
        });
        Ok(())
    }

    /// Tears the session down in order: announce offline and flush the MQTT
    /// disconnect while the session loop is still polling the broker, then
    /// stop the loops and mark the terminal state.
    pub async fn disconnect(&self) {
        let Some(mut session) = self.session.lock().await.take() else {
            return;
        };
        log::info!("Disconnecting from MQTT broker");

        if *self.state.read().await == SessionState::Connected {
            // The session loop is the only poller of the broker event loop;
            // requests enqueued here only hit the wire while it keeps
            // running, so it is stopped last, via the disconnect event.
            session.collector.heartbeat("offline").await;
            if let Err(e) = session.client.disconnect().await {
                log::debug!("Broker disconnect returned an error: {e}");
            }
            let drained = tokio::time::timeout(
                Duration::from_secs(DISCONNECT_FLUSH_TIMEOUT_SECS),
                &mut session.session_task,
            )
            .await;
            if drained.is_err() {
                log::warn!("Session loop did not flush the disconnect in time");
            }
        }

        let _ = session.shutdown_tx.send(());
        *self.state.write().await = SessionState::Disconnected;
        session.session_task.abort();
        session.collect_task.abort();
    }
}

/// The session task: polls the broker event loop until shutdown.
struct SessionDriver {
    agent_id: String,
    client: AsyncClient,
    state: Arc<RwLock<SessionState>>,
    collector: Arc<Collector>,
    dispatcher: Arc<CommandDispatcher>,
    broadcasts: Arc<BroadcastHandler>,
    ready_tx: mpsc::Sender<()>,
}

impl SessionDriver {
    async fn run(self, mut event_loop: EventLoop, mut shutdown: broadcast::Receiver<()>) {
        let commands = command_topic(&self.agent_id);
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    log::debug!("Session loop stopping");
                    return;
                }
                event = event_loop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        log::info!("Connected to MQTT broker");
                        *self.state.write().await = SessionState::Connected;
                        self.subscribe(&commands).await;
                        self.subscribe(BROADCAST_TOPIC).await;
                        let _ = self.ready_tx.try_send(());
                        self.collector.heartbeat("online").await;
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        self.route(&commands, publish.topic, publish.payload.to_vec());
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        log::debug!("Broker disconnect flushed, session loop stopping");
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if !self.mark_lost(&e.to_string()).await {
                            return;
                        }
                        // Back off before rumqttc retries the connection.
                        tokio::select! {
                            _ = shutdown.recv() => return,
                            _ = tokio::time::sleep(Duration::from_secs(RECONNECT_INTERVAL_SECS)) => {}
                        }
                    }
                }
            }
        }
    }

    async fn subscribe(&self, topic: &str) {
        if let Err(e) = self.client.subscribe(topic, QoS::AtLeastOnce).await {
            log::error!("Failed to subscribe to {topic}: {e}");
        }
    }

    /// Hands one inbound publish to its handler on a fresh task so a slow
    /// upstream call cannot starve the broker keep-alive.
    fn route(&self, commands: &str, topic: String, payload: Vec<u8>) {
        if topic == commands {
            let dispatcher = self.dispatcher.clone();
            tokio::spawn(async move { dispatcher.handle_payload(&payload).await });
        } else if topic == BROADCAST_TOPIC {
            let broadcasts = self.broadcasts.clone();
            tokio::spawn(async move { broadcasts.handle_payload(&payload).await });
        } else {
            log::debug!("Publish on unexpected topic {topic}");
        }
    }

    /// Flips the state after a connection error. Returns false once the
    /// session has been deliberately closed.
    async fn mark_lost(&self, reason: &str) -> bool {
        let mut state = self.state.write().await;
        match *state {
            SessionState::Disconnected => false,
            SessionState::Connected | SessionState::Reconnecting => {
                log::warn!("MQTT connection lost: {reason}");
                *state = SessionState::Reconnecting;
                true
            }
            // Initial connect still pending, keep the state as-is so the
            // startup deadline owns the outcome.
            _ => {
                log::warn!("MQTT connection error: {reason}");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine() -> (AgentEngine, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path()).unwrap();
        let config = AgentConfig {
            agent_id: "A1".to_string(),
            ..Default::default()
        };
        (AgentEngine::new(store, config), dir)
    }

    #[tokio::test]
    async fn fresh_engine_is_idle() {
        let (engine, _dir) = engine();
        assert_eq!(engine.state().await, SessionState::Idle);
    }

    #[tokio::test]
    async fn disconnect_without_a_session_is_a_no_op() {
        let (engine, _dir) = engine();
        engine.disconnect().await;
        // No session was ever opened, so the lifecycle state is untouched.
        assert_eq!(engine.state().await, SessionState::Idle);
    }

    #[tokio::test]
    async fn disconnect_announces_offline_before_the_state_turns_terminal() {
        let (engine, _dir) = engine();
        *engine.state.write().await = SessionState::Connected;

        let credentials = Credentials {
            username: "u".to_string(),
            password: "p".to_string(),
            broker_url: "mqtt://127.0.0.1:1".to_string(),
        };
        let options = mqtt_options(&credentials, "A1").unwrap();
        let (client, _event_loop) = AsyncClient::new(options, 16);

        let (publisher, mut rx) = Publisher::capture("A1".to_string(), engine.state.clone());
        let collector = Arc::new(Collector::new(
            engine.radarr.clone(),
            engine.sonarr.clone(),
            Arc::new(publisher),
            engine.state.clone(),
        ));
        let (shutdown_tx, _) = broadcast::channel(1);
        *engine.session.lock().await = Some(ActiveSession {
            client,
            shutdown_tx,
            collector,
            session_task: tokio::spawn(async {}),
            collect_task: tokio::spawn(async {}),
        });

        engine.disconnect().await;

        // The offline heartbeat was published while the session still
        // counted as connected; flipping the terminal state first would
        // have turned it into a silent no-op.
        let captured = rx.try_recv().unwrap();
        assert_eq!(captured.topic, "agents/A1/status");
        assert_eq!(captured.payload["connectionState"], "offline");
        assert_eq!(engine.state().await, SessionState::Disconnected);

        // The session slot is cleared, so a second disconnect does nothing.
        engine.disconnect().await;
        assert!(rx.try_recv().is_err());
    }
}
