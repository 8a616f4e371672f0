//! # Command Round-Trip Live Test
//!
//! Plays the server's side of the protocol against a running agent: connects
//! to the real broker, subscribes to the agent's response topic, publishes a
//! `status` command and prints the correlated reply.
//!
//! Requires a reachable broker and a running `agentd` for the same agent id.

use anyhow::{bail, Result};
use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;

use lib_agent::connections::broker_mqtt::parse_broker_url;
use lib_agent::core::envelopes::{command_topic, now_millis, response_topic};
use serde_json::json;

#[derive(Parser, Debug)]
#[clap(about = "Sends a status command to a running agent and prints the response.")]
struct Args {
    #[clap(long, env = "AGENT_ID")]
    agent_id: String,

    #[clap(long, env = "MQTT_BROKER_URL", default_value = "mqtt://localhost:1883")]
    broker_url: String,

    #[clap(long, env = "MQTT_USERNAME")]
    username: Option<String>,

    #[clap(long, env = "MQTT_PASSWORD")]
    password: Option<String>,

    #[clap(long, default_value = "20")]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (host, port) = parse_broker_url(&args.broker_url)?;
    let mut options = MqttOptions::new(format!("roundtrip-probe-{}", now_millis()), host, port);
    options.set_keep_alive(Duration::from_secs(30));
    if let (Some(user), Some(pass)) = (&args.username, &args.password) {
        options.set_credentials(user, pass);
    }

    let (client, mut event_loop) = AsyncClient::new(options, 16);
    let responses = response_topic(&args.agent_id);
    let commands = command_topic(&args.agent_id);

    let request_id = format!("probe-{}", now_millis());
    let command = json!({
        "command": "status",
        "timestamp": now_millis(),
        "requestId": request_id,
    });

    println!("[*] Connecting to broker at {}...", args.broker_url);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.timeout_secs);
    let mut sent = false;
    loop {
        let event = tokio::time::timeout_at(deadline, event_loop.poll()).await;
        match event {
            Err(_) => bail!("No response within {}s. Is agentd running?", args.timeout_secs),
            Ok(Err(e)) => bail!("Broker connection failed: {e}"),
            Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => {
                client.subscribe(&responses, QoS::AtLeastOnce).await?;
            }
            Ok(Ok(Event::Incoming(Packet::SubAck(_)))) if !sent => {
                println!("[*] Publishing status command {request_id}...");
                client
                    .publish(&commands, QoS::AtLeastOnce, false, serde_json::to_vec(&command)?)
                    .await?;
                sent = true;
            }
            Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                let body: serde_json::Value = serde_json::from_slice(&publish.payload)?;
                if body["requestId"] == request_id.as_str() {
                    println!("\n[SUCCESS] Response received:");
                    println!("-----------------------------------------------");
                    println!("{}", serde_json::to_string_pretty(&body)?);
                    println!("-----------------------------------------------");
                    client.disconnect().await?;
                    return Ok(());
                }
                println!("[*] Skipping unrelated response {}", body["requestId"]);
            }
            Ok(Ok(_)) => {}
        }
    }
}
