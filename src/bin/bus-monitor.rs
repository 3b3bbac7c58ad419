//! Bus Monitor
//!
//! Command line observer for bus traffic: presence markers, `log/`
//! records and raw payloads, with optional topic filtering.

use clap::Parser;
use hausbus::transport::mqtt::{PRESENCE_OFFLINE, PRESENCE_ONLINE};
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, Event, EventLoop, MqttOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Observe bus traffic on an MQTT broker
#[derive(Parser)]
#[command(name = "bus-monitor")]
#[command(about = "Monitor bus topics: presence, logs and raw payloads")]
#[command(version)]
struct Args {
    /// Topic filter to subscribe to
    #[arg(short = 't', long, default_value = "#")]
    filter: String,

    /// Output format (pretty, compact, or json)
    #[arg(short, long, default_value = "pretty")]
    format: OutputFormat,

    /// MQTT broker host
    #[arg(long, default_value = "localhost")]
    broker_host: String,

    /// MQTT broker port
    #[arg(long, default_value_t = 1883)]
    broker_port: u16,

    /// MQTT username (optional)
    #[arg(long)]
    username: Option<String>,

    /// MQTT password (optional)
    #[arg(long)]
    password: Option<String>,
}

/// Output formatting options
#[derive(Clone, Debug, clap::ValueEnum)]
enum OutputFormat {
    /// Color-coded, human-readable with timestamps (default)
    Pretty,
    /// Single line per message, minimal formatting
    Compact,
    /// JSON lines for programmatic processing
    Json,
}

/// Payload classes on the bus, each rendered differently
#[derive(Debug, Clone, PartialEq)]
enum PayloadClass {
    /// Retained presence byte on an agent status topic
    PresenceOnline,
    PresenceOffline,
    /// JSON record under the log/ subtree
    LogRecord,
    /// Anything that parses as JSON
    Json,
    /// Raw bytes, shown as hex
    Raw,
}

impl PayloadClass {
    fn classify(topic: &str, payload: &[u8]) -> Self {
        if topic.ends_with("/status") {
            match payload {
                [PRESENCE_ONLINE] => return Self::PresenceOnline,
                [PRESENCE_OFFLINE] => return Self::PresenceOffline,
                _ => {}
            }
        }
        if serde_json::from_slice::<serde_json::Value>(payload).is_ok() {
            if topic == "log" || topic.starts_with("log/") {
                return Self::LogRecord;
            }
            return Self::Json;
        }
        Self::Raw
    }

    fn label(&self) -> &'static str {
        match self {
            Self::PresenceOnline => "ONLINE",
            Self::PresenceOffline => "OFFLINE",
            Self::LogRecord => "LOG",
            Self::Json => "JSON",
            Self::Raw => "RAW",
        }
    }

    fn color_code(&self) -> &'static str {
        match self {
            Self::PresenceOnline => "\x1b[1;32m",  // Green
            Self::PresenceOffline => "\x1b[1;31m", // Red
            Self::LogRecord => "\x1b[1;33m",       // Yellow
            Self::Json => "\x1b[1;36m",            // Cyan
            Self::Raw => "\x1b[0;37m",             // White
        }
    }
}

const RESET: &str = "\x1b[0m";

fn hex_dump(payload: &[u8]) -> String {
    payload
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_payload(class: &PayloadClass, payload: &[u8]) -> String {
    match class {
        PayloadClass::PresenceOnline => "agent online".to_string(),
        PayloadClass::PresenceOffline => "agent offline".to_string(),
        PayloadClass::LogRecord | PayloadClass::Json => {
            String::from_utf8_lossy(payload).into_owned()
        }
        PayloadClass::Raw => hex_dump(payload),
    }
}

fn format_message(class: &PayloadClass, topic: &str, payload: &[u8], format: &OutputFormat) -> String {
    let timestamp = chrono::Utc::now().format("%H:%M:%S");
    let rendered = render_payload(class, payload);

    match format {
        OutputFormat::Json => {
            let json_output = serde_json::json!({
                "timestamp": timestamp.to_string(),
                "class": class.label(),
                "topic": topic,
                "payload": match serde_json::from_slice::<serde_json::Value>(payload) {
                    Ok(json) => json,
                    Err(_) => serde_json::Value::String(rendered),
                }
            });
            serde_json::to_string(&json_output).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Compact => format!(
            "{} [{}] {} {}",
            timestamp,
            class.label(),
            topic,
            rendered.replace('\n', " ")
        ),
        OutputFormat::Pretty => {
            let color = class.color_code();
            let label = class.label();
            format!("{color}[{label}]{RESET} {timestamp} {topic}\n{rendered}\n")
        }
    }
}

fn setup_mqtt_client(args: &Args) -> (AsyncClient, EventLoop) {
    // Unique client id so multiple monitors can coexist
    let client_id = format!("bus-monitor-{}", std::process::id());
    let mut mqtt_options = MqttOptions::new(client_id, &args.broker_host, args.broker_port);

    if let (Some(username), Some(password)) = (&args.username, &args.password) {
        mqtt_options.set_credentials(username, password);
    }
    mqtt_options.set_keep_alive(std::time::Duration::from_secs(60));

    AsyncClient::new(mqtt_options, 100)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("bus_monitor=info,rumqttc=warn")
        .init();

    let args = Args::parse();

    println!("Bus Monitor");
    println!("===========");
    println!("Filter: {}", args.filter);
    println!("Format: {:?}", args.format);
    println!("MQTT Broker: {}:{}", args.broker_host, args.broker_port);
    println!("Press Ctrl+C to stop monitoring");
    println!();

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received...");
        shutdown_clone.store(true, Ordering::Relaxed);

        // Force exit if graceful shutdown stalls
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        warn!("Graceful shutdown timed out, forcing exit");
        std::process::exit(0);
    });

    let mut reconnect_delay = 1;
    const MAX_RECONNECT_DELAY: u64 = 30;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutting down monitor...");
            break;
        }

        info!("Connecting to MQTT broker...");
        let (client, mut eventloop) = setup_mqtt_client(&args);

        if let Err(e) = client.subscribe(&args.filter, QoS::AtMostOnce).await {
            error!("Failed to subscribe: {}", e);
            tokio::time::sleep(std::time::Duration::from_secs(reconnect_delay)).await;
            reconnect_delay = std::cmp::min(reconnect_delay * 2, MAX_RECONNECT_DELAY);
            continue;
        }

        reconnect_delay = 1;
        let mut connection_stable = false;

        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Disconnecting from MQTT broker...");
                let disconnect_timeout = tokio::time::timeout(
                    std::time::Duration::from_millis(500),
                    client.disconnect(),
                )
                .await;
                if disconnect_timeout.is_err() {
                    warn!("Disconnect timed out, forcing exit");
                }
                return Ok(());
            }

            // Poll with timeout to allow regular shutdown checks
            let poll_result =
                tokio::time::timeout(std::time::Duration::from_millis(100), eventloop.poll()).await;

            match poll_result {
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                    let topic = String::from_utf8_lossy(&publish.topic).into_owned();
                    let class = PayloadClass::classify(&topic, &publish.payload);
                    let formatted = format_message(&class, &topic, &publish.payload, &args.format);
                    println!("{formatted}");
                }
                Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => {
                    info!("Connected to MQTT broker");
                    connection_stable = true;
                }
                Ok(Ok(Event::Incoming(Packet::SubAck(_)))) => {
                    info!("Subscribed to {}", args.filter);
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    if connection_stable {
                        warn!("MQTT connection lost: {}", e);
                    } else {
                        error!("MQTT connection error during setup: {}", e);
                    }
                    break;
                }
                Err(_) => continue,
            }
        }

        if !shutdown.load(Ordering::Relaxed) {
            warn!("Reconnecting in {} seconds...", reconnect_delay);
            tokio::time::sleep(std::time::Duration::from_secs(reconnect_delay)).await;
            reconnect_delay = std::cmp::min(reconnect_delay * 2, MAX_RECONNECT_DELAY);
        }
    }

    Ok(())
}
