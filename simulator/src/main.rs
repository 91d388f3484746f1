mod report;

use clap::Parser;
use rand::Rng;
use report::{parse_command, Encoding, StatusReport};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Simulates a fleet of devices reporting their status over MQTT
#[derive(Debug, Parser)]
struct Args {
    #[arg(long, env = "MQTT_BROKER", default_value = "localhost")]
    broker: String,

    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    port: u16,

    /// Status reports per second across the whole fleet
    #[arg(long, env = "RATE", default_value_t = 100)]
    rate: u64,

    #[arg(long, env = "DEVICES", default_value_t = 100)]
    devices: usize,

    /// Share of devices that report once and then go quiet
    #[arg(long, env = "SILENT_FRACTION", default_value_t = 0.1, value_parser = parse_fraction)]
    silent_fraction: f64,

    #[arg(long, env = "STATUS_TOPIC", default_value = "devices/status")]
    status_topic: String,

    #[arg(long, env = "COMMAND_TOPIC", default_value = "devices/command")]
    command_topic: String,
}

#[derive(Debug, Clone)]
struct SimDevice {
    id: String,
    status: String,
    encoding: Encoding,
    silent: bool,
}

type Fleet = Arc<Mutex<Vec<SimDevice>>>;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting device simulator");
    info!(
        "Broker: {}:{}, Rate: {} msg/s, Devices: {}",
        args.broker, args.port, args.rate, args.devices
    );

    let fleet: Fleet = Arc::new(Mutex::new(build_fleet(args.devices, args.silent_fraction)));

    let client_id = format!("sim-{}", uuid::Uuid::new_v4());
    let mut mqtt_options = MqttOptions::new(client_id, &args.broker, args.port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 20000);

    if let Err(e) = client.subscribe(&args.command_topic, QoS::AtMostOnce).await {
        error!("Failed to subscribe to {}: {}", args.command_topic, e);
        return;
    }

    // Spawn eventloop handler; devices answer commands from here
    let command_client = client.clone();
    let command_fleet = fleet.clone();
    let status_topic = args.status_topic.clone();
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    handle_command(&command_client, &command_fleet, &status_topic, &publish.payload);
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT eventloop error: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    tokio::time::sleep(Duration::from_secs(2)).await;

    info!("Connected to MQTT broker, announcing fleet");
    for device in snapshot(&fleet) {
        publish_report(&client, &args.status_topic, &device).await;
    }

    let interval = Duration::from_micros(1_000_000 / args.rate.max(1));
    let mut counter = 0u64;
    loop {
        let fleet_now = snapshot(&fleet);
        let device = &fleet_now[counter as usize % fleet_now.len()];
        counter += 1;

        if !device.silent {
            publish_report(&client, &args.status_topic, device).await;
        }

        if counter % 1000 == 0 {
            info!("Published {} reports", counter);
        }
        tokio::time::sleep(interval).await;
    }
}

fn build_fleet(devices: usize, silent_fraction: f64) -> Vec<SimDevice> {
    let mut rng = rand::thread_rng();

    (0..devices.max(1))
        .map(|i| SimDevice {
            id: format!("dev-{}", i),
            status: "online".to_string(),
            encoding: match rng.gen_range(0..3) {
                0 => Encoding::Json,
                1 => Encoding::Comma,
                _ => Encoding::Colon,
            },
            silent: rng.gen_bool(silent_fraction),
        })
        .collect()
}

fn parse_fraction(raw: &str) -> Result<f64, String> {
    let value: f64 = raw.trim().parse().map_err(|e| format!("{}", e))?;
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(format!("{} is not a fraction between 0 and 1", raw));
    }
    Ok(value)
}

fn snapshot(fleet: &Fleet) -> Vec<SimDevice> {
    fleet.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

async fn publish_report(client: &AsyncClient, topic: &str, device: &SimDevice) {
    let report = StatusReport::now(&device.id, &device.status);
    let payload = match device.encoding.encode(&report) {
        Ok(p) => p,
        Err(e) => {
            error!("Failed to serialize report for {}: {}", device.id, e);
            return;
        }
    };

    if let Err(e) = client.publish(topic, QoS::AtLeastOnce, false, payload).await {
        warn!("Failed to publish: {}", e);
    }
}

fn handle_command(client: &AsyncClient, fleet: &Fleet, status_topic: &str, payload: &[u8]) {
    let Some((device_id, state)) = parse_command(payload) else {
        warn!("Ignoring malformed command {:?}", String::from_utf8_lossy(payload));
        return;
    };

    let report = {
        let mut fleet = fleet.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(device) = fleet.iter_mut().find(|d| d.id == device_id) else {
            debug!("Command for unknown device {}", device_id);
            return;
        };
        device.status = state;
        // A command wakes a silent device up.
        device.silent = false;
        StatusReport::now(&device.id, &device.status)
    };

    info!("{} switched {}", report.device, report.status);
    match serde_json::to_string(&report) {
        // The eventloop task must not await on a full request queue.
        Ok(payload) => {
            if let Err(e) = client.try_publish(status_topic, QoS::AtLeastOnce, false, payload) {
                warn!("Failed to acknowledge command: {}", e);
            }
        }
        Err(e) => error!("Failed to serialize report: {}", e),
    }
}
