//! Broker load tests. They need a running MQTT broker on localhost:1883 and
//! the liveness service subscribed to `devices/status`:
//!
//! ```text
//! cargo test -p liveness --test load_test -- --ignored --nocapture
//! ```

use chrono::Utc;
use rand::Rng;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::{Duration, Instant};
use tokio::time::sleep;

const STATUS_TOPIC: &str = "devices/status";

fn random_report(rng: &mut impl Rng, device: &str) -> String {
    let status = if rng.gen_bool(0.9) { "online" } else { "degraded" };
    if rng.gen_bool(0.5) {
        serde_json::json!({
            "device": device,
            "status": status,
            "ts": Utc::now().timestamp_millis(),
        })
        .to_string()
    } else {
        format!("{},{}", device, status)
    }
}

async fn connect(client_id: &str) -> AsyncClient {
    let mut mqtt_options = MqttOptions::new(client_id, "localhost", 1883);
    mqtt_options.set_keep_alive(Duration::from_secs(30));

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 20000);

    tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                eprintln!("MQTT error: {}", e);
                break;
            }
        }
    });

    sleep(Duration::from_millis(500)).await;
    client
}

async fn publish_at_rate(
    client: &AsyncClient,
    devices: usize,
    target_rate: usize,
    duration_secs: usize,
) -> (usize, usize, Duration) {
    let total_messages = target_rate * duration_secs;
    let burst_size = 100;
    let delay_per_burst = Duration::from_micros((burst_size * 1_000_000 / target_rate) as u64);

    let mut rng = rand::thread_rng();
    let start = Instant::now();
    let mut sent_count = 0;
    let mut error_count = 0;

    for batch_start in (0..total_messages).step_by(burst_size) {
        for i in batch_start..std::cmp::min(batch_start + burst_size, total_messages) {
            let device = format!("load-test-dev-{}", i % devices);
            let payload = random_report(&mut rng, &device);

            match client
                .publish(STATUS_TOPIC, QoS::AtLeastOnce, false, payload)
                .await
            {
                Ok(_) => sent_count += 1,
                Err(e) => {
                    error_count += 1;
                    if error_count < 10 {
                        eprintln!("Send error: {}", e);
                    }
                }
            }
        }

        sleep(delay_per_burst).await;
    }

    (sent_count, error_count, start.elapsed())
}

#[tokio::test]
#[ignore]
async fn test_1000_status_reports_per_second() {
    let client = connect("liveness-load-test").await;

    let (sent, errors, duration) = publish_at_rate(&client, 10, 1000, 10).await;
    let rate = sent as f64 / duration.as_secs_f64();

    println!("Sent {} reports in {:.2}s ({:.0} msg/s), {} errors", sent, duration.as_secs_f64(), rate, errors);

    assert!(rate >= 900.0, "Throughput too low: {:.2} msg/s (expected >= 900)", rate);
    assert_eq!(errors, 0, "Too many errors: {}", errors);
}

#[tokio::test]
#[ignore]
async fn test_many_devices_sustained() {
    let client = connect("liveness-load-test-sustained").await;

    let (sent, errors, duration) = publish_at_rate(&client, 5000, 1000, 60).await;
    let rate = sent as f64 / duration.as_secs_f64();

    println!("Sent {} reports in {:.2}s ({:.0} msg/s), {} errors", sent, duration.as_secs_f64(), rate, errors);

    assert!(rate >= 900.0);
}
