use crate::dispatch::Publisher;
use crate::errors::{Error, Result};
use crate::ingest::{IngestAdapter, IngestOutcome};
use crate::metrics::MESSAGES_TOTAL;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

const REQUEST_CAPACITY: usize = 10000;
const ECHO_CAPACITY: usize = 256;
pub const ECHO_TTL: Duration = Duration::from_secs(10);

pub fn connect(broker: &str, port: u16, client_id: String) -> (AsyncClient, EventLoop) {
    info!("Connecting to MQTT broker at {}:{}", broker, port);

    let mut mqtt_options = MqttOptions::new(client_id, broker, port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_clean_session(false);

    AsyncClient::new(mqtt_options, REQUEST_CAPACITY)
}

/// Remembers what this client published on its own subscribed topic so that
/// the broker echoing it back is not mistaken for device traffic.
///
/// Only publishes on `watched_topic` are recorded, and an entry older than
/// `ttl` is discarded so a lost echo cannot swallow a later device report.
#[derive(Debug)]
pub struct EchoGuard {
    watched_topic: String,
    ttl: Duration,
    sent: Mutex<VecDeque<(Instant, Vec<u8>)>>,
}

impl EchoGuard {
    pub fn new(watched_topic: impl Into<String>, ttl: Duration) -> Self {
        Self {
            watched_topic: watched_topic.into(),
            ttl,
            sent: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record(&self, topic: &str, payload: &[u8]) {
        if topic != self.watched_topic {
            return;
        }
        let mut sent = self.sent.lock().unwrap_or_else(PoisonError::into_inner);
        self.expire(&mut sent);
        if sent.len() >= ECHO_CAPACITY {
            sent.pop_front();
        }
        sent.push_back((Instant::now(), payload.to_vec()));
    }

    /// Consumes a matching entry. Returns true if the message was ours.
    pub fn take(&self, topic: &str, payload: &[u8]) -> bool {
        if topic != self.watched_topic {
            return false;
        }
        let mut sent = self.sent.lock().unwrap_or_else(PoisonError::into_inner);
        self.expire(&mut sent);
        match sent.iter().position(|(_, p)| p.as_slice() == payload) {
            Some(index) => {
                sent.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        let mut sent = self.sent.lock().unwrap_or_else(PoisonError::into_inner);
        self.expire(&mut sent);
        sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expire(&self, sent: &mut VecDeque<(Instant, Vec<u8>)>) {
        while sent
            .front()
            .is_some_and(|(at, _)| at.elapsed() > self.ttl)
        {
            sent.pop_front();
        }
    }
}

/// Publishes commands through the shared MQTT client
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    echoes: Arc<EchoGuard>,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient, echoes: Arc<EchoGuard>) -> Self {
        Self { client, echoes }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        self.echoes.record(topic, payload.as_bytes());
        if let Err(e) = self
            .client
            .publish(topic, QoS::AtMostOnce, false, payload.clone())
            .await
        {
            self.echoes.take(topic, payload.as_bytes());
            return Err(Error::Publish(e.to_string()));
        }
        Ok(())
    }
}

pub async fn run_mqtt(
    client: AsyncClient,
    mut eventloop: EventLoop,
    adapter: IngestAdapter,
    echoes: Arc<EchoGuard>,
) -> Result<()> {
    let topic = adapter.status_topic().to_string();
    client
        .subscribe(topic.as_str(), QoS::AtLeastOnce)
        .await
        .map_err(Error::Mqtt)?;

    info!("Subscribed to {} with QoS 1", topic);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                MESSAGES_TOTAL.inc();

                debug!(
                    "Received message on topic {}, size: {} bytes",
                    publish.topic,
                    publish.payload.len()
                );

                let is_external = !echoes.take(&publish.topic, &publish.payload);
                if let IngestOutcome::Applied(outcome) =
                    adapter.on_external_event(&publish.topic, &publish.payload, is_external)
                {
                    debug!("Applied status report: {:?}", outcome);
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Connected to MQTT broker");
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT error: {}", e);
                // rumqttc reconnects on the next poll
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
