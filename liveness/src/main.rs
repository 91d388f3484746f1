use anyhow::Context;
use axum::{routing::get, Router};
use liveness::config::Config;
use liveness::dispatch::CommandDispatcher;
use liveness::ingest::IngestAdapter;
use liveness::mqtt::{self, EchoGuard, MqttPublisher, ECHO_TTL};
use liveness::registry::Registry;
use liveness::{metrics, rest, sweeper};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();

    info!("Starting device liveness registry");
    info!("MQTT broker: {}:{}", config.mqtt_broker, config.mqtt_port);
    info!("HTTP server: {}", config.http_addr);
    info!(
        "Status topic: {}, command topic: {}",
        config.status_topic, config.command_topic
    );
    info!(
        "Stale threshold: {}ms, max devices: {}",
        config.stale_threshold_ms, config.max_devices
    );

    metrics::init_metrics().context("failed to register metrics")?;

    let registry = Arc::new(Registry::new(config.max_devices));
    let echoes = Arc::new(EchoGuard::new(config.status_topic.clone(), ECHO_TTL));

    // Generate client ID
    let client_id = format!("liveness-{}", uuid::Uuid::new_v4());
    let (client, eventloop) = mqtt::connect(&config.mqtt_broker, config.mqtt_port, client_id);

    let publisher = Arc::new(MqttPublisher::new(client.clone(), echoes.clone()));
    let dispatcher = CommandDispatcher::new(publisher, config.command_topic.clone());

    let adapter = IngestAdapter::new(registry.clone(), config.status_topic.clone());
    let mqtt_handle = tokio::spawn(async move {
        if let Err(e) = mqtt::run_mqtt(client, eventloop, adapter, echoes).await {
            error!("MQTT task failed: {}", e);
        }
    });

    let sweeper_registry = registry.clone();
    let stale_after = config.stale_threshold();
    let sweeper_handle = tokio::spawn(async move {
        sweeper::run_sweeper(sweeper_registry, sweeper::SWEEP_INTERVAL, stale_after).await;
    });

    // Build HTTP app with REST API and metrics endpoint
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(registry, dispatcher));

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.http_addr))?;

    info!("HTTP server listening on {}", config.http_addr);

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap_or_else(|e| {
            error!("HTTP server error: {}", e);
        });
    });

    tokio::select! {
        _ = mqtt_handle => {
            error!("MQTT task terminated");
        }
        _ = sweeper_handle => {
            error!("Sweeper task terminated");
        }
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
    Ok(())
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}
