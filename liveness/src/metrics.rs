use crate::errors::Result;
use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref MESSAGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "liveness_messages_total",
        "Total messages received from MQTT"
    ))
    .unwrap();
    pub static ref IGNORED_MESSAGES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "liveness_ignored_messages_total",
        "Messages skipped because of their topic or origin"
    ))
    .unwrap();
    pub static ref STATUS_REPORTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "liveness_status_reports_total",
        "Status reports applied to the registry"
    ))
    .unwrap();
    pub static ref PARSE_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "liveness_parse_failures_total",
        "Status payloads dropped because they could not be parsed"
    ))
    .unwrap();
    pub static ref DEVICES_TRACKED: Gauge = Gauge::with_opts(Opts::new(
        "liveness_devices_tracked",
        "Number of devices currently held in the registry"
    ))
    .unwrap();
    pub static ref DEVICES_DEMOTED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "liveness_devices_demoted_total",
        "Devices marked offline by the staleness sweeper"
    ))
    .unwrap();
    pub static ref DEVICES_EVICTED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "liveness_devices_evicted_total",
        "Devices removed to stay within the capacity limit"
    ))
    .unwrap();
    pub static ref COMMANDS_DISPATCHED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "liveness_commands_dispatched_total",
        "Commands published to devices"
    ))
    .unwrap();
    pub static ref COMMAND_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "liveness_command_failures_total",
        "Commands rejected by validation or by the transport"
    ))
    .unwrap();
    pub static ref SWEEP_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "liveness_sweep_duration_seconds",
            "Time taken by one staleness sweep"
        )
        .buckets(vec![0.00001, 0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5])
    )
    .unwrap();
}

pub fn init_metrics() -> Result<()> {
    REGISTRY.register(Box::new(MESSAGES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(IGNORED_MESSAGES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STATUS_REPORTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PARSE_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DEVICES_TRACKED.clone()))?;
    REGISTRY.register(Box::new(DEVICES_DEMOTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DEVICES_EVICTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(COMMANDS_DISPATCHED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(COMMAND_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SWEEP_DURATION_SECONDS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
