use std::env;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_STATUS_TOPIC: &str = "devices/status";
pub const DEFAULT_COMMAND_TOPIC: &str = "devices/command";
pub const DEFAULT_STALE_THRESHOLD_MS: u64 = 30_000;
pub const DEFAULT_MAX_DEVICES: usize = 10_000;

/// Runtime settings, read from the environment once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub mqtt_broker: String,
    pub mqtt_port: u16,
    pub http_addr: String,
    pub status_topic: String,
    pub command_topic: String,
    pub stale_threshold_ms: u64,
    pub max_devices: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mqtt_broker: "localhost".to_string(),
            mqtt_port: 1883,
            http_addr: "0.0.0.0:8080".to_string(),
            status_topic: DEFAULT_STATUS_TOPIC.to_string(),
            command_topic: DEFAULT_COMMAND_TOPIC.to_string(),
            stale_threshold_ms: DEFAULT_STALE_THRESHOLD_MS,
            max_devices: DEFAULT_MAX_DEVICES,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Missing or unparseable values
    /// keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str, default: String| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };

        Self {
            mqtt_broker: text("MQTT_BROKER", defaults.mqtt_broker),
            mqtt_port: parsed(&lookup, "MQTT_PORT", defaults.mqtt_port),
            http_addr: text("HTTP_ADDR", defaults.http_addr),
            status_topic: text("STATUS_TOPIC", defaults.status_topic),
            command_topic: text("COMMAND_TOPIC", defaults.command_topic),
            stale_threshold_ms: parsed(&lookup, "STALE_THRESHOLD_MS", defaults.stale_threshold_ms),
            max_devices: parsed(&lookup, "MAX_DEVICES", defaults.max_devices),
        }
    }

    pub fn stale_threshold(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.stale_threshold_ms.min(i64::MAX as u64) as i64)
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid value {:?} for {}, using {}", raw, key, default);
            default
        }),
        None => default,
    }
}
