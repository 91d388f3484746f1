use crate::parse::ParseFailure;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseFailure),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
