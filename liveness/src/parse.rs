use crate::model::StatusReport;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Why a status payload could not be normalized
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    #[error("malformed status object: {0}")]
    Malformed(String),

    #[error("field `{0}` is missing")]
    MissingField(&'static str),

    #[error("field `{0}` is empty")]
    EmptyField(&'static str),

    #[error("expected `<device>,<status>` or `<device>:<status>`")]
    NoSeparator,
}

/// Structured form of a status payload
#[derive(Debug, Deserialize)]
struct StatusPayload {
    device: Option<String>,
    status: Option<String>,
    #[serde(default)]
    ts: Option<Value>,
}

/// Normalizes a raw status payload.
///
/// A JSON object is decoded as `{"device", "status", "ts"?}`. Anything that is
/// not a JSON object is read as `<device>,<status>` or `<device>:<status>`,
/// split on whichever separator comes first. The report's timestamp is `ts`
/// (epoch milliseconds) when it is a usable number, `received_at` otherwise.
pub fn parse_status(payload: &[u8], received_at: DateTime<Utc>) -> Result<StatusReport, ParseFailure> {
    match serde_json::from_slice::<Value>(payload) {
        Ok(object @ Value::Object(_)) => parse_structured(object, received_at),
        _ => parse_delimited(payload, received_at),
    }
}

fn parse_structured(object: Value, received_at: DateTime<Utc>) -> Result<StatusReport, ParseFailure> {
    let payload = serde_json::from_value::<StatusPayload>(object)
        .map_err(|e| ParseFailure::Malformed(e.to_string()))?;

    let device = required_field(payload.device, "device")?;
    let status = required_field(payload.status, "status")?;
    let timestamp = payload
        .ts
        .as_ref()
        .and_then(epoch_millis)
        .unwrap_or(received_at);

    Ok(StatusReport {
        device,
        status,
        timestamp,
    })
}

fn required_field(value: Option<String>, name: &'static str) -> Result<String, ParseFailure> {
    let value = value.ok_or(ParseFailure::MissingField(name))?;
    let value = value.trim();

    if value.is_empty() {
        return Err(ParseFailure::EmptyField(name));
    }
    Ok(value.to_string())
}

fn epoch_millis(ts: &Value) -> Option<DateTime<Utc>> {
    let millis = match ts.as_i64() {
        Some(ms) => ms,
        None => {
            let ms = ts.as_f64().filter(|f| f.is_finite())?;
            if ms < i64::MIN as f64 || ms > i64::MAX as f64 {
                return None;
            }
            ms as i64
        }
    };
    DateTime::from_timestamp_millis(millis)
}

fn parse_delimited(payload: &[u8], received_at: DateTime<Utc>) -> Result<StatusReport, ParseFailure> {
    let text = std::str::from_utf8(payload).map_err(|_| ParseFailure::NotUtf8)?;
    let split_at = text
        .find(|c: char| c == ',' || c == ':')
        .ok_or(ParseFailure::NoSeparator)?;

    let device = text[..split_at].trim();
    let status = text[split_at + 1..].trim();

    if device.is_empty() {
        return Err(ParseFailure::EmptyField("device"));
    }
    if status.is_empty() {
        return Err(ParseFailure::EmptyField("status"));
    }

    Ok(StatusReport {
        device: device.to_string(),
        status: status.to_string(),
        timestamp: received_at,
    })
}
