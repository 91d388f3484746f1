use chrono::Utc;
use serde::Serialize;

/// Status report in the JSON form the registry prefers
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub device: String,
    pub status: String,
    pub ts: i64,
}

impl StatusReport {
    pub fn now(device: &str, status: &str) -> Self {
        Self {
            device: device.to_string(),
            status: status.to_string(),
            ts: Utc::now().timestamp_millis(),
        }
    }
}

/// Payload encodings a device may use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Json,
    Comma,
    Colon,
}

impl Encoding {
    pub fn encode(&self, report: &StatusReport) -> serde_json::Result<String> {
        match self {
            Encoding::Json => serde_json::to_string(report),
            Encoding::Comma => Ok(format!("{},{}", report.device, report.status)),
            Encoding::Colon => Ok(format!("{}:{}", report.device, report.status)),
        }
    }
}

/// Parses a `<device>:<on|off>` command payload.
pub fn parse_command(payload: &[u8]) -> Option<(String, String)> {
    let text = std::str::from_utf8(payload).ok()?;
    let (device, state) = text.split_once(':')?;
    let state = state.trim().to_ascii_lowercase();
    if device.trim().is_empty() || !(state == "on" || state == "off") {
        return None;
    }
    Some((device.trim().to_string(), state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encodings() {
        let report = StatusReport {
            device: "dev-1".to_string(),
            status: "online".to_string(),
            ts: 42,
        };

        assert_eq!(
            Encoding::Json.encode(&report).unwrap(),
            r#"{"device":"dev-1","status":"online","ts":42}"#
        );
        assert_eq!(Encoding::Comma.encode(&report).unwrap(), "dev-1,online");
        assert_eq!(Encoding::Colon.encode(&report).unwrap(), "dev-1:online");
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(
            parse_command(b"dev-3:ON"),
            Some(("dev-3".to_string(), "on".to_string()))
        );
        assert_eq!(parse_command(b"dev-3:toggle"), None);
        assert_eq!(parse_command(b":on"), None);
        assert_eq!(parse_command(b"dev-3"), None);
    }
}
