use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status label the sweeper assigns to silent devices.
pub const OFFLINE: &str = "offline";

/// Current liveness state of one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device: String,
    pub status: String,
    pub updated_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub first_seen: DateTime<Utc>,
}

impl DeviceRecord {
    pub fn new(device: String, status: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            device,
            status,
            updated_at: timestamp,
            last_seen: timestamp,
            first_seen: timestamp,
        }
    }

    pub fn is_offline(&self) -> bool {
        self.status == OFFLINE
    }
}

/// A normalized status report extracted from an inbound payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub device: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// Result of applying one status report to the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Created { evicted: Option<String> },
    Updated,
}

/// Outbound command accepted by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReceipt {
    pub ok: bool,
    pub topic: String,
    pub payload: String,
}

/// Body of a command submission
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub status: String,
}

/// REST API response wrapper
#[derive(Debug, Serialize)]
pub struct DevicesResponse {
    pub data: Vec<DeviceRecord>,
    pub total: usize,
}
