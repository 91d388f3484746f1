use crate::errors::{Error, Result};
use crate::metrics::{COMMANDS_DISPATCHED_TOTAL, COMMAND_FAILURES_TOTAL};
use crate::model::CommandReceipt;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Outbound side of the broker connection.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Best-effort, non-retained publish.
    async fn publish(&self, topic: &str, payload: String) -> Result<()>;
}

/// Power state an operator can request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredState {
    On,
    Off,
}

impl DesiredState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DesiredState::On => "on",
            DesiredState::Off => "off",
        }
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DesiredState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(DesiredState::On),
            "off" => Ok(DesiredState::Off),
            _ => Err(Error::Validation(format!(
                "status must be \"on\" or \"off\", got {:?}",
                s
            ))),
        }
    }
}

/// Turns operator commands into `<device>:<on|off>` publishes.
///
/// Holds no registry state: a command is never recorded, only the device's
/// later status report is.
#[derive(Clone)]
pub struct CommandDispatcher {
    publisher: Arc<dyn Publisher>,
    command_topic: String,
}

impl CommandDispatcher {
    pub fn new(publisher: Arc<dyn Publisher>, command_topic: impl Into<String>) -> Self {
        Self {
            publisher,
            command_topic: command_topic.into(),
        }
    }

    pub fn command_topic(&self) -> &str {
        &self.command_topic
    }

    pub async fn dispatch(&self, device: &str, desired_state: &str) -> Result<CommandReceipt> {
        let (device, state) = match validate(device, desired_state) {
            Ok(valid) => valid,
            Err(e) => {
                COMMAND_FAILURES_TOTAL.inc();
                warn!("Rejected command for {:?}: {}", device, e);
                return Err(e);
            }
        };

        let payload = format!("{}:{}", device, state);
        if let Err(e) = self
            .publisher
            .publish(&self.command_topic, payload.clone())
            .await
        {
            COMMAND_FAILURES_TOTAL.inc();
            warn!("Failed to publish command {} on {}: {}", payload, self.command_topic, e);
            return Err(match e {
                Error::Publish(detail) => Error::Publish(detail),
                other => Error::Publish(other.to_string()),
            });
        }

        COMMANDS_DISPATCHED_TOTAL.inc();
        info!("Published command {} on {}", payload, self.command_topic);

        Ok(CommandReceipt {
            ok: true,
            topic: self.command_topic.clone(),
            payload,
        })
    }
}

fn validate<'a>(device: &'a str, desired_state: &str) -> Result<(&'a str, DesiredState)> {
    let device = device.trim();
    if device.is_empty() {
        return Err(Error::Validation("device is required".to_string()));
    }
    Ok((device, desired_state.parse()?))
}
