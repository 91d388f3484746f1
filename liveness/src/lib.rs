//! Device liveness registry: tracks which devices are online from the status
//! reports they publish over MQTT, demotes silent devices to offline, and
//! publishes on/off commands back to them.

pub mod config;
pub mod dispatch;
pub mod errors;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod mqtt;
pub mod parse;
pub mod registry;
pub mod rest;
pub mod sweeper;
