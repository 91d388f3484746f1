use crate::metrics::{IGNORED_MESSAGES_TOTAL, PARSE_FAILURES_TOTAL, STATUS_REPORTS_TOTAL};
use crate::model::UpdateOutcome;
use crate::parse::{parse_status, ParseFailure};
use crate::registry::Registry;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened to one inbound event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Published by this service itself.
    NotExternal,
    /// Not on the status topic.
    OtherTopic,
    Applied(UpdateOutcome),
    Dropped(ParseFailure),
}

/// Feeds status events from the broker into the registry.
#[derive(Debug, Clone)]
pub struct IngestAdapter {
    registry: Arc<Registry>,
    status_topic: String,
}

impl IngestAdapter {
    pub fn new(registry: Arc<Registry>, status_topic: impl Into<String>) -> Self {
        Self {
            registry,
            status_topic: status_topic.into(),
        }
    }

    pub fn status_topic(&self) -> &str {
        &self.status_topic
    }

    pub fn on_external_event(&self, topic: &str, payload: &[u8], is_external: bool) -> IngestOutcome {
        self.on_external_event_at(topic, payload, is_external, Utc::now())
    }

    /// Same as [`on_external_event`](Self::on_external_event) with an explicit
    /// receive time, used when the payload carries no `ts`.
    pub fn on_external_event_at(
        &self,
        topic: &str,
        payload: &[u8],
        is_external: bool,
        received_at: DateTime<Utc>,
    ) -> IngestOutcome {
        if !is_external {
            IGNORED_MESSAGES_TOTAL.inc();
            debug!("Ignoring self-published message on {}", topic);
            return IngestOutcome::NotExternal;
        }
        if topic != self.status_topic {
            IGNORED_MESSAGES_TOTAL.inc();
            debug!("Ignoring message on unrelated topic {}", topic);
            return IngestOutcome::OtherTopic;
        }

        match parse_status(payload, received_at) {
            Ok(report) => {
                let outcome = self
                    .registry
                    .update(&report.device, &report.status, report.timestamp);
                STATUS_REPORTS_TOTAL.inc();
                debug!(
                    "Device {} reported {} at {}",
                    report.device, report.status, report.timestamp
                );
                IngestOutcome::Applied(outcome)
            }
            Err(failure) => {
                PARSE_FAILURES_TOTAL.inc();
                warn!(
                    "Dropping unparseable status on {}: {} (payload: {:?})",
                    topic,
                    failure,
                    String::from_utf8_lossy(payload)
                );
                IngestOutcome::Dropped(failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const TOPIC: &str = "devices/status";

    fn adapter() -> (IngestAdapter, Arc<Registry>) {
        let registry = Arc::new(Registry::new(100));
        (IngestAdapter::new(registry.clone(), TOPIC), registry)
    }

    fn received() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_json_report_applied() {
        let (adapter, registry) = adapter();

        let outcome = adapter.on_external_event_at(
            TOPIC,
            br#"{"device":"lamp-1","status":"online","ts":1714564800000}"#,
            true,
            received(),
        );

        assert_eq!(outcome, IngestOutcome::Applied(UpdateOutcome::Created { evicted: None }));
        let record = registry.get("lamp-1").unwrap();
        assert_eq!(record.last_seen.timestamp_millis(), 1_714_564_800_000);
    }

    #[test]
    fn test_text_report_uses_receive_time() {
        let (adapter, registry) = adapter();

        adapter.on_external_event_at(TOPIC, b"lamp-2,online", true, received());

        assert_eq!(registry.get("lamp-2").unwrap().last_seen, received());
    }

    #[test]
    fn test_internal_events_ignored() {
        let (adapter, registry) = adapter();

        let outcome = adapter.on_external_event(TOPIC, b"lamp-1,online", false);

        assert_eq!(outcome, IngestOutcome::NotExternal);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_other_topics_ignored() {
        let (adapter, registry) = adapter();

        assert_eq!(
            adapter.on_external_event("devices/command", b"lamp-1:on", true),
            IngestOutcome::OtherTopic
        );
        assert_eq!(
            adapter.on_external_event("devices/status/extra", b"lamp-1,online", true),
            IngestOutcome::OtherTopic
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_bad_payload_dropped_without_side_effects() {
        let (adapter, registry) = adapter();
        adapter.on_external_event(TOPIC, b"lamp-1,online", true);

        let outcome = adapter.on_external_event(TOPIC, b"garbage", true);

        assert_eq!(outcome, IngestOutcome::Dropped(ParseFailure::NoSeparator));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("lamp-1").unwrap().status, "online");
    }

    #[test]
    fn test_custom_status_topic() {
        let registry = Arc::new(Registry::new(100));
        let adapter = IngestAdapter::new(registry.clone(), "site-a/status");

        adapter.on_external_event("site-a/status", b"pump:running", true);
        adapter.on_external_event(TOPIC, b"pump:stopped", true);

        assert_eq!(registry.get("pump").unwrap().status, "running");
    }
}
