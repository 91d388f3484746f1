use chrono::{DateTime, Duration, TimeZone, Utc};
use liveness::ingest::IngestAdapter;
use liveness::model::OFFLINE;
use liveness::registry::Registry;
use std::sync::Arc;
use std::thread;

fn at(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000 + millis).unwrap()
}

#[test]
fn concurrent_updates_to_one_device_never_tear() {
    let registry = Arc::new(Registry::new(100));
    let writers = 8;
    let updates_per_writer = 500;

    let handles: Vec<_> = (0..writers)
        .map(|writer| {
            let registry = registry.clone();
            thread::spawn(move || {
                for i in 0..updates_per_writer {
                    // Each writer uses its own status and a timestamp that encodes it,
                    // so a torn record would pair one writer's status with another's time.
                    let ts = at((i * writers + writer) as i64);
                    registry.update("shared", &format!("writer-{}", writer), ts);
                }
            })
        })
        .collect();

    let reader = {
        let registry = registry.clone();
        thread::spawn(move || {
            for _ in 0..1000 {
                for record in registry.snapshot() {
                    assert_record_consistent(&record.status, record.last_seen, writers);
                    assert_eq!(record.last_seen, record.updated_at);
                }
            }
        })
    };

    for handle in handles {
        handle.join().unwrap();
    }
    reader.join().unwrap();

    let record = registry.get("shared").unwrap();
    assert_record_consistent(&record.status, record.last_seen, writers);
    assert_eq!(record.last_seen, record.updated_at);
    assert_eq!(registry.len(), 1);
}

fn assert_record_consistent(status: &str, last_seen: DateTime<Utc>, writers: usize) {
    let offset = last_seen.timestamp_millis() - 1_700_000_000_000;
    let writer = offset as usize % writers;
    assert_eq!(status, format!("writer-{}", writer), "status/timestamp mismatch");
}

#[test]
fn capacity_holds_under_concurrent_inserts() {
    let max_devices = 50;
    let registry = Arc::new(Registry::new(max_devices));

    let handles: Vec<_> = (0..4)
        .map(|writer| {
            let registry = registry.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    registry.update(&format!("dev-{}-{}", writer, i), "online", at(i));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(registry.len(), max_devices);
}

#[test]
fn sweep_concurrent_with_ingest_never_loses_devices() {
    let registry = Arc::new(Registry::new(1000));
    let adapter = IngestAdapter::new(registry.clone(), "devices/status");

    let ingest = {
        let adapter = adapter.clone();
        thread::spawn(move || {
            for i in 0..300 {
                let payload = format!("dev-{},online", i % 30);
                adapter.on_external_event("devices/status", payload.as_bytes(), true);
            }
        })
    };
    let sweep = {
        let registry = registry.clone();
        thread::spawn(move || {
            for _ in 0..300 {
                // Far in the future so every online device is stale.
                registry.sweep(Utc::now() + Duration::days(1), Duration::seconds(30));
            }
        })
    };

    ingest.join().unwrap();
    sweep.join().unwrap();

    assert_eq!(registry.len(), 30);
    for record in registry.snapshot() {
        assert!(record.status == "online" || record.status == OFFLINE);
        assert!(record.first_seen <= record.last_seen);
    }
}

#[test]
fn three_devices_with_capacity_two_evicts_older_of_first_two() {
    let registry = Registry::new(2);
    registry.update("A", "online", at(0));
    registry.update("B", "online", at(1_000));
    registry.update("C", "online", at(2_000));

    let devices: Vec<String> = registry.snapshot().into_iter().map(|r| r.device).collect();
    assert_eq!(devices, vec!["B".to_string(), "C".to_string()]);
}

#[test]
fn stale_online_device_demoted_once() {
    let registry = Registry::new(10);
    let last_seen = Utc::now() - Duration::seconds(31);
    registry.update("lamp", "online", last_seen);

    let now = Utc::now();
    registry.sweep(now, Duration::milliseconds(30_000));
    let first = registry.get("lamp").unwrap();
    registry.sweep(now + Duration::seconds(5), Duration::milliseconds(30_000));
    let second = registry.get("lamp").unwrap();

    assert_eq!(first.status, OFFLINE);
    assert_eq!(first.updated_at, now);
    assert_eq!(first.last_seen, last_seen);
    assert_eq!(first, second);
}
