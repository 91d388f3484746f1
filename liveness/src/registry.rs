use crate::metrics::{DEVICES_DEMOTED_TOTAL, DEVICES_EVICTED_TOTAL, DEVICES_TRACKED};
use crate::model::{DeviceRecord, UpdateOutcome, OFFLINE};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// In-memory map of device id to liveness record.
///
/// All reads and writes go through one mutex, and every operation holds it for
/// the whole mutation or copy, so a reader never sees a half-applied update.
/// Nothing performs I/O while the lock is held.
#[derive(Debug)]
pub struct Registry {
    devices: Mutex<HashMap<String, DeviceRecord>>,
    max_devices: usize,
}

impl Registry {
    pub fn new(max_devices: usize) -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
            max_devices: max_devices.max(1),
        }
    }

    pub fn max_devices(&self) -> usize {
        self.max_devices
    }

    /// Records a status report. Last write wins.
    ///
    /// `last_seen` and `updated_at` advance even when the status is unchanged.
    /// Creating a new device may push the registry over capacity, in which
    /// case the record with the oldest `updated_at` is evicted before the lock
    /// is released.
    pub fn update(&self, device: &str, status: &str, timestamp: DateTime<Utc>) -> UpdateOutcome {
        let mut devices = self.lock();

        if let Some(record) = devices.get_mut(device) {
            record.status = status.to_string();
            record.last_seen = timestamp;
            record.updated_at = timestamp;
            return UpdateOutcome::Updated;
        }

        devices.insert(
            device.to_string(),
            DeviceRecord::new(device.to_string(), status.to_string(), timestamp),
        );
        let evicted = evict_oldest(&mut devices, self.max_devices).map(|record| record.device);
        DEVICES_TRACKED.set(devices.len() as f64);
        drop(devices);

        match &evicted {
            Some(evicted) => info!("New device {} pushed out {} (capacity {})", device, evicted, self.max_devices),
            None => debug!("Tracking new device {}", device),
        }
        UpdateOutcome::Created { evicted }
    }

    /// Demotes every non-offline device whose `last_seen` is more than
    /// `stale_after` before `now`. Returns the ids that were demoted.
    ///
    /// Already-offline devices are left alone, so sweeping twice is a no-op
    /// the second time. A `last_seen` in the future never goes stale.
    pub fn sweep(&self, now: DateTime<Utc>, stale_after: Duration) -> Vec<String> {
        let mut devices = self.lock();
        let mut demoted = Vec::new();

        for record in devices.values_mut() {
            if record.is_offline() || now - record.last_seen <= stale_after {
                continue;
            }
            record.status = OFFLINE.to_string();
            record.updated_at = now;
            demoted.push(record.device.clone());
        }
        drop(devices);

        DEVICES_DEMOTED_TOTAL.inc_by(demoted.len() as f64);
        demoted
    }

    /// Point-in-time copy of every record, ordered by device id.
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> = self.lock().values().cloned().collect();
        records.sort_by(|a, b| a.device.cmp(&b.device));
        records
    }

    pub fn get(&self, device: &str) -> Option<DeviceRecord> {
        self.lock().get(device).cloned()
    }

    /// Removes the record with the oldest `updated_at` if more than
    /// `max_devices` are tracked. At most one record is removed per call.
    pub fn evict_if_over_capacity(&self, max_devices: usize) -> Option<DeviceRecord> {
        let mut devices = self.lock();
        let evicted = evict_oldest(&mut devices, max_devices);
        DEVICES_TRACKED.set(devices.len() as f64);
        evicted
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave a record half-written since
    // every mutation is a plain field assignment, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, DeviceRecord>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn evict_oldest(devices: &mut HashMap<String, DeviceRecord>, max_devices: usize) -> Option<DeviceRecord> {
    if devices.len() <= max_devices {
        return None;
    }

    let oldest = devices
        .values()
        .min_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then_with(|| a.device.cmp(&b.device))
        })?
        .device
        .clone();

    DEVICES_EVICTED_TOTAL.inc();
    devices.remove(&oldest)
}
