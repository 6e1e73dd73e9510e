//! ==============================================================================
//! storage.rs - durable snapshot cache
//! ==============================================================================
//!
//! purpose:
//!     persists the last known value per topic plus a capped append-only log
//!     of every write, so the dashboard survives broker outages and process
//!     restarts. storage is the last truth between live pushes.
//!
//! design:
//!     - KeyValueMedium: small trait over the persistent medium, so the store
//!       runs against the real filesystem in production and an in-memory map
//!       in tests.
//!     - keys: `mqtt_<topic with '/' replaced by '_'>`, one record per topic,
//!       overwritten in place. the append log lives under the fixed key
//!       `mqtt_message_log` as a json-encoded list capped at 1000 entries.
//!     - failure mode: persistence errors are logged and swallowed; the
//!       in-memory model stays authoritative until the medium recovers.
//!
//! relationships:
//!     - used by: hub.rs (write on every message, read_latest on reload)
//!     - used by: server.rs (key count for status reporting)
//!
//! ==============================================================================

use crate::domain::{FieldId, SnapshotRecord};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

pub const SNAPSHOT_LOG_KEY: &str = "mqtt_message_log";
pub const SNAPSHOT_LOG_CAPACITY: usize = 1000;
const KEY_PREFIX: &str = "mqtt_";

/// persistent key-value medium the snapshot store writes through
pub trait KeyValueMedium: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove_all(&self) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;
}

// ==============================================================================
// filesystem medium - one file per key under the storage directory
// ==============================================================================

pub struct FsMedium {
    dir: PathBuf,
}

impl FsMedium {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create storage dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // keys contain no path separators (slashes are rewritten to '_')
        self.dir.join(key)
    }
}

impl KeyValueMedium for FsMedium {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read key {}", key)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::write(self.path_for(key), value)
            .with_context(|| format!("failed to write key {}", key))
    }

    fn remove_all(&self) -> Result<()> {
        for entry in std::fs::read_dir(&self.dir).context("failed to list storage dir")? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                std::fs::remove_file(entry.path())
                    .with_context(|| format!("failed to remove {}", entry.path().display()))?;
            }
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir).context("failed to list storage dir")? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    keys.push(name.to_string());
                }
            }
        }
        Ok(keys)
    }
}

// ==============================================================================
// in-memory medium - test double
// ==============================================================================

#[cfg(test)]
pub struct MemoryMedium {
    map: Mutex<HashMap<String, String>>,
}

#[cfg(test)]
impl MemoryMedium {
    pub fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }
}

#[cfg(test)]
impl KeyValueMedium for MemoryMedium {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_all(&self) -> Result<()> {
        self.map.lock().unwrap().clear();
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.map.lock().unwrap().keys().cloned().collect())
    }
}

// ==============================================================================
// snapshot store
// ==============================================================================

/// derive the storage key for a topic
pub fn storage_key(topic: &str) -> String {
    format!("{}{}", KEY_PREFIX, topic.replace('/', "_"))
}

pub struct SnapshotStore {
    // all medium access serializes through this lock; clear() is atomic
    // with respect to concurrent writes
    medium: Mutex<Box<dyn KeyValueMedium>>,
}

impl SnapshotStore {
    pub fn new(medium: Box<dyn KeyValueMedium>) -> Self {
        Self {
            medium: Mutex::new(medium),
        }
    }

    /// upsert the per-topic record and append it to the capped log.
    /// persistence failures are logged, never propagated.
    pub fn write(&self, record: &SnapshotRecord) {
        let medium = self.medium.lock().unwrap();
        let encoded = match serde_json::to_string(record) {
            Ok(s) => s,
            Err(e) => {
                warn!("failed to encode snapshot record for {}: {}", record.topic, e);
                return;
            }
        };
        if let Err(e) = medium.set(&storage_key(&record.topic), &encoded) {
            warn!("snapshot write failed for {}: {}", record.topic, e);
            return;
        }

        // append-only log, newest first, truncated to capacity
        let mut log = match medium.get(SNAPSHOT_LOG_KEY) {
            Ok(Some(raw)) => serde_json::from_str::<Vec<SnapshotRecord>>(&raw).unwrap_or_else(|e| {
                warn!("snapshot log corrupt, starting fresh: {}", e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("snapshot log read failed: {}", e);
                Vec::new()
            }
        };
        log.insert(0, record.clone());
        log.truncate(SNAPSHOT_LOG_CAPACITY);
        match serde_json::to_string(&log) {
            Ok(encoded) => {
                if let Err(e) = medium.set(SNAPSHOT_LOG_KEY, &encoded) {
                    warn!("snapshot log write failed: {}", e);
                }
            }
            Err(e) => warn!("failed to encode snapshot log: {}", e),
        }
    }

    /// newest persisted record per canonical field. corrupt entries are
    /// treated as absent; records without a field are diagnostic-only and
    /// skipped.
    pub fn read_latest(&self) -> HashMap<FieldId, SnapshotRecord> {
        let medium = self.medium.lock().unwrap();
        let mut latest: HashMap<FieldId, SnapshotRecord> = HashMap::new();
        let keys = match medium.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!("snapshot key listing failed: {}", e);
                return latest;
            }
        };
        for key in keys {
            if key == SNAPSHOT_LOG_KEY || !key.starts_with(KEY_PREFIX) {
                continue;
            }
            let raw = match medium.get(&key) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!("snapshot read failed for {}: {}", key, e);
                    continue;
                }
            };
            let record: SnapshotRecord = match serde_json::from_str(&raw) {
                Ok(record) => record,
                Err(e) => {
                    warn!("corrupt snapshot under {}, ignoring: {}", key, e);
                    continue;
                }
            };
            let Some(field) = record.field else { continue };
            match latest.get(&field) {
                Some(existing) if existing.observed_at >= record.observed_at => {}
                _ => {
                    latest.insert(field, record);
                }
            }
        }
        latest
    }

    /// the persisted append log, newest first
    pub fn log_entries(&self) -> Vec<SnapshotRecord> {
        let medium = self.medium.lock().unwrap();
        match medium.get(SNAPSHOT_LOG_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("snapshot log corrupt: {}", e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("snapshot log read failed: {}", e);
                Vec::new()
            }
        }
    }

    /// erase all records and the log. holds the medium lock for the whole
    /// operation so no concurrent write observes a partial clear.
    pub fn clear(&self) {
        let medium = self.medium.lock().unwrap();
        if let Err(e) = medium.remove_all() {
            warn!("snapshot clear failed: {}", e);
        }
    }

    /// number of stored keys, for status reporting
    pub fn key_count(&self) -> usize {
        let medium = self.medium.lock().unwrap();
        medium
            .keys()
            .map(|keys| keys.iter().filter(|k| k.starts_with(KEY_PREFIX)).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn record(field: Option<FieldId>, topic: &str, value: f64, secs: i64) -> SnapshotRecord {
        SnapshotRecord {
            field,
            value: json!(value),
            observed_at: Utc.timestamp_opt(secs, 0).unwrap(),
            topic: topic.to_string(),
        }
    }

    fn memory_store() -> SnapshotStore {
        SnapshotStore::new(Box::new(MemoryMedium::new()))
    }

    #[test]
    fn write_then_read_latest_round_trips() {
        let store = memory_store();
        store.write(&record(Some(FieldId::Level), "root/water/level", 42.5, 100));

        let latest = store.read_latest();
        let got = latest.get(&FieldId::Level).unwrap();
        assert_eq!(got.field, Some(FieldId::Level));
        assert_eq!(got.value, json!(42.5));
        assert_eq!(got.topic, "root/water/level");
    }

    #[test]
    fn per_topic_records_overwrite_in_place() {
        let store = memory_store();
        store.write(&record(Some(FieldId::Ph), "root/water/ph", 7.0, 100));
        store.write(&record(Some(FieldId::Ph), "root/water/ph", 7.9, 200));

        let latest = store.read_latest();
        assert_eq!(latest.get(&FieldId::Ph).unwrap().value, json!(7.9));
        // one per-topic key plus the log key
        assert_eq!(store.key_count(), 2);
    }

    #[test]
    fn log_never_exceeds_capacity() {
        let store = memory_store();
        for n in 0..1500 {
            store.write(&record(Some(FieldId::Level), "root/water/level", n as f64, n));
        }
        let log = store.log_entries();
        assert_eq!(log.len(), SNAPSHOT_LOG_CAPACITY);
        // newest first
        assert_eq!(log[0].value, json!(1499.0));
    }

    #[test]
    fn unrouted_records_persist_but_do_not_reload() {
        let store = memory_store();
        store.write(&record(None, "foo/bar", 123.0, 100));

        assert!(store.read_latest().is_empty());
        assert_eq!(store.log_entries().len(), 1);
    }

    #[test]
    fn corrupt_record_is_treated_as_absent() {
        let medium = MemoryMedium::new();
        medium.set("mqtt_root_water_level", "{not json").unwrap();
        let store = SnapshotStore::new(Box::new(medium));
        assert!(store.read_latest().is_empty());
    }

    #[test]
    fn clear_leaves_zero_keys() {
        let store = memory_store();
        store.write(&record(Some(FieldId::Level), "root/water/level", 1.0, 100));
        store.write(&record(Some(FieldId::Ph), "root/water/ph", 7.0, 100));
        store.clear();
        assert_eq!(store.key_count(), 0);
        assert!(store.read_latest().is_empty());
        assert!(store.log_entries().is_empty());
    }

    #[test]
    fn fs_medium_round_trips_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(Box::new(FsMedium::new(dir.path()).unwrap()));
        store.write(&record(Some(FieldId::Turbidity), "root/water/tds", 7.0, 100));

        let latest = store.read_latest();
        let got = latest.get(&FieldId::Turbidity).unwrap();
        assert_eq!(got.value, json!(7.0));
        assert_eq!(got.topic, "root/water/tds");

        store.clear();
        assert_eq!(store.key_count(), 0);
    }
}
