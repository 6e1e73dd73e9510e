use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// canonical sensor measurement slots tracked by the hub
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldId {
    Level,
    Ph,
    Turbidity,
    Temperature,
    DissolvedOxygen,
    Tds,
    Battery,
}

impl FieldId {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldId::Level => "level",
            FieldId::Ph => "ph",
            FieldId::Turbidity => "turbidity",
            FieldId::Temperature => "temperature",
            FieldId::DissolvedOxygen => "dissolved_oxygen",
            FieldId::Tds => "tds",
            FieldId::Battery => "battery",
        }
    }
}

/// one decoded measurement, immutable once created
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reading {
    pub field: FieldId,
    /// decoded value: number, string or json object
    pub value: Value,
    pub source_topic: String,
    pub observed_at: DateTime<Utc>,
}

/// best-known value for one field
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldSlot {
    pub value: Value,
    /// none until the first accepted reading or snapshot record
    pub last_updated: Option<DateTime<Utc>>,
}

impl FieldSlot {
    fn placeholder(value: Value) -> Self {
        Self {
            value,
            last_updated: None,
        }
    }
}

/// current best-known value per field, merged from the live stream and the
/// persisted snapshot cache. mutated only under the hub lock.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CanonicalModel {
    pub slots: HashMap<FieldId, FieldSlot>,
    /// aggregate timestamp across all fields
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for CanonicalModel {
    fn default() -> Self {
        // placeholder values match the dashboard defaults before any data
        let mut slots = HashMap::new();
        slots.insert(FieldId::Level, FieldSlot::placeholder(Value::from(0)));
        slots.insert(FieldId::Ph, FieldSlot::placeholder(Value::from(7.0)));
        slots.insert(FieldId::Turbidity, FieldSlot::placeholder(Value::from(0)));
        slots.insert(
            FieldId::Temperature,
            FieldSlot::placeholder(Value::from(20)),
        );
        slots.insert(
            FieldId::DissolvedOxygen,
            FieldSlot::placeholder(Value::from(8.0)),
        );
        Self {
            slots,
            last_updated: None,
        }
    }
}

impl CanonicalModel {
    /// last-write-wins by timestamp per field. returns true if the value was
    /// accepted, false if a newer value already occupies the slot.
    pub fn apply(&mut self, field: FieldId, value: Value, observed_at: DateTime<Utc>) -> bool {
        let slot = self.slots.entry(field).or_insert_with(|| FieldSlot {
            value: Value::Null,
            last_updated: None,
        });
        if let Some(current) = slot.last_updated {
            if observed_at < current {
                return false;
            }
        }
        slot.value = value;
        slot.last_updated = Some(observed_at);
        if self.last_updated.map_or(true, |agg| observed_at > agg) {
            self.last_updated = Some(observed_at);
        }
        true
    }

    pub fn value(&self, field: FieldId) -> Option<&Value> {
        self.slots.get(&field).map(|s| &s.value)
    }

    pub fn field_updated_at(&self, field: FieldId) -> Option<DateTime<Utc>> {
        self.slots.get(&field).and_then(|s| s.last_updated)
    }
}

/// one raw broker message kept for diagnostic display
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageLogEntry {
    pub id: String,
    pub topic: String,
    /// payload as received, lossily decoded to utf-8
    pub payload: String,
    pub size: usize,
    pub observed_at: DateTime<Utc>,
}

/// latest persisted value for one topic. `field` is none for topics outside
/// both naming schemes; those records are kept for diagnostics only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub field: Option<FieldId>,
    pub value: Value,
    pub observed_at: DateTime<Utc>,
    pub topic: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn apply_accepts_newer_and_rejects_older() {
        let mut model = CanonicalModel::default();
        assert!(model.apply(FieldId::Level, Value::from(42.5), ts(10)));
        assert!(!model.apply(FieldId::Level, Value::from(1.0), ts(5)));
        assert_eq!(model.value(FieldId::Level), Some(&Value::from(42.5)));
        assert!(model.apply(FieldId::Level, Value::from(2.0), ts(20)));
        assert_eq!(model.value(FieldId::Level), Some(&Value::from(2.0)));
    }

    #[test]
    fn placeholder_slots_accept_any_timestamp() {
        let mut model = CanonicalModel::default();
        // defaults carry no last_updated, so even an old reading lands
        assert!(model.apply(FieldId::Ph, Value::from(6.5), ts(1)));
        assert_eq!(model.field_updated_at(FieldId::Ph), Some(ts(1)));
    }

    #[test]
    fn aggregate_tracks_newest_field() {
        let mut model = CanonicalModel::default();
        model.apply(FieldId::Level, Value::from(1.0), ts(30));
        model.apply(FieldId::Ph, Value::from(7.2), ts(10));
        assert_eq!(model.last_updated, Some(ts(30)));
    }
}
