//! ==============================================================================
//! hub.rs - ingestion and reconciliation core
//! ==============================================================================
//!
//! purpose:
//!     owns the in-session state (canonical model + message log) and the
//!     snapshot store, and funnels both update paths through one lock:
//!     - live path:  broker message -> parse -> route -> log/store/model
//!     - timer path: periodic snapshot reload -> merge into the model
//!
//!     conflicts between the two paths resolve by recency: last-write-wins
//!     on the per-field observed_at timestamp, so a stale snapshot never
//!     clobbers a fresher live reading and a fresher snapshot wins after a
//!     connection gap.
//!
//! relationships:
//!     - used by: connection.rs (live path), main.rs (reload timer),
//!       server.rs (read-only snapshots + operator clear)
//!     - uses: payload.rs, router.rs, message_log.rs, storage.rs
//!
//! ==============================================================================

use crate::domain::{CanonicalModel, FieldId, MessageLogEntry, Reading, SnapshotRecord};
use crate::message_log::MessageLog;
use crate::payload;
use crate::router::{RouteResult, TopicRouter};
use crate::storage::SnapshotStore;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

struct HubInner {
    model: CanonicalModel,
    log: MessageLog,
}

/// shared handle to the ingestion core. cheap to clone behind an Arc;
/// every entry point serializes against the inner lock.
pub struct WaterHub {
    router: TopicRouter,
    store: SnapshotStore,
    inner: Mutex<HubInner>,
}

impl WaterHub {
    pub fn new(router: TopicRouter, store: SnapshotStore) -> Self {
        Self {
            router,
            store,
            inner: Mutex::new(HubInner {
                model: CanonicalModel::default(),
                log: MessageLog::new(),
            }),
        }
    }

    pub fn router(&self) -> &TopicRouter {
        &self.router
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// live path: one raw broker message. always logged and persisted;
    /// applied to the canonical model only when it routes to a field and
    /// carries a usable value. decode and routing misses are silent.
    pub async fn handle_message(&self, topic: &str, raw: &[u8]) {
        let observed_at = Utc::now();
        let parsed = payload::parse(raw);
        let route = self.router.route(topic);
        let reading = self.router.extract_reading(route, &parsed, topic, observed_at);

        let mut inner = self.inner.lock().await;
        inner.log.append(MessageLogEntry {
            id: Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(raw).into_owned(),
            size: raw.len(),
            observed_at,
        });

        // every message is persisted by topic, routed or not
        let record = SnapshotRecord {
            field: reading.as_ref().map(|r| r.field),
            value: reading
                .as_ref()
                .map(|r| r.value.clone())
                .unwrap_or_else(|| parsed.to_value()),
            observed_at,
            topic: topic.to_string(),
        };
        self.store.write(&record);

        match reading {
            Some(reading) => {
                debug!(topic, field = reading.field.as_str(), "reading accepted");
                Self::apply_reading(&mut inner.model, &reading);
            }
            None if route == RouteResult::Unrouted => {
                debug!(topic, "unrouted message, logged only");
            }
            None => {
                debug!(topic, "unusable payload under known scheme, logged only");
            }
        }
    }

    /// merge one live reading into the model (last-write-wins per field).
    /// battery is diagnostic-only and never enters the model.
    pub async fn apply_live(&self, reading: Reading) {
        let mut inner = self.inner.lock().await;
        Self::apply_reading(&mut inner.model, &reading);
    }

    /// merge reloaded snapshot records into the model, recency winning
    pub async fn apply_snapshot(&self, records: HashMap<FieldId, SnapshotRecord>) {
        let mut inner = self.inner.lock().await;
        let mut applied = 0usize;
        for (field, record) in records {
            if field == FieldId::Battery {
                continue;
            }
            if inner.model.apply(field, record.value, record.observed_at) {
                applied += 1;
            }
        }
        if applied > 0 {
            debug!(applied, "snapshot records merged into model");
        }
    }

    /// timer path: reload the store and merge it in
    pub async fn reload_from_store(&self) {
        let records = self.store.read_latest();
        self.apply_snapshot(records).await;
    }

    /// operator command: reset store, model and log to their defaults.
    /// holds the hub lock across all three so no reader observes a partial
    /// clear.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        self.store.clear();
        inner.model = CanonicalModel::default();
        inner.log.clear();
    }

    pub async fn model_snapshot(&self) -> CanonicalModel {
        self.inner.lock().await.model.clone()
    }

    pub async fn messages_snapshot(&self) -> Vec<MessageLogEntry> {
        self.inner.lock().await.log.snapshot()
    }

    fn apply_reading(model: &mut CanonicalModel, reading: &Reading) {
        if reading.field == FieldId::Battery {
            return;
        }
        model.apply(reading.field, reading.value.clone(), reading.observed_at);
    }
}
