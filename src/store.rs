//! In-memory last-writer-wins store of client position records.
//!
//! One record per client, replaced atomically when a strictly newer report
//! arrives and never deleted. The strict-inequality gate makes the final
//! state independent of arrival order, and halts gossip echoes: a duplicate
//! or stale record is simply dropped on arrival.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::protocol::{LocationUpdate, PositionReport};

// ────────────────────────────────────────────────────────────────────────────
// Records
// ────────────────────────────────────────────────────────────────────────────

/// The most recent known position of one client.
#[derive(Debug, Clone)]
pub struct ClientRecord {
    /// Daemon that first heard the report directly from the client.
    pub origin_server: String,
    /// Receive time minus client time, signed, as formatted on the wire.
    pub skew: String,
    pub client_id: String,
    /// ISO-6709 short-form token, verbatim from the client.
    pub location: String,
    /// Client-asserted timestamp, parsed for comparison only.
    pub client_time: f64,
    /// The canonical `AT` line this record was derived from, single-spaced,
    /// without trailing newline. Repeated verbatim in replies and gossip.
    pub line: String,
}

impl From<&LocationUpdate> for ClientRecord {
    fn from(update: &LocationUpdate) -> Self {
        ClientRecord {
            origin_server: update.origin_server.clone(),
            skew: update.skew.clone(),
            client_id: update.client_id.clone(),
            location: update.location.clone(),
            client_time: update.client_time,
            line: update.line.clone(),
        }
    }
}

impl ClientRecord {
    /// Build the record for a report this daemon heard directly, given the
    /// skew it computed and the canonical line it will echo.
    pub fn from_report(report: &PositionReport, server_name: &str, skew: &str, line: &str) -> Self {
        ClientRecord {
            origin_server: server_name.to_string(),
            skew: skew.to_string(),
            client_id: report.client_id.clone(),
            location: report.location.clone(),
            client_time: report.client_time,
            line: line.to_string(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Shared store
// ────────────────────────────────────────────────────────────────────────────

/// Thread-safe map from client id to its latest record.
///
/// Wrapped in an `Arc<RwLock<…>>` so every connection task and gossip task
/// can reach it. Writers hold the lock only for the compare-then-swap; it is
/// never held across an await point.
pub type ClientStore = Arc<RwLock<HashMap<String, ClientRecord>>>;

/// Create a new, empty store.
pub fn new_store() -> ClientStore {
    Arc::new(RwLock::new(HashMap::new()))
}

/// Apply a record under the last-writer-wins rule.
///
/// Returns `true` when the record was inserted or replaced an older one —
/// i.e. when the caller should propagate it onward. A record whose
/// `client_time` is equal to or older than the stored one leaves the store
/// untouched and returns `false`.
pub fn apply_update(store: &ClientStore, record: ClientRecord) -> bool {
    let mut writer = store.write();
    match writer.get(&record.client_id) {
        Some(existing) if record.client_time <= existing.client_time => false,
        _ => {
            writer.insert(record.client_id.clone(), record);
            true
        }
    }
}

/// Snapshot the record for one client, if any.
pub fn lookup(store: &ClientStore, client_id: &str) -> Option<ClientRecord> {
    store.read().get(client_id).cloned()
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
