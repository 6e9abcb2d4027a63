//! Live delivery half of the notification dispatcher. The durable half is
//! the notification rows the store commits with each transition; this
//! module only pushes to whoever is connected right now. A user with no
//! live connection misses nothing; the rows are the record.

use crate::store::PlannedNotification;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

static LIVE_CONNECTIONS: Lazy<Mutex<HashMap<i32, (u64, mpsc::UnboundedSender<String>)>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Register the caller as the live connection for `user_id`. A newer
/// connection replaces an older one; the replaced session sees its
/// receiver close and delivery falls back to durable-only.
pub fn register(user_id: i32) -> (u64, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let connection_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    LIVE_CONNECTIONS
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(user_id, (connection_id, tx));
    (connection_id, rx)
}

/// Removes the user's live connection, but only if it is still the one
/// identified by `connection_id`. A session that was already replaced
/// must not tear down its successor.
pub fn unregister(user_id: i32, connection_id: u64) {
    let mut connections = LIVE_CONNECTIONS
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    if let Some((current, _)) = connections.get(&user_id)
        && *current == connection_id
    {
        connections.remove(&user_id);
    }
}

/// Fire-and-forget push. Returns false when the user has no live
/// connection; the caller must not care.
pub fn deliver_live(user_id: i32, payload: &serde_json::Value) -> bool {
    let connections = LIVE_CONNECTIONS
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    match connections.get(&user_id) {
        Some((_, tx)) => tx.send(payload.to_string()).is_ok(),
        None => false,
    }
}

/// Push every notification of an accepted transition to its recipient's
/// live session. Called after the store committed the durable rows.
pub fn fan_out(booking_ref: &str, planned: &[PlannedNotification]) {
    for p in planned {
        let payload = serde_json::json!({
            "booking_ref": booking_ref,
            "kind": p.kind,
            "message": p.message,
        });
        deliver_live(p.user_id, &payload);
    }
}
