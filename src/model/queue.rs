use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::FromRow;
use strum_macros::{Display, EnumString};

use super::scan::ScanEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Display, EnumString, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SyncState {
    Pending,
    Synced,
}

/// Raw queue row; the embedded event is stored as JSON.
#[derive(Clone, Debug, FromRow)]
pub struct QueueRow {
    pub seq: i64,
    pub local_id: String,
    pub event_json: String,
    pub sync_state: SyncState,
    pub attempt_count: i64,
    pub queued_at: NaiveDateTime,
}

/// A buffered offline capture awaiting reconciliation.
#[derive(Clone, Debug)]
pub struct OfflineQueueEntry {
    pub seq: i64,
    pub local_id: uuid::Uuid,
    pub event: ScanEvent,
    pub sync_state: SyncState,
    pub attempt_count: i64,
    pub queued_at: NaiveDateTime,
}
