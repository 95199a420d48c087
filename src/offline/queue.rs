//! Durable capture buffer on the recording device.
//!
//! Entries are appended while offline and replayed in capture order when
//! connectivity returns. Synced entries are kept (never deleted) as the
//! device-side audit trail.

use chrono::Local;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::model::queue::{OfflineQueueEntry, QueueRow, SyncState};
use crate::model::scan::ScanEvent;
use crate::policy::{AdmissionPolicy, Verdict};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("queue entry codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct OfflineQueue {
    pool: SqlitePool,
}

impl OfflineQueue {
    /// Open (and if needed create) the device-local queue store.
    pub async fn open(database_url: &str) -> Result<Self, QueueError> {
        let pool = SqlitePool::connect(database_url).await?;
        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self, QueueError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS offline_queue (
                seq           INTEGER PRIMARY KEY AUTOINCREMENT,
                local_id      TEXT NOT NULL UNIQUE,
                event_json    TEXT NOT NULL,
                sync_state    TEXT NOT NULL DEFAULT 'pending',
                attempt_count INTEGER NOT NULL DEFAULT 0,
                queued_at     TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    /// Buffer a capture and return it with an advisory verdict for immediate
    /// UI feedback. The verdict comes from the same AdmissionPolicy the server
    /// applies and is never trusted at commit time.
    pub async fn append(
        &self,
        event: &ScanEvent,
        policy: &AdmissionPolicy,
    ) -> Result<(OfflineQueueEntry, Verdict), QueueError> {
        let local_id = Uuid::new_v4();
        let queued_at = Local::now().naive_local();
        let event_json = serde_json::to_string(event)?;

        let done = sqlx::query(
            "INSERT INTO offline_queue (local_id, event_json, sync_state, queued_at) \
             VALUES (?, ?, 'pending', ?)",
        )
        .bind(local_id.to_string())
        .bind(&event_json)
        .bind(queued_at)
        .execute(&self.pool)
        .await?;

        let advisory = policy.classify(event.captured_at.time());
        debug!(seq = done.last_insert_rowid(), ?advisory, "buffered offline capture");

        Ok((
            OfflineQueueEntry {
                seq: done.last_insert_rowid(),
                local_id,
                event: event.clone(),
                sync_state: SyncState::Pending,
                attempt_count: 0,
                queued_at,
            },
            advisory,
        ))
    }

    /// Pending entries in strict capture order.
    pub async fn pending(&self) -> Result<Vec<OfflineQueueEntry>, QueueError> {
        let rows = sqlx::query_as::<_, QueueRow>(
            "SELECT seq, local_id, event_json, sync_state, attempt_count, queued_at \
             FROM offline_queue WHERE sync_state = 'pending' ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_row).collect()
    }

    pub async fn mark_synced(&self, seq: i64) -> Result<(), QueueError> {
        sqlx::query("UPDATE offline_queue SET sync_state = 'synced' WHERE seq = ?")
            .bind(seq)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn bump_attempt(&self, seq: i64) -> Result<(), QueueError> {
        sqlx::query("UPDATE offline_queue SET attempt_count = attempt_count + 1 WHERE seq = ?")
            .bind(seq)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn decode_row(row: QueueRow) -> Result<OfflineQueueEntry, QueueError> {
    Ok(OfflineQueueEntry {
        seq: row.seq,
        local_id: Uuid::parse_str(&row.local_id).unwrap_or_else(|_| Uuid::nil()),
        event: serde_json::from_str::<ScanEvent>(&row.event_json)?,
        sync_state: row.sync_state,
        attempt_count: row.attempt_count,
        queued_at: row.queued_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::scan::{CaptureMode, Identity};
    use chrono::NaiveDate;

    fn event(h: u32, m: u32) -> ScanEvent {
        ScanEvent {
            identity: Identity::QrToken("QR-1".into()),
            subject_id: 10,
            operator_id: 7,
            captured_at: NaiveDate::from_ymd_opt(2026, 8, 24)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap(),
            location: Some("Gate A".into()),
            notes: None,
            capture_mode: CaptureMode::Offline,
            direction: None,
        }
    }

    async fn queue() -> OfflineQueue {
        let pool = crate::db::mem_pool().await;
        OfflineQueue::with_pool(pool).await.unwrap()
    }

    #[actix_web::test]
    async fn append_gives_advisory_from_shared_policy() {
        let queue = queue().await;
        let policy = AdmissionPolicy::default();

        let (_, advisory) = queue.append(&event(7, 10), &policy).await.unwrap();
        assert_eq!(advisory, Verdict::Present);
        let (_, advisory) = queue.append(&event(8, 0), &policy).await.unwrap();
        assert_eq!(advisory, Verdict::Late);
    }

    #[actix_web::test]
    async fn pending_preserves_capture_order_and_skips_synced() {
        let queue = queue().await;
        let policy = AdmissionPolicy::default();

        let (first, _) = queue.append(&event(7, 0), &policy).await.unwrap();
        let (second, _) = queue.append(&event(7, 1), &policy).await.unwrap();
        let (third, _) = queue.append(&event(7, 2), &policy).await.unwrap();

        queue.mark_synced(second.seq).await.unwrap();

        let pending = queue.pending().await.unwrap();
        let seqs: Vec<i64> = pending.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![first.seq, third.seq]);
        assert!(pending.iter().all(|e| e.sync_state == SyncState::Pending));
    }

    #[actix_web::test]
    async fn attempt_counter_is_bounded_bookkeeping_only() {
        let queue = queue().await;
        let policy = AdmissionPolicy::default();

        let (entry, _) = queue.append(&event(7, 0), &policy).await.unwrap();
        queue.bump_attempt(entry.seq).await.unwrap();
        queue.bump_attempt(entry.seq).await.unwrap();

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending[0].attempt_count, 2);
    }
}
