//! Guardian notification gate.
//!
//! Delivery is fire-and-forget relative to the classifier: the operator's
//! receipt never waits on the SMS gateway, and a gateway failure is recorded
//! in the notification log, never surfaced.

use std::sync::Arc;

use chrono::Local;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::classifier::{Outcome, Receipt};
use crate::config::DedupScope;
use crate::model::notification::NotificationKind;

pub struct NotifyResult {
    pub delivered: bool,
    pub detail: String,
}

/// External SMS transport contract. Consumed synchronously; the result feeds
/// the notification log and nothing else.
pub trait Notifier: Send + Sync {
    fn send(&self, phone: &str, message: &str) -> NotifyResult;
}

/// Stand-in transport: writes the message to the log stream and reports it
/// delivered. Swapped for a real gateway client in deployment.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn send(&self, phone: &str, message: &str) -> NotifyResult {
        info!(phone, message, "guardian notification");
        NotifyResult {
            delivered: true,
            detail: "logged to console".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct NotificationGate {
    notifier: Arc<dyn Notifier>,
    scope: DedupScope,
    school_name: String,
}

impl NotificationGate {
    pub fn new(notifier: Arc<dyn Notifier>, scope: DedupScope, school_name: String) -> Self {
        Self {
            notifier,
            scope,
            school_name,
        }
    }

    /// Spawn delivery off the request path. The classifier outcome is already
    /// decided by the time this runs.
    pub fn dispatch(&self, pool: SqlitePool, receipt: Receipt) {
        let gate = self.clone();
        actix_web::rt::spawn(async move {
            if let Err(e) = gate.handle(&pool, &receipt).await {
                warn!(error = %e, student_id = receipt.student_id, "notification handling failed");
            }
        });
    }

    /// Decide, send, and log one notification for a classifier outcome.
    pub async fn handle(&self, pool: &SqlitePool, receipt: &Receipt) -> Result<(), sqlx::Error> {
        let (kind, message) = match receipt.outcome {
            Outcome::Created | Outcome::Adopted => {
                (NotificationKind::Checkin, self.checkin_message(receipt))
            }
            Outcome::CheckedOut { early } => {
                (NotificationKind::Checkout, self.checkout_message(receipt, early))
            }
            // Rejections and duplicates never notify
            _ => return Ok(()),
        };

        // Check-ins dedup per day; each checkout is new information.
        if kind == NotificationKind::Checkin
            && self.already_notified(pool, receipt).await?
        {
            debug!(
                student_id = receipt.student_id,
                date = %receipt.date,
                "check-in notification already delivered today, skipping"
            );
            return Ok(());
        }

        let result = match self.guardian_phone(pool, receipt.student_id).await? {
            Some(phone) => self.notifier.send(&phone, &message),
            None => NotifyResult {
                delivered: false,
                detail: "no primary guardian phone on file".to_string(),
            },
        };

        if !result.delivered {
            warn!(
                student_id = receipt.student_id,
                detail = %result.detail,
                "guardian notification not delivered"
            );
        }

        sqlx::query(
            "INSERT INTO notification_log \
             (student_id, subject_id, attendance_date, kind, delivered, detail, sent_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(receipt.student_id)
        .bind(receipt.subject_id)
        .bind(receipt.date)
        .bind(kind)
        .bind(result.delivered)
        .bind(&result.detail)
        .bind(Local::now().naive_local())
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn already_notified(
        &self,
        pool: &SqlitePool,
        receipt: &Receipt,
    ) -> Result<bool, sqlx::Error> {
        let count: i64 = match self.scope {
            DedupScope::PerStudentDay => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM notification_log \
                     WHERE student_id = ? AND attendance_date = ? \
                       AND kind = 'checkin' AND delivered = 1",
                )
                .bind(receipt.student_id)
                .bind(receipt.date)
                .fetch_one(pool)
                .await?
            }
            DedupScope::PerSubjectDay => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM notification_log \
                     WHERE student_id = ? AND subject_id = ? AND attendance_date = ? \
                       AND kind = 'checkin' AND delivered = 1",
                )
                .bind(receipt.student_id)
                .bind(receipt.subject_id)
                .bind(receipt.date)
                .fetch_one(pool)
                .await?
            }
        };
        Ok(count > 0)
    }

    async fn guardian_phone(
        &self,
        pool: &SqlitePool,
        student_id: i64,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT phone FROM guardians \
             WHERE student_id = ? AND is_primary = 1 AND phone IS NOT NULL \
             LIMIT 1",
        )
        .bind(student_id)
        .fetch_optional(pool)
        .await
    }

    fn checkin_message(&self, receipt: &Receipt) -> String {
        let arrived = match receipt.status {
            Some(crate::model::attendance::AttendanceStatus::Late) => "arrived late to",
            _ => "arrived at",
        };
        format!(
            "Hi! Your child {} has {} {} class at {} on {}. - {}",
            receipt.student_name,
            arrived,
            receipt.subject_name,
            fmt_time(receipt.time_in),
            fmt_date(receipt),
            self.school_name
        )
    }

    fn checkout_message(&self, receipt: &Receipt, early: bool) -> String {
        let action = if early { "left" } else { "finished" };
        let suffix = if early { " early" } else { "" };
        format!(
            "Hi! Your child {} has {} {} class{} at {} on {}. - {}",
            receipt.student_name,
            action,
            receipt.subject_name,
            suffix,
            fmt_time(receipt.time_out),
            fmt_date(receipt),
            self.school_name
        )
    }
}

fn fmt_time(ts: Option<chrono::NaiveDateTime>) -> String {
    match ts {
        Some(ts) => ts.format("%I:%M %p").to_string(),
        None => "-".to_string(),
    }
}

fn fmt_date(receipt: &Receipt) -> String {
    receipt.date.format("%B %e, %Y").to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;
    use crate::classifier::RejectReason;
    use crate::model::attendance::AttendanceStatus;

    /// Records every send instead of delivering anything.
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingNotifier {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }

        fn messages(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn send(&self, phone: &str, message: &str) -> NotifyResult {
            self.sent
                .lock()
                .unwrap()
                .push((phone.to_string(), message.to_string()));
            NotifyResult {
                delivered: true,
                detail: "recorded".to_string(),
            }
        }
    }

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 9)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn receipt(outcome: Outcome, subject_id: i64, subject_name: &str) -> Receipt {
        Receipt {
            outcome,
            message: String::new(),
            student_id: 1,
            student_name: "Ana Reyes".to_string(),
            roll: "2026-0001".to_string(),
            subject_id,
            subject_name: subject_name.to_string(),
            section_name: Some("Mabini".to_string()),
            date: NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
            status: Some(AttendanceStatus::Present),
            time_in: Some(ts(7, 5)),
            time_out: None,
        }
    }

    async fn pool_with_guardian() -> SqlitePool {
        let pool = crate::db::test_pool().await;
        sqlx::query(
            "INSERT INTO guardians (student_id, full_name, phone, is_primary) \
             VALUES (1, 'Maria Reyes', '+639171234567', 1)",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    fn gate(notifier: Arc<RecordingNotifier>, scope: DedupScope) -> NotificationGate {
        NotificationGate::new(notifier, scope, "KES-SMART".to_string())
    }

    async fn log_count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM notification_log")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[actix_web::test]
    async fn checkin_notifies_once_per_student_per_day() {
        let pool = pool_with_guardian().await;
        let notifier = RecordingNotifier::new();
        let gate = gate(notifier.clone(), DedupScope::PerStudentDay);

        gate.handle(&pool, &receipt(Outcome::Created, 10, "Mathematics"))
            .await
            .unwrap();
        gate.handle(&pool, &receipt(Outcome::Created, 11, "Science"))
            .await
            .unwrap();

        let sent = notifier.messages();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("arrived at Mathematics"));
        // Only the first attempt reaches the log; the dedup skip writes nothing.
        assert_eq!(log_count(&pool).await, 1);
    }

    #[actix_web::test]
    async fn per_subject_scope_notifies_each_subject() {
        let pool = pool_with_guardian().await;
        let notifier = RecordingNotifier::new();
        let gate = gate(notifier.clone(), DedupScope::PerSubjectDay);

        gate.handle(&pool, &receipt(Outcome::Created, 10, "Mathematics"))
            .await
            .unwrap();
        gate.handle(&pool, &receipt(Outcome::Adopted, 11, "Science"))
            .await
            .unwrap();
        // Same subject again stays deduplicated.
        gate.handle(&pool, &receipt(Outcome::Created, 10, "Mathematics"))
            .await
            .unwrap();

        assert_eq!(notifier.messages().len(), 2);
    }

    #[actix_web::test]
    async fn checkout_always_sends() {
        let pool = pool_with_guardian().await;
        let notifier = RecordingNotifier::new();
        let gate = gate(notifier.clone(), DedupScope::PerStudentDay);

        gate.handle(&pool, &receipt(Outcome::Created, 10, "Mathematics"))
            .await
            .unwrap();

        let mut out = receipt(Outcome::CheckedOut { early: false }, 10, "Mathematics");
        out.time_out = Some(ts(16, 45));
        gate.handle(&pool, &out).await.unwrap();

        let mut early = receipt(Outcome::CheckedOut { early: true }, 11, "Science");
        early.time_out = Some(ts(14, 10));
        gate.handle(&pool, &early).await.unwrap();

        let sent = notifier.messages();
        assert_eq!(sent.len(), 3);
        assert!(sent[1].1.contains("finished Mathematics class at"));
        assert!(sent[2].1.contains("left Science class early at"));
    }

    #[actix_web::test]
    async fn late_checkin_message_reads_arrived_late() {
        let pool = pool_with_guardian().await;
        let notifier = RecordingNotifier::new();
        let gate = gate(notifier.clone(), DedupScope::PerStudentDay);

        let mut r = receipt(Outcome::Created, 10, "Mathematics");
        r.status = Some(AttendanceStatus::Late);
        r.time_in = Some(ts(7, 40));
        gate.handle(&pool, &r).await.unwrap();

        let sent = notifier.messages();
        assert!(sent[0].1.contains("arrived late to Mathematics"));
        assert!(sent[0].1.contains("07:40 AM"));
    }

    #[actix_web::test]
    async fn rejections_and_duplicates_never_notify() {
        let pool = pool_with_guardian().await;
        let notifier = RecordingNotifier::new();
        let gate = gate(notifier.clone(), DedupScope::PerStudentDay);

        gate.handle(
            &pool,
            &receipt(
                Outcome::Rejected {
                    reason: RejectReason::Closed,
                },
                10,
                "Mathematics",
            ),
        )
        .await
        .unwrap();
        gate.handle(&pool, &receipt(Outcome::AlreadyComplete, 10, "Mathematics"))
            .await
            .unwrap();

        assert!(notifier.messages().is_empty());
        assert_eq!(log_count(&pool).await, 0);
    }

    #[actix_web::test]
    async fn missing_guardian_phone_is_logged_not_sent() {
        let pool = crate::db::test_pool().await;
        let notifier = RecordingNotifier::new();
        let gate = gate(notifier.clone(), DedupScope::PerStudentDay);

        gate.handle(&pool, &receipt(Outcome::Created, 10, "Mathematics"))
            .await
            .unwrap();

        assert!(notifier.messages().is_empty());
        let delivered: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notification_log WHERE delivered = 1")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(delivered, 0);
        assert_eq!(log_count(&pool).await, 1);

        // An undelivered attempt does not consume the daily dedup slot.
        gate.handle(&pool, &receipt(Outcome::Created, 11, "Science"))
            .await
            .unwrap();
        assert_eq!(log_count(&pool).await, 2);
    }
}
