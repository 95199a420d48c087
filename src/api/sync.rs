//! Server side of the offline-replay protocol, plus the day-end sweep hook.

use actix_web::{HttpResponse, Responder, web};
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::error;
use utoipa::ToSchema;

use crate::absence::{self, SweepError, SweepReport};
use crate::classifier::{self, Receipt, SubmitError};
use crate::config::Config;
use crate::model::scan::{CaptureMode, Direction, Identity, ScanEvent};
use crate::notify::NotificationGate;
use crate::policy::AdmissionPolicy;

#[derive(Deserialize, ToSchema)]
pub struct SyncEntry {
    /// Device-local queue id, echoed back for bookkeeping.
    pub local_id: Option<String>,
    pub identity: Identity,
    pub subject_id: i64,
    #[schema(value_type = String, format = "date-time")]
    pub captured_at: NaiveDateTime,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub direction: Option<Direction>,
}

#[derive(Deserialize, ToSchema)]
pub struct SyncRequest {
    pub operator_id: i64,
    /// Events in device capture order; processed sequentially in this order.
    pub events: Vec<SyncEntry>,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum SyncEntryResult {
    Ok {
        local_id: Option<String>,
        #[serde(flatten)]
        receipt: Receipt,
    },
    Failed {
        local_id: Option<String>,
        error: String,
        /// Whether the device should retry this entry later.
        retryable: bool,
    },
}

/// Batch replay of offline captures
///
/// Each event is classified with its own captured_at, never the sync time: a
/// 07:10 capture synced at 11:00 is still Present.
#[utoipa::path(
    post,
    path = "/api/attendance/sync",
    request_body = SyncRequest,
    responses(
        (status = 200, description = "Per-entry receipts in submission order"),
        (status = 400, description = "Empty batch")
    ),
    tag = "Sync"
)]
pub async fn sync_batch(
    pool: web::Data<SqlitePool>,
    policy: web::Data<AdmissionPolicy>,
    gate: web::Data<NotificationGate>,
    payload: web::Json<SyncRequest>,
) -> actix_web::Result<impl Responder> {
    let payload = payload.into_inner();
    if payload.events.is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "No offline attendance data provided"
        })));
    }

    let mut results = Vec::with_capacity(payload.events.len());
    let mut success_count = 0u32;
    let mut error_count = 0u32;

    for entry in payload.events {
        let event = ScanEvent {
            identity: entry.identity,
            subject_id: entry.subject_id,
            operator_id: payload.operator_id,
            captured_at: entry.captured_at,
            location: entry.location,
            notes: entry.notes,
            capture_mode: CaptureMode::Offline,
            direction: entry.direction,
        };

        match classifier::submit(&pool, &policy, &gate, event).await {
            Ok(receipt) => {
                success_count += 1;
                results.push(SyncEntryResult::Ok {
                    local_id: entry.local_id,
                    receipt,
                });
            }
            Err(e) => {
                error_count += 1;
                let retryable = matches!(
                    e,
                    SubmitError::Storage(_) | SubmitError::ConflictLoop(_)
                );
                if retryable {
                    error!(error = %e, "sync entry hit a storage failure");
                }
                results.push(SyncEntryResult::Failed {
                    local_id: entry.local_id,
                    error: e.to_string(),
                    retryable,
                });
            }
        }
    }

    Ok(HttpResponse::Ok().json(json!({
        "message": format!("Processed {success_count} attendance records with {error_count} errors"),
        "success_count": success_count,
        "error_count": error_count,
        "results": results,
    })))
}

#[derive(Deserialize, ToSchema)]
pub struct DayEndRequest {
    /// Defaults to today.
    #[schema(value_type = Option<String>, format = "date")]
    pub date: Option<NaiveDate>,
}

/// Day-end absence sweep
///
/// Marks every enrolled no-show absent through the same conditional ledger
/// insert used by live check-ins; races with late manual entries are safe.
#[utoipa::path(
    post,
    path = "/api/attendance/day-end",
    request_body = DayEndRequest,
    responses(
        (status = 200, description = "Sweep report", body = SweepReport),
        (status = 409, description = "Refused: absent cutoff not reached yet")
    ),
    tag = "Sync"
)]
pub async fn day_end(
    pool: web::Data<SqlitePool>,
    config: web::Data<Config>,
    payload: web::Json<DayEndRequest>,
) -> actix_web::Result<impl Responder> {
    let now = Local::now();
    let date = payload.date.unwrap_or_else(|| now.date_naive());

    match absence::mark_absent(&pool, date, now.time(), config.absent_cutoff).await {
        Ok(report) => Ok(HttpResponse::Ok().json(report)),
        Err(SweepError::BeforeCutoff { now, cutoff }) => {
            Ok(HttpResponse::Conflict().json(json!({
                "message": format!("Sweep can only run after {cutoff}; it is {now}")
            })))
        }
        Err(SweepError::Storage(e)) => {
            error!(error = %e, "day-end sweep failed");
            Ok(HttpResponse::InternalServerError().json(json!({
                "message": "Internal server error"
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DedupScope;
    use crate::notify::ConsoleNotifier;
    use crate::routes;
    use actix_web::{App, test, web::Data};
    use chrono::NaiveTime;
    use serde_json::Value;
    use std::sync::Arc;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn config() -> Config {
        Config {
            database_url: "sqlite::memory:".to_string(),
            server_addr: "127.0.0.1:0".to_string(),
            api_prefix: "/api".to_string(),
            checkin_start: t(6, 0),
            late_threshold: t(7, 15),
            absent_cutoff: t(16, 30),
            notify_dedup_scope: DedupScope::PerStudentDay,
            school_name: "TEST".to_string(),
            rate_scan_per_min: 120,
            scan_cooldown_secs: 300,
        }
    }

    async fn seeded_pool() -> SqlitePool {
        let pool = crate::db::test_pool().await;
        sqlx::query(
            "INSERT INTO students (id, roll, full_name, qr_token, active) \
             VALUES (1, '2026-0001', 'Ana Reyes', 'QR-ANA', 1)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO subjects (id, name, code, active) VALUES (10, 'Mathematics', 'MATH-7', 1)")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    #[actix_web::test]
    async fn sync_batch_classifies_with_original_capture_time() {
        let pool = seeded_pool().await;
        let config = config();
        let policy = AdmissionPolicy::from_config(&config);
        let gate = NotificationGate::new(
            Arc::new(ConsoleNotifier),
            DedupScope::PerStudentDay,
            "TEST".to_string(),
        );

        let app = test::init_service(
            App::new()
                .app_data(Data::new(pool.clone()))
                .app_data(Data::new(config.clone()))
                .app_data(Data::new(policy))
                .app_data(Data::new(gate))
                .configure(|cfg| routes::configure(cfg, config.clone())),
        )
        .await;

        // a 07:10 capture synced much later must still classify Present; the
        // unknown token fails permanently
        let req = test::TestRequest::post()
            .uri("/api/attendance/sync")
            .set_json(serde_json::json!({
                "operator_id": 7,
                "events": [
                    {
                        "local_id": "q-1",
                        "identity": {"kind": "student_id", "value": 1},
                        "subject_id": 10,
                        "captured_at": "2026-08-24T07:10:00"
                    },
                    {
                        "local_id": "q-2",
                        "identity": {"kind": "qr_token", "value": "QR-NOBODY"},
                        "subject_id": 10,
                        "captured_at": "2026-08-24T07:11:00"
                    }
                ]
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["success_count"], 1);
        assert_eq!(body["error_count"], 1);

        assert_eq!(body["results"][0]["local_id"], "q-1");
        assert_eq!(body["results"][0]["outcome"], "created");
        assert_eq!(body["results"][0]["status"], "present");
        assert_eq!(body["results"][0]["time_in"], "2026-08-24T07:10:00");

        assert_eq!(body["results"][1]["local_id"], "q-2");
        assert_eq!(body["results"][1]["retryable"], false);

        // the ledger row carries the capture time, not the sync time
        let record = crate::ledger::find(
            &pool,
            1,
            10,
            NaiveDate::from_ymd_opt(2026, 8, 24).unwrap(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(
            record.time_in.unwrap().time(),
            NaiveTime::from_hms_opt(7, 10, 0).unwrap()
        );
    }

    #[actix_web::test]
    async fn empty_sync_batch_is_a_bad_request() {
        let pool = seeded_pool().await;
        let config = config();
        let policy = AdmissionPolicy::from_config(&config);
        let gate = NotificationGate::new(
            Arc::new(ConsoleNotifier),
            DedupScope::PerStudentDay,
            "TEST".to_string(),
        );

        let app = test::init_service(
            App::new()
                .app_data(Data::new(pool))
                .app_data(Data::new(config.clone()))
                .app_data(Data::new(policy))
                .app_data(Data::new(gate))
                .configure(|cfg| routes::configure(cfg, config.clone())),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/attendance/sync")
            .set_json(serde_json::json!({"operator_id": 7, "events": []}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }
}
