//! Live submission endpoints.
//!
//! Three thin identity adapters (QR token, roll number, manual pick), all
//! feeding the one classifier entry point. None of them duplicates any state
//! machine logic.

use actix_web::{HttpResponse, Responder, web};
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::classifier::{self, Receipt, RejectReason, SubmitError};
use crate::config::Config;
use crate::identity;
use crate::ledger;
use crate::model::scan::{CaptureMode, Direction, Identity, ScanEvent};
use crate::notify::NotificationGate;
use crate::policy::AdmissionPolicy;
use crate::utils::cooldown;

#[derive(Deserialize, ToSchema)]
pub struct ScanRequest {
    #[schema(example = "QR-2026-0001")]
    pub qr_token: String,
    pub subject_id: i64,
    pub operator_id: i64,
    pub location: Option<String>,
    pub notes: Option<String>,
    /// Defaults to the server clock when absent.
    #[schema(value_type = Option<String>, format = "date-time")]
    pub captured_at: Option<NaiveDateTime>,
    pub direction: Option<Direction>,
}

#[derive(Deserialize, ToSchema)]
pub struct RollRequest {
    #[schema(example = "2026-0001")]
    pub roll: String,
    pub subject_id: i64,
    pub operator_id: i64,
    pub location: Option<String>,
    pub notes: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub captured_at: Option<NaiveDateTime>,
    pub direction: Option<Direction>,
}

#[derive(Deserialize, ToSchema)]
pub struct ManualRequest {
    pub student_id: i64,
    pub subject_id: i64,
    pub operator_id: i64,
    pub location: Option<String>,
    pub notes: Option<String>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub captured_at: Option<NaiveDateTime>,
    pub direction: Option<Direction>,
}

/// QR scan check-in/checkout
#[utoipa::path(
    post,
    path = "/api/attendance/scan",
    request_body = ScanRequest,
    responses(
        (status = 200, description = "Structured receipt with the tagged outcome", body = Receipt),
        (status = 404, description = "No active student for this QR token"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Attendance"
)]
pub async fn scan(
    pool: web::Data<SqlitePool>,
    config: web::Data<Config>,
    policy: web::Data<AdmissionPolicy>,
    gate: web::Data<NotificationGate>,
    payload: web::Json<ScanRequest>,
) -> actix_web::Result<impl Responder> {
    let payload = payload.into_inner();

    // Resolve up front so the cooldown guard can key on the student id, the
    // way the original scanner validated before its cooldown check.
    let student = match identity::resolve(&pool, &Identity::QrToken(payload.qr_token.clone())).await
    {
        Ok(Some(student)) => student,
        Ok(None) => {
            return Ok(HttpResponse::NotFound().json(json!({
                "message": "No active student matches this QR code"
            })));
        }
        Err(e) => {
            error!(error = %e, "identity lookup failed");
            return Ok(HttpResponse::InternalServerError().json(json!({
                "message": "Internal server error"
            })));
        }
    };

    let window = Duration::from_secs(config.scan_cooldown_secs);
    if cooldown::hit(student.id, payload.subject_id, window).await {
        warn!(student_id = student.id, subject_id = payload.subject_id, "scan inside cooldown");
        // same receipt shape as a classifier outcome, so callers never branch
        // on a second response schema
        let date = payload
            .captured_at
            .unwrap_or_else(|| Local::now().naive_local())
            .date();
        let result = classifier::rejection_receipt(
            &pool,
            student,
            payload.subject_id,
            date,
            RejectReason::Cooldown,
        )
        .await;
        return Ok(match result {
            Ok(receipt) => HttpResponse::Ok().json(receipt),
            Err(SubmitError::SubjectNotFound(id)) => HttpResponse::NotFound().json(json!({
                "message": format!("Subject {id} not found or inactive")
            })),
            Err(e) => {
                error!(error = %e, "cooldown receipt lookup failed");
                HttpResponse::InternalServerError().json(json!({
                    "message": "Internal server error"
                }))
            }
        });
    }

    // The event keeps the QR identity so the record's source stays 'scan'.
    let event = ScanEvent {
        identity: Identity::QrToken(payload.qr_token),
        subject_id: payload.subject_id,
        operator_id: payload.operator_id,
        captured_at: payload.captured_at.unwrap_or_else(|| Local::now().naive_local()),
        location: payload.location,
        notes: payload.notes,
        capture_mode: CaptureMode::Online,
        direction: payload.direction,
    };
    Ok(respond(&pool, &policy, &gate, event).await)
}

/// Roll-number check-in/checkout
#[utoipa::path(
    post,
    path = "/api/attendance/roll",
    request_body = RollRequest,
    responses(
        (status = 200, description = "Structured receipt with the tagged outcome", body = Receipt),
        (status = 404, description = "No active student with this roll number"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Attendance"
)]
pub async fn roll(
    pool: web::Data<SqlitePool>,
    policy: web::Data<AdmissionPolicy>,
    gate: web::Data<NotificationGate>,
    payload: web::Json<RollRequest>,
) -> actix_web::Result<impl Responder> {
    let payload = payload.into_inner();
    let event = ScanEvent {
        identity: Identity::Roll(payload.roll),
        subject_id: payload.subject_id,
        operator_id: payload.operator_id,
        captured_at: payload.captured_at.unwrap_or_else(|| Local::now().naive_local()),
        location: payload.location,
        notes: payload.notes,
        capture_mode: CaptureMode::Online,
        direction: payload.direction,
    };
    Ok(respond(&pool, &policy, &gate, event).await)
}

/// Manual student pick check-in/checkout
#[utoipa::path(
    post,
    path = "/api/attendance/manual",
    request_body = ManualRequest,
    responses(
        (status = 200, description = "Structured receipt with the tagged outcome", body = Receipt),
        (status = 404, description = "No active student with this id"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Attendance"
)]
pub async fn manual(
    pool: web::Data<SqlitePool>,
    policy: web::Data<AdmissionPolicy>,
    gate: web::Data<NotificationGate>,
    payload: web::Json<ManualRequest>,
) -> actix_web::Result<impl Responder> {
    let payload = payload.into_inner();
    let event = ScanEvent {
        identity: Identity::StudentId(payload.student_id),
        subject_id: payload.subject_id,
        operator_id: payload.operator_id,
        captured_at: payload.captured_at.unwrap_or_else(|| Local::now().naive_local()),
        location: payload.location,
        notes: payload.notes,
        capture_mode: CaptureMode::Online,
        direction: payload.direction,
    };
    Ok(respond(&pool, &policy, &gate, event).await)
}

/// Ledger lookup
#[utoipa::path(
    get,
    path = "/api/attendance/{student_id}/{subject_id}/{date}",
    params(
        ("student_id" = i64, Path, description = "Student id"),
        ("subject_id" = i64, Path, description = "Subject id"),
        ("date" = String, Path, description = "Attendance date, YYYY-MM-DD")
    ),
    responses(
        (status = 200, description = "Attendance record for the key"),
        (status = 404, description = "No record for this key")
    ),
    tag = "Attendance"
)]
pub async fn find(
    pool: web::Data<SqlitePool>,
    path: web::Path<(i64, i64, NaiveDate)>,
) -> actix_web::Result<impl Responder> {
    let (student_id, subject_id, date) = path.into_inner();

    match ledger::find(&pool, student_id, subject_id, date).await {
        Ok(Some(record)) => Ok(HttpResponse::Ok().json(record)),
        Ok(None) => Ok(HttpResponse::NotFound().json(json!({
            "message": "No attendance record for this student, subject and date"
        }))),
        Err(e) => {
            error!(error = %e, student_id, subject_id, "ledger lookup failed");
            Ok(HttpResponse::InternalServerError().json(json!({
                "message": "Internal server error"
            })))
        }
    }
}

async fn respond(
    pool: &SqlitePool,
    policy: &AdmissionPolicy,
    gate: &NotificationGate,
    event: ScanEvent,
) -> HttpResponse {
    match classifier::submit(pool, policy, gate, event).await {
        Ok(receipt) => HttpResponse::Ok().json(receipt),
        Err(SubmitError::IdentityNotFound) => HttpResponse::NotFound().json(json!({
            "message": "Student not found"
        })),
        Err(SubmitError::SubjectNotFound(id)) => HttpResponse::NotFound().json(json!({
            "message": format!("Subject {id} not found or inactive")
        })),
        Err(e) => {
            error!(error = %e, "attendance submission failed");
            HttpResponse::InternalServerError().json(json!({
                "message": "Internal server error"
            }))
        }
    }
}
