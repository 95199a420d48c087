//! The attendance-event state machine.
//!
//! Every path into the system (live QR scan, roll-number entry, manual pick,
//! the batch sync endpoint, the device reconciler) funnels through [`submit`].
//! The verdict is computed from the event's own captured_at, never from the
//! wall clock at processing time, so live and replayed events classify
//! identically.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::ledger::{self, InsertResult};
use crate::model::attendance::{AttendanceRecord, AttendanceStatus};
use crate::model::directory::Student;
use crate::model::scan::{CaptureMode, Direction, ScanEvent};
use crate::notify::NotificationGate;
use crate::policy::{AdmissionPolicy, Verdict};
use crate::identity;

/// Conflict re-reads before giving up. Two writers can interleave at most a
/// handful of times on one key within a single request's lifetime.
const MAX_CONFLICT_RETRIES: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Before checkin_start; the gate is not open yet.
    TooEarly,
    /// After absent_cutoff; no new check-ins for the day.
    Closed,
    /// Explicit TIME OUT scan with no open check-in to close.
    NoActiveCheckin,
    /// Explicit TIME IN scan against an already-open check-in.
    AlreadyCheckedIn,
    /// Checkout timestamp earlier than the recorded check-in.
    OutOfOrder,
    /// Same student/subject re-scanned inside the cooldown window.
    Cooldown,
}

impl RejectReason {
    pub fn message(&self) -> &'static str {
        match self {
            RejectReason::TooEarly => "Check-in has not opened yet for today",
            RejectReason::Closed => "Check-in period has ended for the day",
            RejectReason::NoActiveCheckin => {
                "Cannot check out without checking in first"
            }
            RejectReason::AlreadyCheckedIn => {
                "Already checked in; scan a TIME OUT code to check out"
            }
            RejectReason::OutOfOrder => "Checkout time precedes the recorded check-in",
            RejectReason::Cooldown => "Please wait before scanning again for this subject",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// New record created with this event's check-in.
    Created,
    /// A legacy subject-less record was adopted in place.
    Adopted,
    CheckedOut { early: bool },
    /// Check-in and checkout both already recorded; nothing mutated.
    AlreadyComplete,
    Rejected { reason: RejectReason },
}

impl Outcome {
    pub fn mutated_ledger(&self) -> bool {
        matches!(
            self,
            Outcome::Created | Outcome::Adopted | Outcome::CheckedOut { .. }
        )
    }
}

/// Structured receipt for the operator: the tagged outcome plus whatever the
/// scanner UI needs to display, never a bare error.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct Receipt {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub message: String,
    pub student_id: i64,
    pub student_name: String,
    pub roll: String,
    pub subject_id: i64,
    pub subject_name: String,
    pub section_name: Option<String>,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub status: Option<AttendanceStatus>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub time_in: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub time_out: Option<NaiveDateTime>,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("student not found for the presented identity")]
    IdentityNotFound,
    #[error("subject {0} not found or inactive")]
    SubjectNotFound(i64),
    #[error("ledger conflict on one key persisted across {0} re-reads")]
    ConflictLoop(u32),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

struct DisplayInfo {
    student: Student,
    subject_name: String,
    section_name: Option<String>,
}

/// Classifier entry point shared by the live and replay paths.
pub async fn submit(
    pool: &SqlitePool,
    policy: &AdmissionPolicy,
    gate: &NotificationGate,
    event: ScanEvent,
) -> Result<Receipt, SubmitError> {
    let student = identity::resolve(pool, &event.identity)
        .await?
        .ok_or(SubmitError::IdentityNotFound)?;
    let info = display_info(pool, student, event.subject_id).await?;

    let date = event.captured_at.date();
    let verdict = policy.classify(event.captured_at.time());

    for attempt in 0..MAX_CONFLICT_RETRIES {
        if attempt > 0 {
            debug!(
                student_id = info.student.id,
                subject_id = event.subject_id,
                attempt,
                "re-reading ledger key after write conflict"
            );
        }

        let existing = ledger::find(pool, info.student.id, event.subject_id, date).await?;
        let step = match existing {
            Some(record) if record.is_complete() => complete(&info, &event, record),
            Some(record) if record.is_open() => {
                checkout(pool, policy, &info, &event, record).await?
            }
            Some(record) => claim(pool, &info, &event, verdict, record).await?,
            None => match ledger::find_legacy(pool, info.student.id, date).await? {
                Some(legacy) => adopt(pool, &info, &event, verdict, legacy).await?,
                None => fresh_checkin(pool, &info, &event, verdict, date).await?,
            },
        };

        match step {
            Step::Done(receipt) => {
                if receipt.outcome.mutated_ledger() {
                    gate.dispatch(pool.clone(), receipt.clone());
                }
                return Ok(receipt);
            }
            Step::Conflict => continue,
        }
    }

    warn!(
        student_id = info.student.id,
        subject_id = event.subject_id,
        "giving up after repeated ledger conflicts"
    );
    Err(SubmitError::ConflictLoop(MAX_CONFLICT_RETRIES))
}

enum Step {
    Done(Receipt),
    Conflict,
}

fn complete(display: &DisplayInfo, event: &ScanEvent, record: AttendanceRecord) -> Step {
    // Both timestamps already recorded; hand them back so the operator sees
    // exactly what the ledger holds.
    let message = format!(
        "{} has already completed attendance for {} today",
        display.student.full_name, display.subject_name
    );
    Step::Done(receipt(
        Outcome::AlreadyComplete,
        message,
        display,
        event,
        record.attendance_date,
        Some(&record),
    ))
}

async fn checkout(
    pool: &SqlitePool,
    policy: &AdmissionPolicy,
    display: &DisplayInfo,
    event: &ScanEvent,
    record: AttendanceRecord,
) -> Result<Step, SubmitError> {
    if event.direction == Some(Direction::In) {
        let message = format!(
            "{} is already checked in for {}",
            display.student.full_name, display.subject_name
        );
        return Ok(Step::Done(receipt(
            Outcome::Rejected {
                reason: RejectReason::AlreadyCheckedIn,
            },
            message,
            display,
            event,
            record.attendance_date,
            Some(&record),
        )));
    }

    // time_in is set on every open record
    let time_in = record.time_in.expect("open record has time_in");
    if event.captured_at < time_in {
        return Ok(Step::Done(receipt(
            Outcome::Rejected {
                reason: RejectReason::OutOfOrder,
            },
            RejectReason::OutOfOrder.message().to_string(),
            display,
            event,
            record.attendance_date,
            Some(&record),
        )));
    }

    let early = policy.is_early_checkout(event.captured_at.time());
    let status = if early {
        AttendanceStatus::Out
    } else {
        record.status
    };
    let note = audit_note(event, if early { "Early checkout" } else { "Checkout" });

    let applied = ledger::set_checkout(
        pool,
        record.id,
        status,
        event.captured_at,
        event.operator_id,
        &note,
    )
    .await?;
    if !applied {
        return Ok(Step::Conflict);
    }

    let record = reread(pool, record.id).await?;
    let message = if early {
        format!(
            "{} checked out of {} early",
            display.student.full_name, display.subject_name
        )
    } else {
        format!(
            "{} checked out of {}",
            display.student.full_name, display.subject_name
        )
    };
    Ok(Step::Done(receipt(
        Outcome::CheckedOut { early },
        message,
        display,
        event,
        record.attendance_date,
        Some(&record),
    )))
}

/// Upgrade an absent placeholder (day-end job row, no time_in) into a real
/// check-in. Status only ever gains information on this path.
async fn claim(
    pool: &SqlitePool,
    display: &DisplayInfo,
    event: &ScanEvent,
    verdict: Verdict,
    record: AttendanceRecord,
) -> Result<Step, SubmitError> {
    let status = match gate_checkin(display, event, verdict, record.attendance_date) {
        Ok(status) => status,
        Err(step) => return Ok(step),
    };

    let note = audit_note(event, "Check-in on existing record");
    let applied = ledger::claim_placeholder(
        pool,
        record.id,
        status,
        event.captured_at,
        event.operator_id,
        &note,
    )
    .await?;
    if !applied {
        return Ok(Step::Conflict);
    }

    let record = reread(pool, record.id).await?;
    let message = checkin_message(display, status);
    Ok(Step::Done(receipt(
        Outcome::Created,
        message,
        display,
        event,
        record.attendance_date,
        Some(&record),
    )))
}

/// Rule 3: a pre-migration subject-less row for the same student and day is
/// adopted in place, checked before any fresh insert so the key never forks
/// into two rows.
async fn adopt(
    pool: &SqlitePool,
    display: &DisplayInfo,
    event: &ScanEvent,
    verdict: Verdict,
    legacy: AttendanceRecord,
) -> Result<Step, SubmitError> {
    let status = match gate_checkin(display, event, verdict, legacy.attendance_date) {
        Ok(status) => status,
        Err(step) => return Ok(step),
    };

    let note = audit_note(event, "Adopted legacy record");
    let applied = ledger::adopt_legacy(
        pool,
        legacy.id,
        event.subject_id,
        status,
        event.captured_at,
        event.operator_id,
        &note,
    )
    .await?;
    if !applied {
        return Ok(Step::Conflict);
    }

    let record = reread(pool, legacy.id).await?;
    let message = checkin_message(display, status);
    Ok(Step::Done(receipt(
        Outcome::Adopted,
        message,
        display,
        event,
        record.attendance_date,
        Some(&record),
    )))
}

async fn fresh_checkin(
    pool: &SqlitePool,
    display: &DisplayInfo,
    event: &ScanEvent,
    verdict: Verdict,
    date: NaiveDate,
) -> Result<Step, SubmitError> {
    let status = match gate_checkin(display, event, verdict, date) {
        Ok(status) => status,
        Err(step) => return Ok(step),
    };

    let remarks = audit_note(event, "Check-in");
    let inserted = ledger::insert_checkin(
        pool,
        display.student.id,
        event.subject_id,
        date,
        event.captured_at,
        status,
        event.operator_id,
        event.source(),
        remarks.trim_start_matches(" | "),
    )
    .await?;

    match inserted {
        InsertResult::Inserted(record) => {
            let message = checkin_message(display, status);
            Ok(Step::Done(receipt(
                Outcome::Created,
                message,
                display,
                event,
                record.attendance_date,
                Some(&record),
            )))
        }
        InsertResult::Conflict => Ok(Step::Conflict),
    }
}

/// Shared check-in gating: explicit TIME OUT scans need an open record, and
/// new check-ins are only admitted inside the window.
fn gate_checkin(
    display: &DisplayInfo,
    event: &ScanEvent,
    verdict: Verdict,
    date: NaiveDate,
) -> Result<AttendanceStatus, Step> {
    if event.direction == Some(Direction::Out) {
        return Err(Step::Done(receipt(
            Outcome::Rejected {
                reason: RejectReason::NoActiveCheckin,
            },
            RejectReason::NoActiveCheckin.message().to_string(),
            display,
            event,
            date,
            None,
        )));
    }

    match verdict {
        Verdict::Present => Ok(AttendanceStatus::Present),
        Verdict::Late => Ok(AttendanceStatus::Late),
        Verdict::TooEarly => Err(Step::Done(receipt(
            Outcome::Rejected {
                reason: RejectReason::TooEarly,
            },
            RejectReason::TooEarly.message().to_string(),
            display,
            event,
            date,
            None,
        ))),
        Verdict::Closed => Err(Step::Done(receipt(
            Outcome::Rejected {
                reason: RejectReason::Closed,
            },
            RejectReason::Closed.message().to_string(),
            display,
            event,
            date,
            None,
        ))),
    }
}

fn checkin_message(display: &DisplayInfo, status: AttendanceStatus) -> String {
    match status {
        AttendanceStatus::Late => format!(
            "{} checked in late for {}",
            display.student.full_name, display.subject_name
        ),
        _ => format!(
            "{} checked in for {}",
            display.student.full_name, display.subject_name
        ),
    }
}

fn audit_note(event: &ScanEvent, action: &str) -> String {
    let mut note = match event.capture_mode {
        CaptureMode::Online => format!(" | {action}"),
        CaptureMode::Offline => format!(" | Offline sync: {action}"),
    };
    if let Some(location) = &event.location {
        note.push_str(": ");
        note.push_str(location);
    }
    if let Some(notes) = &event.notes {
        note.push_str(" - ");
        note.push_str(notes);
    }
    note
}

fn receipt(
    outcome: Outcome,
    message: String,
    display: &DisplayInfo,
    event: &ScanEvent,
    date: NaiveDate,
    record: Option<&AttendanceRecord>,
) -> Receipt {
    Receipt {
        outcome,
        message,
        student_id: display.student.id,
        student_name: display.student.full_name.clone(),
        roll: display.student.roll.clone(),
        subject_id: event.subject_id,
        subject_name: display.subject_name.clone(),
        section_name: display.section_name.clone(),
        date,
        status: record.map(|r| r.status),
        time_in: record.and_then(|r| r.time_in),
        time_out: record.and_then(|r| r.time_out),
    }
}

/// Receipt for an event an endpoint refused before classification (the live
/// scan cooldown). Carries the same display fields as a classifier receipt so
/// callers see one response shape.
pub async fn rejection_receipt(
    pool: &SqlitePool,
    student: Student,
    subject_id: i64,
    date: NaiveDate,
    reason: RejectReason,
) -> Result<Receipt, SubmitError> {
    let display = display_info(pool, student, subject_id).await?;
    Ok(Receipt {
        outcome: Outcome::Rejected { reason },
        message: reason.message().to_string(),
        student_id: display.student.id,
        student_name: display.student.full_name,
        roll: display.student.roll,
        subject_id,
        subject_name: display.subject_name,
        section_name: display.section_name,
        date,
        status: None,
        time_in: None,
        time_out: None,
    })
}

async fn reread(pool: &SqlitePool, id: i64) -> Result<AttendanceRecord, SubmitError> {
    ledger::find_by_id(pool, id)
        .await?
        .ok_or(SubmitError::Storage(sqlx::Error::RowNotFound))
}

async fn display_info(
    pool: &SqlitePool,
    student: Student,
    subject_id: i64,
) -> Result<DisplayInfo, SubmitError> {
    let subject_name = sqlx::query_scalar::<_, String>(
        "SELECT name FROM subjects WHERE id = ? AND active = 1",
    )
    .bind(subject_id)
    .fetch_optional(pool)
    .await?
    .ok_or(SubmitError::SubjectNotFound(subject_id))?;

    let section_name = match student.section_id {
        Some(section_id) => {
            sqlx::query_scalar::<_, String>("SELECT name FROM sections WHERE id = ?")
                .bind(section_id)
                .fetch_optional(pool)
                .await?
        }
        None => None,
    };

    Ok(DisplayInfo {
        student,
        subject_name,
        section_name,
    })
}
