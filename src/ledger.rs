//! Conditional writes against the attendance table.
//!
//! Every mutation here is a single statement guarded either by the unique
//! (student_id, subject_id, attendance_date) key or by a WHERE clause on the
//! column being claimed. `Conflict` means a concurrent writer got there first;
//! callers re-read the key and reclassify, they never treat it as an error.

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::SqlitePool;

use crate::model::attendance::{AttendanceRecord, AttendanceStatus, RecordSource};

#[derive(Debug)]
pub enum InsertResult {
    Inserted(AttendanceRecord),
    Conflict,
}

const RECORD_COLUMNS: &str = "id, student_id, subject_id, attendance_date, status, \
     time_in, time_out, recorder_id, source, remarks";

pub async fn find(
    pool: &SqlitePool,
    student_id: i64,
    subject_id: i64,
    date: NaiveDate,
) -> Result<Option<AttendanceRecord>, sqlx::Error> {
    sqlx::query_as::<_, AttendanceRecord>(&format!(
        "SELECT {RECORD_COLUMNS} FROM attendance \
         WHERE student_id = ? AND subject_id = ? AND attendance_date = ?"
    ))
    .bind(student_id)
    .bind(subject_id)
    .bind(date)
    .fetch_optional(pool)
    .await
}

/// A record predating subject-scoped keys: same student and date, no subject.
pub async fn find_legacy(
    pool: &SqlitePool,
    student_id: i64,
    date: NaiveDate,
) -> Result<Option<AttendanceRecord>, sqlx::Error> {
    sqlx::query_as::<_, AttendanceRecord>(&format!(
        "SELECT {RECORD_COLUMNS} FROM attendance \
         WHERE student_id = ? AND subject_id IS NULL AND attendance_date = ?"
    ))
    .bind(student_id)
    .bind(date)
    .fetch_optional(pool)
    .await
}

pub async fn find_by_id(
    pool: &SqlitePool,
    id: i64,
) -> Result<Option<AttendanceRecord>, sqlx::Error> {
    sqlx::query_as::<_, AttendanceRecord>(&format!(
        "SELECT {RECORD_COLUMNS} FROM attendance WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// First check-in for a key. The unique constraint decides the winner under
/// concurrency; losers get `Conflict` and must re-read.
#[allow(clippy::too_many_arguments)]
pub async fn insert_checkin(
    pool: &SqlitePool,
    student_id: i64,
    subject_id: i64,
    date: NaiveDate,
    time_in: NaiveDateTime,
    status: AttendanceStatus,
    recorder_id: i64,
    source: RecordSource,
    remarks: &str,
) -> Result<InsertResult, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO attendance \
         (student_id, subject_id, attendance_date, status, time_in, recorder_id, source, remarks) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(student_id)
    .bind(subject_id)
    .bind(date)
    .bind(status)
    .bind(time_in)
    .bind(recorder_id)
    .bind(source)
    .bind(remarks)
    .execute(pool)
    .await;

    match result {
        Ok(done) => {
            let id = done.last_insert_rowid();
            let record = find_by_id(pool, id)
                .await?
                .ok_or(sqlx::Error::RowNotFound)?;
            Ok(InsertResult::Inserted(record))
        }
        Err(e) => {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return Ok(InsertResult::Conflict);
                }
            }
            Err(e)
        }
    }
}

/// Day-end absence insert: same conditional contract as a live check-in, so a
/// late manual entry racing this job always yields exactly one row.
pub async fn insert_absent(
    pool: &SqlitePool,
    student_id: i64,
    subject_id: i64,
    date: NaiveDate,
    recorder_id: i64,
    remarks: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO attendance \
         (student_id, subject_id, attendance_date, status, recorder_id, source, remarks) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(student_id)
    .bind(subject_id)
    .bind(date)
    .bind(AttendanceStatus::Absent)
    .bind(recorder_id)
    .bind(RecordSource::AutoAbsent)
    .bind(remarks)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(true),
        Err(e) => {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.is_unique_violation() {
                    return Ok(false);
                }
            }
            Err(e)
        }
    }
}

/// Adopt a legacy (subject-less) row in place: attach the subject, upgrade the
/// status and stamp time_in if it was never set. Conditional on the row still
/// being subject-less.
pub async fn adopt_legacy(
    pool: &SqlitePool,
    record_id: i64,
    subject_id: i64,
    status: AttendanceStatus,
    time_in: NaiveDateTime,
    recorder_id: i64,
    audit_note: &str,
) -> Result<bool, sqlx::Error> {
    let done = sqlx::query(
        "UPDATE attendance \
         SET subject_id = ?, status = ?, time_in = COALESCE(time_in, ?), \
             recorder_id = ?, remarks = remarks || ? \
         WHERE id = ? AND subject_id IS NULL",
    )
    .bind(subject_id)
    .bind(status)
    .bind(time_in)
    .bind(recorder_id)
    .bind(audit_note)
    .bind(record_id)
    .execute(pool)
    .await?;

    Ok(done.rows_affected() > 0)
}

/// Turn an absent placeholder (no time_in, e.g. from the day-end job) into a
/// real check-in. Never touches a row that already has a check-in, so status
/// can only gain information here.
pub async fn claim_placeholder(
    pool: &SqlitePool,
    record_id: i64,
    status: AttendanceStatus,
    time_in: NaiveDateTime,
    recorder_id: i64,
    audit_note: &str,
) -> Result<bool, sqlx::Error> {
    let done = sqlx::query(
        "UPDATE attendance \
         SET status = ?, time_in = ?, recorder_id = ?, remarks = remarks || ? \
         WHERE id = ? AND time_in IS NULL",
    )
    .bind(status)
    .bind(time_in)
    .bind(recorder_id)
    .bind(audit_note)
    .bind(record_id)
    .execute(pool)
    .await?;

    Ok(done.rows_affected() > 0)
}

/// Record a checkout. Conditional on an open check-in; a second checkout or a
/// checkout-without-checkin never matches a row.
pub async fn set_checkout(
    pool: &SqlitePool,
    record_id: i64,
    status: AttendanceStatus,
    time_out: NaiveDateTime,
    recorder_id: i64,
    audit_note: &str,
) -> Result<bool, sqlx::Error> {
    let done = sqlx::query(
        "UPDATE attendance \
         SET status = ?, time_out = ?, recorder_id = ?, remarks = remarks || ? \
         WHERE id = ? AND time_in IS NOT NULL AND time_out IS NULL",
    )
    .bind(status)
    .bind(time_out)
    .bind(recorder_id)
    .bind(audit_note)
    .bind(record_id)
    .execute(pool)
    .await?;

    Ok(done.rows_affected() > 0)
}
