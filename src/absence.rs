//! Day-end absence sweep.
//!
//! For every active enrolment with no ledger row for the date, insert an
//! absent placeholder through the same conditional-insert contract as a live
//! check-in. Whichever writer loses the unique key skips, so a manual entry
//! racing this sweep still yields exactly one row.

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use tracing::info;
use utoipa::ToSchema;

use crate::ledger;

/// System recorder id stamped on auto-absent rows.
const SYSTEM_RECORDER: i64 = 0;

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct SweepReport {
    pub marked: u32,
    pub skipped: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("sweep refused: cutoff {cutoff} not reached at {now}")]
    BeforeCutoff { now: NaiveTime, cutoff: NaiveTime },
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

#[derive(FromRow)]
struct Enrolment {
    student_id: i64,
    subject_id: i64,
}

/// Mark every no-show (student, subject) pair absent for `date`. Refuses to
/// run before the absent cutoff so a sweep can never pre-empt the check-in
/// window.
pub async fn mark_absent(
    pool: &SqlitePool,
    date: NaiveDate,
    now: NaiveTime,
    cutoff: NaiveTime,
) -> Result<SweepReport, SweepError> {
    if now <= cutoff {
        return Err(SweepError::BeforeCutoff { now, cutoff });
    }

    let missing = sqlx::query_as::<_, Enrolment>(
        "SELECT e.student_id, e.subject_id \
         FROM enrolments e \
         JOIN students st ON st.id = e.student_id AND st.active = 1 \
         LEFT JOIN attendance a \
           ON a.student_id = e.student_id \
          AND a.subject_id = e.subject_id \
          AND a.attendance_date = ? \
         WHERE a.id IS NULL \
         ORDER BY e.student_id, e.subject_id",
    )
    .bind(date)
    .fetch_all(pool)
    .await?;

    let mut report = SweepReport::default();
    let remarks = format!("Auto-marked absent - no check-in by {}", cutoff.format("%H:%M"));

    for enrolment in missing {
        let inserted = ledger::insert_absent(
            pool,
            enrolment.student_id,
            enrolment.subject_id,
            date,
            SYSTEM_RECORDER,
            &remarks,
        )
        .await?;

        if inserted {
            report.marked += 1;
        } else {
            // a check-in landed between the SELECT and our insert
            report.skipped += 1;
        }
    }

    info!(%date, marked = report.marked, skipped = report.skipped, "day-end absence sweep done");
    Ok(report)
}
