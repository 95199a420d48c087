use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

/// Attendance status for one (student, subject, day) key.
///
/// `Out` marks an early checkout (left before the absent cutoff); a checkout
/// at or after the cutoff keeps the original check-in status.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
    Out,
}

/// How a record entered the ledger.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RecordSource {
    Scan,
    Manual,
    AutoAbsent,
}

/// One row of the attendance ledger.
///
/// `subject_id = NULL` marks a legacy row that predates subject-scoped keys;
/// the classifier adopts such rows in place rather than inserting a duplicate.
#[derive(Clone, Debug, FromRow, Serialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub student_id: i64,
    pub subject_id: Option<i64>,
    pub attendance_date: NaiveDate,
    pub status: AttendanceStatus,
    pub time_in: Option<NaiveDateTime>,
    pub time_out: Option<NaiveDateTime>,
    pub recorder_id: i64,
    pub source: RecordSource,
    pub remarks: String,
}

impl AttendanceRecord {
    pub fn is_legacy(&self) -> bool {
        self.subject_id.is_none()
    }

    /// Both timestamps recorded, nothing left to mutate.
    pub fn is_complete(&self) -> bool {
        self.time_in.is_some() && self.time_out.is_some()
    }

    /// Checked in, not yet checked out.
    pub fn is_open(&self) -> bool {
        self.time_in.is_some() && self.time_out.is_none()
    }
}
