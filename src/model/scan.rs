use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::attendance::RecordSource;

/// How the operator identified the student.
///
/// All three entry points (QR scan, roll-number keypad, manual pick) reduce to
/// one of these and then flow through the same classifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Identity {
    StudentId(i64),
    QrToken(String),
    Roll(String),
}

/// Explicit scan direction from TIME IN / TIME OUT QR codes.
///
/// Absent, the classifier infers direction from ledger state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    Online,
    Offline,
}

/// A captured attendance event, not yet applied to the ledger.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ScanEvent {
    pub identity: Identity,
    pub subject_id: i64,
    pub operator_id: i64,
    #[schema(value_type = String, format = "date-time", example = "2026-08-24T07:10:00")]
    pub captured_at: NaiveDateTime,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub capture_mode: CaptureMode,
    pub direction: Option<Direction>,
}

impl ScanEvent {
    pub fn source(&self) -> RecordSource {
        match self.identity {
            Identity::StudentId(_) => RecordSource::Manual,
            _ => RecordSource::Scan,
        }
    }
}
