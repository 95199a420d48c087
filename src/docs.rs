use crate::absence::SweepReport;
use crate::api::attendance::{ManualRequest, RollRequest, ScanRequest};
use crate::api::sync::{DayEndRequest, SyncEntry, SyncRequest};
use crate::classifier::{Outcome, Receipt, RejectReason};
use crate::model::attendance::{AttendanceStatus, RecordSource};
use crate::model::scan::{CaptureMode, Direction, Identity, ScanEvent};
use crate::policy::Verdict;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "School Attendance API",
        version = "1.0.0",
        description = r#"
## School Attendance Ledger

Records scan events (QR code, roll number, manual pick) into a per-student,
per-subject, per-day ledger, classifies them by the admission time policy and
notifies guardians with daily dedup.

### Submission paths
- Live: `/attendance/scan`, `/attendance/roll`, `/attendance/manual`
- Offline replay: `/attendance/sync` (events keep their original capture time)
- Day-end sweep: `/attendance/day-end`

Every call returns a structured receipt with a tagged outcome
(`created`, `adopted`, `checked_out`, `already_complete`, `rejected`).
"#
    ),
    paths(
        crate::api::attendance::scan,
        crate::api::attendance::roll,
        crate::api::attendance::manual,
        crate::api::attendance::find,
        crate::api::sync::sync_batch,
        crate::api::sync::day_end,
    ),
    components(schemas(
        ScanRequest,
        RollRequest,
        ManualRequest,
        SyncRequest,
        SyncEntry,
        DayEndRequest,
        Receipt,
        Outcome,
        RejectReason,
        Verdict,
        AttendanceStatus,
        RecordSource,
        ScanEvent,
        Identity,
        Direction,
        CaptureMode,
        SweepReport,
    )),
    tags(
        (name = "Attendance", description = "Live check-in and checkout"),
        (name = "Sync", description = "Offline replay and day-end jobs")
    )
)]
pub struct ApiDoc;
