//! Sequential replay of buffered captures against the server.
//!
//! One in-flight sync at a time per device, strictly in capture order. Each
//! entry goes through the same classifier entry point as a live event, with
//! its original captured_at as "now". Replay is live capture, only delayed.

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};

use crate::classifier::{self, Receipt, SubmitError};
use crate::model::scan::ScanEvent;
use crate::notify::NotificationGate;
use crate::offline::queue::{OfflineQueue, QueueError};
use crate::policy::AdmissionPolicy;

#[derive(Debug, Error)]
pub enum ReplayError {
    /// The server will never accept this entry (unknown student/subject).
    #[error("permanent replay failure: {0}")]
    Permanent(String),
    /// Connectivity or storage hiccup; the entry stays pending for retry.
    #[error("transient replay failure: {0}")]
    Transient(String),
}

/// Seam between the reconciler and the server-side classifier, so tests can
/// inject connectivity failures.
pub trait Submit {
    fn submit(
        &self,
        event: ScanEvent,
    ) -> impl std::future::Future<Output = Result<Receipt, ReplayError>> + Send;
}

/// Production submitter: calls the classifier directly.
#[derive(Clone)]
pub struct DirectSubmit {
    pub pool: SqlitePool,
    pub policy: AdmissionPolicy,
    pub gate: NotificationGate,
}

impl Submit for DirectSubmit {
    async fn submit(&self, event: ScanEvent) -> Result<Receipt, ReplayError> {
        classifier::submit(&self.pool, &self.policy, &self.gate, event)
            .await
            .map_err(|e| match e {
                SubmitError::IdentityNotFound | SubmitError::SubjectNotFound(_) => {
                    ReplayError::Permanent(e.to_string())
                }
                SubmitError::ConflictLoop(_) | SubmitError::Storage(_) => {
                    ReplayError::Transient(e.to_string())
                }
            })
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Entries that reached a terminal outcome this pass.
    pub synced: u32,
    /// Entries the server permanently refused, or past the attempt bound.
    pub abandoned: u32,
    /// True when a transient failure stopped the batch early.
    pub deferred: bool,
}

pub struct Reconciler<S: Submit> {
    queue: OfflineQueue,
    submitter: S,
    max_attempts: i64,
}

impl<S: Submit> Reconciler<S> {
    pub fn new(queue: OfflineQueue, submitter: S, max_attempts: i64) -> Self {
        Self {
            queue,
            submitter,
            max_attempts,
        }
    }

    /// Replay everything pending, in capture order, until done or until the
    /// first transient failure. Safe to call again whenever connectivity
    /// returns: synced entries are never reprocessed.
    pub async fn run_once(&self) -> Result<ReplayReport, QueueError> {
        let mut report = ReplayReport::default();

        for entry in self.queue.pending().await? {
            if entry.attempt_count >= self.max_attempts {
                warn!(
                    seq = entry.seq,
                    attempts = entry.attempt_count,
                    "abandoning queue entry past attempt bound"
                );
                self.queue.mark_synced(entry.seq).await?;
                report.abandoned += 1;
                continue;
            }

            match self.submitter.submit(entry.event.clone()).await {
                Ok(receipt) => {
                    // Any classifier outcome, including Rejected, is terminal.
                    info!(
                        seq = entry.seq,
                        student_id = receipt.student_id,
                        outcome = ?receipt.outcome,
                        "replayed offline capture"
                    );
                    self.queue.mark_synced(entry.seq).await?;
                    report.synced += 1;
                }
                Err(ReplayError::Permanent(reason)) => {
                    warn!(seq = entry.seq, %reason, "server permanently refused entry");
                    self.queue.mark_synced(entry.seq).await?;
                    report.abandoned += 1;
                }
                Err(ReplayError::Transient(reason)) => {
                    // Stop the batch so later entries cannot overtake this one.
                    warn!(seq = entry.seq, %reason, "transient failure, deferring batch");
                    self.queue.bump_attempt(entry.seq).await?;
                    report.deferred = true;
                    break;
                }
            }
        }

        Ok(report)
    }
}
