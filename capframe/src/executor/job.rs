//! Job identity, errors and the write-once result sink.
//!
//! A [`Job`] is one unit of render + encode work submitted by a caller. It
//! owns the only sender half of its completion channel; whoever consumes the
//! job is responsible for completing it exactly once. The caller keeps the
//! matching [`JobHandle`] and awaits the outcome.

use super::handle::JobHandle;
use super::traits::{EncodeError, OutputHandle, RenderError};
use crate::payload::RenderPayload;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Source of process-unique job numbers.
static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

// =============================================================================
// Identifiers
// =============================================================================

/// Process-unique job identifier.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct JobId(u64);

impl JobId {
    /// Allocates the next job identifier.
    pub fn next() -> Self {
        Self(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw numeric value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Opaque identity of a submitter.
///
/// Cheap to clone; rate windows and queue quotas are keyed by it.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct CallerId(Arc<str>);

impl CallerId {
    /// Creates a caller identity from any string-like value.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CallerId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

// =============================================================================
// Job Errors
// =============================================================================

/// Per-job failure delivered to the job's own result sink.
///
/// None of these are fatal to the scheduler; each is isolated to one job.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    /// No worker session became idle within the acquisition timeout.
    #[error("no worker session became available within {0:?}")]
    AcquireTimeout(Duration),

    /// The job did not finish before its deadline.
    ///
    /// The underlying work may still be running; it has been signalled to
    /// cancel but the caller no longer waits for it.
    #[error("job did not finish within its {0:?} deadline")]
    DeadlineExceeded(Duration),

    /// The renderer rejected or failed the payload.
    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    /// The encoder failed to produce an output clip.
    #[error("encode failed: {0}")]
    Encode(#[from] EncodeError),

    /// The worker pool could not be brought up.
    #[error("worker pool unavailable: {0}")]
    PoolUnavailable(String),

    /// The job was cancelled before it took a worker session.
    #[error("job cancelled before a worker session was acquired")]
    Cancelled,

    /// A collaborator panicked while serving the job.
    #[error("job panicked: {0}")]
    Panicked(String),

    /// The scheduler stopped before the job could run.
    #[error("scheduler shut down before the job ran")]
    ShuttingDown,
}

impl JobError {
    /// Returns true for either flavour of timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::AcquireTimeout(_) | Self::DeadlineExceeded(_))
    }

    /// Short machine-friendly name used in telemetry.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AcquireTimeout(_) => "acquire_timeout",
            Self::DeadlineExceeded(_) => "deadline_exceeded",
            Self::Render(_) => "render",
            Self::Encode(_) => "encode",
            Self::PoolUnavailable(_) => "pool_unavailable",
            Self::Cancelled => "cancelled",
            Self::Panicked(_) => "panicked",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

/// Final result of one job.
pub type JobOutcome = Result<OutputHandle, JobError>;

// =============================================================================
// Result Sink
// =============================================================================

/// Write-once completion handle.
///
/// Consumed by [`ResultSink::complete`], so a job can be completed at most
/// once by construction.
#[derive(Debug)]
pub struct ResultSink {
    tx: oneshot::Sender<JobOutcome>,
}

impl ResultSink {
    /// Delivers the outcome.
    ///
    /// Returns false when the caller has already dropped its handle; the
    /// outcome is discarded in that case.
    pub fn complete(self, outcome: JobOutcome) -> bool {
        self.tx.send(outcome).is_ok()
    }
}

// =============================================================================
// Job
// =============================================================================

/// One unit of work travelling from admission to execution.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    caller: CallerId,
    payload: RenderPayload,
    submitted_at: Instant,
    sink: ResultSink,
}

impl Job {
    /// Creates a job and the handle its submitter waits on.
    pub fn new(caller: CallerId, payload: RenderPayload) -> (Self, JobHandle) {
        let (tx, rx) = oneshot::channel();
        let id = JobId::next();
        let job = Self {
            id,
            caller,
            payload,
            submitted_at: Instant::now(),
            sink: ResultSink { tx },
        };
        (job, JobHandle::new(id, rx))
    }

    /// Returns the job identifier.
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Returns the submitting caller.
    pub fn caller(&self) -> &CallerId {
        &self.caller
    }

    /// Returns the render payload.
    pub fn payload(&self) -> &RenderPayload {
        &self.payload
    }

    /// Returns when the job was submitted.
    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    /// Time spent since submission.
    pub fn age(&self) -> Duration {
        self.submitted_at.elapsed()
    }

    /// Completes the job, consuming it.
    pub fn complete(self, outcome: JobOutcome) -> bool {
        self.sink.complete(outcome)
    }

    /// Splits the job into the payload to run and the sink to complete.
    pub(crate) fn into_parts(self) -> (JobId, CallerId, RenderPayload, Instant, ResultSink) {
        (
            self.id,
            self.caller,
            self.payload,
            self.submitted_at,
            self.sink,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::RenderPayload;

    fn payload() -> RenderPayload {
        RenderPayload::new("hello", "dance").unwrap()
    }

    #[test]
    fn test_job_ids_are_unique_and_increasing() {
        let a = JobId::next();
        let b = JobId::next();
        assert!(b > a);
        assert!(format!("{}", a).starts_with("job-"));
    }

    #[test]
    fn test_caller_id_conversions() {
        let a = CallerId::from("alice");
        let b = CallerId::from(String::from("alice"));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "alice");
        assert_eq!(a.to_string(), "alice");
    }

    #[tokio::test]
    async fn test_complete_delivers_outcome_to_handle() {
        let (job, handle) = Job::new(CallerId::from("alice"), payload());
        assert_eq!(handle.job_id(), job.id());
        assert!(job.complete(Err(JobError::Cancelled)));
        assert_eq!(handle.wait().await, Err(JobError::Cancelled));
    }

    #[tokio::test]
    async fn test_complete_after_handle_dropped_reports_false() {
        let (job, handle) = Job::new(CallerId::from("alice"), payload());
        drop(handle);
        assert!(!job.complete(Err(JobError::ShuttingDown)));
    }

    #[test]
    fn test_error_classification() {
        assert!(JobError::AcquireTimeout(Duration::from_secs(5)).is_timeout());
        assert!(JobError::DeadlineExceeded(Duration::from_secs(15)).is_timeout());
        assert!(!JobError::Render(RenderError::new("bad")).is_timeout());
        assert_eq!(JobError::ShuttingDown.kind(), "shutting_down");
        assert_eq!(JobError::Encode(EncodeError::new("x")).kind(), "encode");
    }
}
