//! Caller-side handles for submitted jobs.
//!
//! [`BatchScheduler::submit`](super::BatchScheduler::submit) answers
//! synchronously with a [`Submission`]: how the job was admitted plus a
//! [`JobHandle`] that resolves once the job has run.
//!
//! # Example
//!
//! ```ignore
//! let submission = scheduler.submit("alice", payload)?;
//! if let Admission::Queued { position, .. } = submission.admission {
//!     println!("queued at position {}", position);
//! }
//! let output = submission.handle.wait().await?;
//! ```

use super::job::{JobError, JobId, JobOutcome};
use std::fmt;
use tokio::sync::oneshot;

/// Awaitable completion of one accepted job.
pub struct JobHandle {
    job_id: JobId,
    rx: oneshot::Receiver<JobOutcome>,
}

impl JobHandle {
    pub(crate) fn new(job_id: JobId, rx: oneshot::Receiver<JobOutcome>) -> Self {
        Self { job_id, rx }
    }

    /// Returns the job's identifier.
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Waits for the job's outcome.
    ///
    /// A sink dropped without completion only happens when the runtime is
    /// torn down underneath the scheduler; it is reported as
    /// [`JobError::ShuttingDown`].
    pub async fn wait(self) -> JobOutcome {
        self.rx.await.unwrap_or(Err(JobError::ShuttingDown))
    }

    /// Returns the outcome if the job has already finished.
    pub fn try_outcome(&mut self) -> Option<JobOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(JobError::ShuttingDown)),
        }
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("job_id", &self.job_id)
            .finish()
    }
}

/// How an accepted job entered the system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Queue was empty and capacity was free; the job started immediately.
    Dispatched,

    /// The job waits in the admission queue.
    Queued {
        /// 1-based position of the caller's earliest queued job.
        position: usize,
        /// Jobs waiting in the queue, including this one.
        queued: usize,
        /// Jobs currently executing.
        in_flight: usize,
    },
}

impl Admission {
    /// Returns true if the job bypassed the queue.
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched)
    }
}

impl fmt::Display for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dispatched => write!(f, "processing now"),
            Self::Queued {
                position,
                queued,
                in_flight,
            } => write!(f, "queued, position {}/{}", position, queued + in_flight),
        }
    }
}

/// Synchronous answer to an accepted submission.
#[derive(Debug)]
pub struct Submission {
    /// Fast path or queue position.
    pub admission: Admission,
    /// Completion handle for the job.
    pub handle: JobHandle,
}

/// Caller-facing queue status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStatus {
    /// 1-based position of the caller's earliest queued job, 0 if none.
    pub position: usize,
    /// Jobs waiting in the queue.
    pub queued: usize,
    /// Jobs currently executing.
    pub in_flight: usize,
}
