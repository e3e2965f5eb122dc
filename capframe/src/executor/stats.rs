//! Scheduler statistics.
//!
//! Lock-free counters updated on the admission and completion paths, read
//! through [`SchedulerStats::snapshot`].

use super::job::JobError;
use super::queue::AdmissionError;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// A point-in-time copy of the scheduler counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Submissions seen, accepted or not.
    pub submitted: u64,
    /// Jobs that bypassed the queue.
    pub dispatched_immediately: u64,
    /// Jobs that entered the queue.
    pub queued: u64,
    /// Rejected because the queue was full.
    pub rejected_full: u64,
    /// Rejected because the caller hit its queued-job cap.
    pub rejected_caller_quota: u64,
    /// Rejected by the rate limiter.
    pub rejected_rate_limited: u64,
    /// Rejected during shutdown.
    pub rejected_shutting_down: u64,
    /// Jobs that produced an output.
    pub succeeded: u64,
    /// Jobs that failed for any reason other than a timeout.
    pub failed: u64,
    /// Jobs that hit the acquisition timeout or their deadline.
    pub timed_out: u64,
    /// Queued jobs failed because the scheduler shut down.
    pub abandoned: u64,
    /// Highest in-flight count observed.
    pub peak_in_flight: usize,
}

impl StatsSnapshot {
    /// Total rejected submissions.
    pub fn rejected(&self) -> u64 {
        self.rejected_full
            + self.rejected_caller_quota
            + self.rejected_rate_limited
            + self.rejected_shutting_down
    }

    /// Total accepted submissions.
    pub fn accepted(&self) -> u64 {
        self.dispatched_immediately + self.queued
    }

    /// Jobs that reached their result sink.
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed + self.timed_out + self.abandoned
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "submitted={} accepted={} (immediate={}, queued={}) rejected={} \
             succeeded={} failed={} timed_out={} abandoned={} peak_in_flight={}",
            self.submitted,
            self.accepted(),
            self.dispatched_immediately,
            self.queued,
            self.rejected(),
            self.succeeded,
            self.failed,
            self.timed_out,
            self.abandoned,
            self.peak_in_flight
        )
    }
}

/// Scheduler counters with atomic updates.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    submitted: AtomicU64,
    dispatched_immediately: AtomicU64,
    queued: AtomicU64,
    rejected_full: AtomicU64,
    rejected_caller_quota: AtomicU64,
    rejected_rate_limited: AtomicU64,
    rejected_shutting_down: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    abandoned: AtomicU64,
    peak_in_flight: AtomicUsize,
}

impl SchedulerStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submission attempt.
    pub fn submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fast-path dispatch.
    pub fn dispatched_immediately(&self) {
        self.dispatched_immediately.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a queued job.
    pub fn queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rejection.
    pub fn rejected(&self, reason: &AdmissionError) {
        let counter = match reason {
            AdmissionError::QueueFull { .. } => &self.rejected_full,
            AdmissionError::CallerQuota { .. } => &self.rejected_caller_quota,
            AdmissionError::RateLimited => &self.rejected_rate_limited,
            AdmissionError::ShuttingDown => &self.rejected_shutting_down,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a job result.
    pub fn finished(&self, error: Option<&JobError>) {
        let counter = match error {
            None => &self.succeeded,
            Some(e) if e.is_timeout() => &self.timed_out,
            Some(JobError::ShuttingDown) => &self.abandoned,
            Some(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record queued jobs failed at shutdown.
    pub fn abandoned(&self, count: usize) {
        self.abandoned.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Update the in-flight high-water mark.
    pub fn observe_in_flight(&self, current: usize) {
        self.peak_in_flight.fetch_max(current, Ordering::Relaxed);
    }

    /// Get a snapshot of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            dispatched_immediately: self.dispatched_immediately.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            rejected_full: self.rejected_full.load(Ordering::Relaxed),
            rejected_caller_quota: self.rejected_caller_quota.load(Ordering::Relaxed),
            rejected_rate_limited: self.rejected_rate_limited.load(Ordering::Relaxed),
            rejected_shutting_down: self.rejected_shutting_down.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            peak_in_flight: self.peak_in_flight.load(Ordering::Relaxed),
        }
    }
}
