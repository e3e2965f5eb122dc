//! Bounded FIFO admission queue with a per-caller cap.
//!
//! Jobs wait here when the scheduler has no free capacity. The queue holds
//! one flat FIFO sequence plus a per-caller counter of queued jobs. Jobs
//! that are already executing do not count against a caller's cap.

use super::config::at_least_one;
use super::job::{CallerId, Job};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// Default maximum number of queued jobs.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;

/// Default maximum number of jobs one caller may have queued.
pub const DEFAULT_MAX_PER_CALLER: usize = 3;

/// Capacity settings for an [`AdmissionQueue`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueConfig {
    /// Total queued jobs allowed.
    pub max_size: usize,
    /// Queued jobs allowed per caller.
    pub max_per_caller: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_QUEUE_SIZE,
            max_per_caller: DEFAULT_MAX_PER_CALLER,
        }
    }
}

impl From<&crate::config::ConfigFile> for QueueConfig {
    fn from(settings: &crate::config::ConfigFile) -> Self {
        Self {
            max_size: settings.queue.max_size,
            max_per_caller: settings.queue.max_per_caller,
        }
    }
}

/// Synchronous refusal of a submission.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AdmissionError {
    /// The queue holds `capacity` jobs already.
    #[error("queue is full ({capacity} jobs waiting)")]
    QueueFull { capacity: usize },

    /// The caller already has `limit` jobs queued.
    #[error("caller already has {limit} jobs queued")]
    CallerQuota { limit: usize },

    /// The caller exceeded its request quota.
    #[error("rate limit exceeded")]
    RateLimited,

    /// The scheduler no longer accepts work.
    #[error("scheduler is shutting down")]
    ShuttingDown,
}

impl AdmissionError {
    /// Short machine-friendly name used in statistics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::QueueFull { .. } => "queue_full",
            Self::CallerQuota { .. } => "caller_quota",
            Self::RateLimited => "rate_limited",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

/// FIFO of pending jobs.
#[derive(Debug)]
pub struct AdmissionQueue {
    config: QueueConfig,
    jobs: VecDeque<Job>,
    per_caller: HashMap<CallerId, usize>,
}

impl AdmissionQueue {
    /// Creates an empty queue. Zero limits are raised to 1.
    pub fn new(config: QueueConfig) -> Self {
        let config = QueueConfig {
            max_size: at_least_one("max_size", config.max_size),
            max_per_caller: at_least_one("max_per_caller", config.max_per_caller),
        };
        Self {
            jobs: VecDeque::with_capacity(config.max_size),
            per_caller: HashMap::new(),
            config,
        }
    }

    /// Returns the queue configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Appends a job.
    ///
    /// Returns the caller's 1-based position (its earliest queued job). On
    /// rejection the job is handed back with the reason so it can be
    /// completed rather than dropped.
    pub fn submit(&mut self, job: Job) -> Result<usize, (AdmissionError, Job)> {
        if self.jobs.len() >= self.config.max_size {
            return Err((
                AdmissionError::QueueFull {
                    capacity: self.config.max_size,
                },
                job,
            ));
        }
        if self.queued_for(job.caller()) >= self.config.max_per_caller {
            return Err((
                AdmissionError::CallerQuota {
                    limit: self.config.max_per_caller,
                },
                job,
            ));
        }

        let caller = job.caller().clone();
        *self.per_caller.entry(caller.clone()).or_insert(0) += 1;
        self.jobs.push_back(job);
        Ok(self.position(&caller))
    }

    /// Removes up to `max` jobs from the front.
    pub fn take_batch(&mut self, max: usize) -> Vec<Job> {
        let count = max.min(self.jobs.len());
        let batch: Vec<Job> = self.jobs.drain(..count).collect();
        for job in &batch {
            self.forget_one(job.caller());
        }
        batch
    }

    /// Removes every queued job.
    pub fn drain_all(&mut self) -> Vec<Job> {
        self.per_caller.clear();
        self.jobs.drain(..).collect()
    }

    /// 1-based index of the caller's earliest queued job, or 0.
    pub fn position(&self, caller: &CallerId) -> usize {
        if !self.per_caller.contains_key(caller) {
            return 0;
        }
        self.jobs
            .iter()
            .position(|job| job.caller() == caller)
            .map_or(0, |index| index + 1)
    }

    /// Jobs the caller has waiting.
    pub fn queued_for(&self, caller: &CallerId) -> usize {
        self.per_caller.get(caller).copied().unwrap_or(0)
    }

    /// Number of queued jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn forget_one(&mut self, caller: &CallerId) {
        if let Some(count) = self.per_caller.get_mut(caller) {
            *count -= 1;
            if *count == 0 {
                self.per_caller.remove(caller);
            }
        }
    }
}

impl Default for AdmissionQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}
