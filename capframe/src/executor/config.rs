//! Scheduler configuration.
//!
//! This module contains the [`SchedulerConfig`] struct and related constants
//! for the batch scheduler and job executor.

use std::time::Duration;
use tracing::warn;

// =============================================================================
// Configuration Constants
// =============================================================================

/// Default cap on jobs executing at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// Default number of jobs pulled from the queue per batch.
pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Default pause between batches while the queue is non-empty.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(100);

/// Default deadline for one job.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(15);

/// Default time shutdown waits for in-flight jobs.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(20);

// =============================================================================
// Scheduler Configuration
// =============================================================================

/// Configuration for the batch scheduler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Global in-flight cap, fast path and batches together.
    pub max_concurrent: usize,

    /// Maximum jobs per batch.
    pub batch_size: usize,

    /// Delay before the next batch when jobs remain queued.
    pub batch_delay: Duration,

    /// Per-job deadline, independent of the session acquisition timeout.
    pub job_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }
}

impl From<&crate::config::ConfigFile> for SchedulerConfig {
    fn from(settings: &crate::config::ConfigFile) -> Self {
        let scheduler = &settings.scheduler;
        Self {
            max_concurrent: scheduler.max_concurrent,
            batch_size: scheduler.batch_size,
            batch_delay: Duration::from_millis(scheduler.batch_delay_ms),
            job_timeout: Duration::from_secs(scheduler.job_timeout_secs),
        }
    }
}

/// Raises a zero capacity to 1.
///
/// A zero cap would stop work from ever being dispatched, so components
/// built in code get the same floor the config parser enforces.
pub(crate) fn at_least_one(setting: &'static str, value: usize) -> usize {
    if value == 0 {
        warn!(setting, "Capacity of 0 is not usable, raising it to 1");
        1
    } else {
        value
    }
}

impl SchedulerConfig {
    /// Returns the configuration with zero capacities raised to 1.
    pub(crate) fn normalized(self) -> Self {
        Self {
            max_concurrent: at_least_one("max_concurrent", self.max_concurrent),
            batch_size: at_least_one("batch_size", self.batch_size),
            ..self
        }
    }
}
