//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use std::path::PathBuf;

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    /// Worker session pool settings
    pub pool: PoolSettings,
    /// Admission queue settings
    pub queue: QueueSettings,
    /// Per-caller rate limit settings
    pub rate_limit: RateLimitSettings,
    /// Batch scheduler settings
    pub scheduler: SchedulerSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Worker session pool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// Sessions opened on the shared resource.
    pub size: usize,
    /// Jobs a session serves before it is replaced.
    pub max_reuse: u32,
    /// Maximum wait for an idle session, in milliseconds.
    pub acquire_timeout_ms: u64,
    /// Idle period before the shared resource is torn down, in seconds.
    pub idle_timeout_secs: u64,
    /// Interval of the idle reaper, in seconds.
    pub sweep_interval_secs: u64,
}

/// Admission queue configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    /// Total queued jobs allowed.
    pub max_size: usize,
    /// Queued jobs allowed per caller.
    pub max_per_caller: usize,
}

/// Rate limit configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSettings {
    /// Requests allowed per window.
    pub max_requests: usize,
    /// Window length in seconds.
    pub window_secs: u64,
    /// Interval between window sweeps, in seconds.
    pub sweep_interval_secs: u64,
}

/// Batch scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Jobs executing at once, fast path and batches together.
    pub max_concurrent: usize,
    /// Jobs pulled from the queue per batch.
    pub batch_size: usize,
    /// Pause between batches, in milliseconds.
    pub batch_delay_ms: u64,
    /// Per-job deadline, in seconds.
    pub job_timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Directory holding the log file
    pub directory: PathBuf,
    /// Log file name
    pub file: String,
}
