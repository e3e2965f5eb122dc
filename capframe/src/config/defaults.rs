//! Default values for all configuration settings.
//!
//! Runtime defaults live next to the components that use them (see
//! [`crate::executor`]); this module maps them onto the file settings and
//! provides the `ConfigFile::default()` implementation.

use super::settings::*;
use crate::executor::{
    DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, DEFAULT_IDLE_SWEEP_INTERVAL,
    DEFAULT_IDLE_TIMEOUT, DEFAULT_JOB_TIMEOUT, DEFAULT_MAX_CONCURRENT, DEFAULT_MAX_PER_CALLER,
    DEFAULT_MAX_QUEUE_SIZE, DEFAULT_MAX_REQUESTS, DEFAULT_MAX_REUSE, DEFAULT_POOL_SIZE,
    DEFAULT_RATE_SWEEP_INTERVAL, DEFAULT_RATE_WINDOW,
};

/// Name of the directory under `$HOME` holding config and logs.
pub const CONFIG_DIR_NAME: &str = ".capframe";

/// Config file name inside [`CONFIG_DIR_NAME`].
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "capframe.log";

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            max_reuse: DEFAULT_MAX_REUSE,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT.as_millis() as u64,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT.as_secs(),
            sweep_interval_secs: DEFAULT_IDLE_SWEEP_INTERVAL.as_secs(),
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_QUEUE_SIZE,
            max_per_caller: DEFAULT_MAX_PER_CALLER,
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window_secs: DEFAULT_RATE_WINDOW.as_secs(),
            sweep_interval_secs: DEFAULT_RATE_SWEEP_INTERVAL.as_secs(),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay_ms: DEFAULT_BATCH_DELAY.as_millis() as u64,
            job_timeout_secs: DEFAULT_JOB_TIMEOUT.as_secs(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: super::file::config_directory().join("logs"),
            file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            pool: PoolSettings::default(),
            queue: QueueSettings::default(),
            rate_limit: RateLimitSettings::default(),
            scheduler: SchedulerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}
