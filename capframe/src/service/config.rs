//! Service configuration types.

use crate::config::ConfigFile;
use crate::executor::{
    PoolConfig, QueueConfig, RateLimitConfig, SchedulerConfig, DEFAULT_SHUTDOWN_GRACE,
};
use std::time::Duration;

/// Configuration for the render service.
///
/// Combines the settings of every component the service wires together.
///
/// # Example
///
/// ```
/// use capframe::service::ServiceConfig;
/// use capframe::executor::PoolConfig;
/// use std::time::Duration;
///
/// let config = ServiceConfig::builder()
///     .pool(PoolConfig::with_size(2))
///     .shutdown_grace(Duration::from_secs(5))
///     .build();
///
/// assert_eq!(config.pool().size, 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pool: PoolConfig,
    queue: QueueConfig,
    rate_limit: RateLimitConfig,
    scheduler: SchedulerConfig,
    shutdown_grace: Option<Duration>,
}

impl ServiceConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Get the session pool configuration.
    pub fn pool(&self) -> &PoolConfig {
        &self.pool
    }

    /// Get the admission queue configuration.
    pub fn queue(&self) -> &QueueConfig {
        &self.queue
    }

    /// Get the rate limit configuration.
    pub fn rate_limit(&self) -> &RateLimitConfig {
        &self.rate_limit
    }

    /// Get the scheduler configuration.
    pub fn scheduler(&self) -> &SchedulerConfig {
        &self.scheduler
    }

    /// How long shutdown waits for in-flight jobs.
    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace.unwrap_or(DEFAULT_SHUTDOWN_GRACE)
    }
}

impl From<&ConfigFile> for ServiceConfig {
    fn from(file: &ConfigFile) -> Self {
        Self {
            pool: PoolConfig::from(file),
            queue: QueueConfig::from(file),
            rate_limit: RateLimitConfig::from(file),
            scheduler: SchedulerConfig::from(file),
            shutdown_grace: None,
        }
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug, Default)]
pub struct ServiceConfigBuilder {
    pool: Option<PoolConfig>,
    queue: Option<QueueConfig>,
    rate_limit: Option<RateLimitConfig>,
    scheduler: Option<SchedulerConfig>,
    shutdown_grace: Option<Duration>,
}

impl ServiceConfigBuilder {
    /// Set the session pool configuration.
    pub fn pool(mut self, config: PoolConfig) -> Self {
        self.pool = Some(config);
        self
    }

    /// Set the admission queue configuration.
    pub fn queue(mut self, config: QueueConfig) -> Self {
        self.queue = Some(config);
        self
    }

    /// Set the rate limit configuration.
    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    /// Set the scheduler configuration.
    pub fn scheduler(mut self, config: SchedulerConfig) -> Self {
        self.scheduler = Some(config);
        self
    }

    /// Set the shutdown grace period.
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = Some(grace);
        self
    }

    /// Build the configuration, using defaults for unset values.
    pub fn build(self) -> ServiceConfig {
        ServiceConfig {
            pool: self.pool.unwrap_or_default(),
            queue: self.queue.unwrap_or_default(),
            rate_limit: self.rate_limit.unwrap_or_default(),
            scheduler: self.scheduler.unwrap_or_default(),
            shutdown_grace: self.shutdown_grace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.pool().size, crate::executor::DEFAULT_POOL_SIZE);
        assert_eq!(config.queue().max_size, crate::executor::DEFAULT_MAX_QUEUE_SIZE);
        assert_eq!(config.shutdown_grace(), DEFAULT_SHUTDOWN_GRACE);
    }

    #[test]
    fn test_from_config_file() {
        let mut file = ConfigFile::default();
        file.pool.size = 2;
        file.rate_limit.window_secs = 10;
        file.scheduler.batch_delay_ms = 0;

        let config = ServiceConfig::from(&file);
        assert_eq!(config.pool().size, 2);
        assert_eq!(config.rate_limit().window, Duration::from_secs(10));
        assert_eq!(config.scheduler().batch_delay, Duration::ZERO);
    }

    #[test]
    fn test_builder_overrides() {
        let config = ServiceConfig::builder()
            .queue(QueueConfig {
                max_size: 4,
                max_per_caller: 1,
            })
            .shutdown_grace(Duration::from_secs(1))
            .build();
        assert_eq!(config.queue().max_size, 4);
        assert_eq!(config.shutdown_grace(), Duration::from_secs(1));
        assert_eq!(config.scheduler().batch_size, crate::executor::DEFAULT_BATCH_SIZE);
    }
}
