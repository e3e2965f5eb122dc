//! Periodic maintenance tasks.
//!
//! Two background loops keep long-lived state bounded:
//!
//! - [`PoolIdleReaper`] tears the session pool down after it sat unused for
//!   the idle timeout, and warns loudly if it is still up after twice that.
//! - [`RateWindowSweeper`] compacts rate-limit windows and forgets callers
//!   with no recent requests.
//!
//! Both run until their [`CancellationToken`] fires.

use super::rate_limiter::RateLimiter;
use super::resource_pool::ResourcePool;
use super::traits::SessionBackend;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Multiple of the idle timeout after which reclamation is forced.
pub const FORCED_RECLAIM_FACTOR: u32 = 2;

// =============================================================================
// Pool Idle Reaper
// =============================================================================

/// What one reaper pass did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReapOutcome {
    /// Pool is not running.
    NotRunning,
    /// Pool was used recently.
    Active,
    /// Idle long enough, but sessions were leased; left alone.
    Busy,
    /// Pool torn down after the idle timeout.
    Reclaimed,
    /// Pool torn down by the forced safety net.
    ForcedReclaim,
}

/// Shuts the pool down once it has been idle long enough.
pub struct PoolIdleReaper<B: SessionBackend> {
    pool: Arc<ResourcePool<B>>,
    idle_timeout: Duration,
    interval: Duration,
    /// Set once the forced threshold was reported for the current idle
    /// episode.
    forced_warned: AtomicBool,
}

impl<B: SessionBackend> PoolIdleReaper<B> {
    /// Creates a reaper using the pool's configured timings.
    pub fn new(pool: Arc<ResourcePool<B>>) -> Self {
        let config = pool.config();
        let idle_timeout = config.idle_timeout;
        let interval = config.sweep_interval;
        Self {
            pool,
            idle_timeout,
            interval,
            forced_warned: AtomicBool::new(false),
        }
    }

    /// Runs the reaper until cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            self.sweep_once().await;
        }
        debug!("Pool idle reaper stopped");
    }

    /// Checks the pool once and tears it down if it has been idle too long.
    pub async fn sweep_once(&self) -> ReapOutcome {
        let Some(idle) = self.pool.idle_for() else {
            self.forced_warned.store(false, Ordering::Relaxed);
            return ReapOutcome::NotRunning;
        };

        let forced = self.idle_timeout * FORCED_RECLAIM_FACTOR;
        if idle >= forced {
            if !self.forced_warned.swap(true, Ordering::Relaxed) {
                warn!(
                    idle_secs = idle.as_secs(),
                    threshold_secs = forced.as_secs(),
                    "Render pool idle past forced reclamation threshold"
                );
            } else {
                debug!(idle_secs = idle.as_secs(), "Render pool still past forced threshold");
            }
            if self.pool.shutdown_if_idle().await {
                self.forced_warned.store(false, Ordering::Relaxed);
                return ReapOutcome::ForcedReclaim;
            }
            return ReapOutcome::Busy;
        }
        self.forced_warned.store(false, Ordering::Relaxed);

        if idle >= self.idle_timeout {
            if self.pool.shutdown_if_idle().await {
                info!(idle_secs = idle.as_secs(), "Closing idle render pool");
                return ReapOutcome::Reclaimed;
            }
            return ReapOutcome::Busy;
        }

        ReapOutcome::Active
    }
}

// =============================================================================
// Rate Window Sweeper
// =============================================================================

/// Compacts rate-limit windows on a fixed interval.
pub struct RateWindowSweeper {
    limiter: Arc<RateLimiter>,
    interval: Duration,
}

impl RateWindowSweeper {
    /// Creates a sweeper using the limiter's configured interval.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        let interval = limiter.config().sweep_interval;
        Self { limiter, interval }
    }

    /// Runs the sweeper until cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            let removed = self.limiter.sweep();
            if removed > 0 {
                debug!(
                    removed,
                    tracked = self.limiter.tracked_callers(),
                    "Swept rate-limit windows"
                );
            }
        }
        debug!("Rate window sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CallerId, PoolConfig, RateLimitConfig};
    use crate::simulate::SimulatedBackend;

    fn pool() -> Arc<ResourcePool<SimulatedBackend>> {
        Arc::new(ResourcePool::new(
            Arc::new(SimulatedBackend::new()),
            PoolConfig {
                size: 2,
                idle_timeout: Duration::from_secs(300),
                sweep_interval: Duration::from_secs(30),
                ..PoolConfig::default()
            },
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_leaves_active_pool() {
        let pool = pool();
        let reaper = PoolIdleReaper::new(Arc::clone(&pool));
        assert_eq!(reaper.sweep_once().await, ReapOutcome::NotRunning);

        pool.initialize().await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(reaper.sweep_once().await, ReapOutcome::Active);
        assert!(pool.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_reclaims_after_idle_timeout() {
        let pool = pool();
        let reaper = PoolIdleReaper::new(Arc::clone(&pool));
        pool.initialize().await.unwrap();

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(reaper.sweep_once().await, ReapOutcome::Reclaimed);
        assert!(!pool.is_running());
        assert_eq!(pool.backend().live_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_never_reclaims_leased_pool() {
        let pool = pool();
        let reaper = PoolIdleReaper::new(Arc::clone(&pool));

        let lease = pool.acquire().await.unwrap();
        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(reaper.sweep_once().await, ReapOutcome::Busy);

        tokio::time::advance(Duration::from_secs(300)).await;
        assert_eq!(reaper.sweep_once().await, ReapOutcome::Busy);
        assert!(pool.is_running());

        pool.release(lease).await;
        // Release counts as activity.
        assert_eq!(reaper.sweep_once().await, ReapOutcome::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_warning_once_per_idle_episode() {
        let pool = pool();
        let reaper = PoolIdleReaper::new(Arc::clone(&pool));

        let lease = pool.acquire().await.unwrap();
        tokio::time::advance(Duration::from_secs(601)).await;
        assert_eq!(reaper.sweep_once().await, ReapOutcome::Busy);
        assert!(reaper.forced_warned.load(Ordering::Relaxed));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(reaper.sweep_once().await, ReapOutcome::Busy);
        assert!(reaper.forced_warned.load(Ordering::Relaxed));

        // Activity ends the episode; the next one warns again.
        pool.release(lease).await;
        assert_eq!(reaper.sweep_once().await, ReapOutcome::Active);
        assert!(!reaper.forced_warned.load(Ordering::Relaxed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_forced_reclaim() {
        let pool = pool();
        let reaper = PoolIdleReaper::new(Arc::clone(&pool));
        pool.initialize().await.unwrap();

        tokio::time::advance(Duration::from_secs(601)).await;
        assert_eq!(reaper.sweep_once().await, ReapOutcome::ForcedReclaim);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_run_stops_on_cancel() {
        let pool = pool();
        pool.initialize().await.unwrap();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(PoolIdleReaper::new(Arc::clone(&pool)).run(shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(331)).await;
        assert!(!pool.is_running());

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_sweeper_forgets_callers() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
        limiter.record(&CallerId::from("alice"));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(RateWindowSweeper::new(Arc::clone(&limiter)).run(shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(91)).await;
        assert_eq!(limiter.tracked_callers(), 0);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
