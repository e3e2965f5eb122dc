//! Sliding-window request quota per caller.
//!
//! Each caller owns a window of recent request instants. A request is
//! allowed while fewer than `max_requests` instants fall inside the trailing
//! `window`. Windows are pruned lazily on [`RateLimiter::record`] and
//! compacted by a periodic [`RateLimiter::sweep`], which also forgets
//! callers whose window emptied.
//!
//! Instants come from `tokio::time`, so tests can drive the window with a
//! paused clock.

use super::job::CallerId;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Default requests allowed per window.
pub const DEFAULT_MAX_REQUESTS: usize = 5;

/// Default window length.
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(60);

/// Default interval between window sweeps.
pub const DEFAULT_RATE_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Quota settings for a [`RateLimiter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed within one window.
    pub max_requests: usize,
    /// Length of the trailing window.
    pub window: Duration,
    /// How often stale windows are compacted.
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: DEFAULT_RATE_WINDOW,
            sweep_interval: DEFAULT_RATE_SWEEP_INTERVAL,
        }
    }
}

impl From<&crate::config::ConfigFile> for RateLimitConfig {
    fn from(settings: &crate::config::ConfigFile) -> Self {
        let rate = &settings.rate_limit;
        Self {
            max_requests: rate.max_requests,
            window: Duration::from_secs(rate.window_secs),
            sweep_interval: Duration::from_secs(rate.sweep_interval_secs),
        }
    }
}

/// Per-caller sliding-window limiter.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<CallerId, VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates an empty limiter.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    /// Returns the limiter configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Returns true if the caller may submit another request now.
    ///
    /// Read-only: the window is not modified.
    pub fn is_allowed(&self, caller: &CallerId) -> bool {
        self.recent_requests(caller) < self.config.max_requests
    }

    /// Records one accepted request for the caller.
    pub fn record(&self, caller: &CallerId) {
        let now = Instant::now();
        let mut window = self.windows.entry(caller.clone()).or_default();
        prune(&mut window, now, self.config.window);
        window.push_back(now);
    }

    /// Number of requests inside the caller's trailing window.
    pub fn recent_requests(&self, caller: &CallerId) -> usize {
        let now = Instant::now();
        self.windows
            .get(caller)
            .map(|window| {
                window
                    .iter()
                    .filter(|at| now.duration_since(**at) < self.config.window)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Time until the caller regains quota, or `None` if allowed now.
    pub fn retry_after(&self, caller: &CallerId) -> Option<Duration> {
        if self.is_allowed(caller) {
            return None;
        }
        let now = Instant::now();
        let window = self.windows.get(caller)?;
        let in_window: Vec<_> = window
            .iter()
            .filter(|at| now.duration_since(**at) < self.config.window)
            .collect();
        // The request that must age out is `max_requests` back from the newest.
        let index = in_window.len().checked_sub(self.config.max_requests)?;
        let expiring = in_window.get(index)?;
        Some((**expiring + self.config.window).saturating_duration_since(now))
    }

    /// Drops expired instants and forgets emptied callers.
    ///
    /// Returns the number of callers removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            prune(window, now, self.config.window);
            !window.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    /// Number of callers with a live window.
    pub fn tracked_callers(&self) -> usize {
        self.windows.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

fn prune(window: &mut VecDeque<Instant>, now: Instant, length: Duration) {
    while let Some(oldest) = window.front() {
        if now.duration_since(*oldest) >= length {
            window.pop_front();
        } else {
            break;
        }
    }
}
