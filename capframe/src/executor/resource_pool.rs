//! Fixed-size pool of reusable worker sessions.
//!
//! The pool owns one long-lived shared resource (started through
//! [`SessionBackend::launch`]) and exactly `size` sessions opened on it.
//! Jobs lease a session for the duration of one render, then hand it back.
//!
//! # Session Accounting
//!
//! While the pool is running every session is in exactly one place:
//!
//! ```text
//!   idle (Vec, LIFO) ──acquire──► in_use (HashSet)
//!        ▲                           │
//!        │                        release
//!        │                           ▼
//!        └──────────healthy──────────┤
//!        └───open new, close old── retiring (HashSet)
//! ```
//!
//! so that `idle + in_use + retiring == size`. All transitions happen under
//! a single mutex; backend calls (open/close/health) run outside it.
//!
//! # Retirement
//!
//! A session that has served `max_reuse` jobs or fails its health check is
//! replaced: a fresh session is opened first and only then is the old one
//! closed. If opening fails the old session goes back to the idle set as a
//! degraded fallback and the failure is reported through telemetry. A
//! degraded session is retried for retirement the next time it is leased.
//!
//! # Example
//!
//! ```ignore
//! let pool = ResourcePool::new(backend, PoolConfig::default());
//! let lease = pool.acquire().await?;
//! renderer.render(lease.session(), &payload, &cancel).await?;
//! pool.release(lease).await;
//! ```

use super::config::at_least_one;
use super::telemetry::{NullTelemetrySink, TelemetryEvent, TelemetrySink};
use super::traits::{BackendError, SessionBackend};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// =============================================================================
// Configuration Constants
// =============================================================================

/// Default number of sessions kept open.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Default number of jobs a session serves before it is retired.
pub const DEFAULT_MAX_REUSE: u32 = 100;

/// Default time a job waits for an idle session.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default idle period after which the shared resource is torn down.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Default interval of the idle reaper.
pub const DEFAULT_IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

// =============================================================================
// Configuration
// =============================================================================

/// Sizing and timing of a [`ResourcePool`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of sessions opened on initialization.
    pub size: usize,

    /// Jobs served before a session is retired.
    pub max_reuse: u32,

    /// Maximum wait for an idle session.
    pub acquire_timeout: Duration,

    /// Idle period before the shared resource is torn down.
    pub idle_timeout: Duration,

    /// How often the idle reaper checks the pool.
    pub sweep_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            max_reuse: DEFAULT_MAX_REUSE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sweep_interval: DEFAULT_IDLE_SWEEP_INTERVAL,
        }
    }
}

impl PoolConfig {
    /// Creates a configuration with the given size and defaults otherwise.
    pub fn with_size(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }
}

impl From<&crate::config::ConfigFile> for PoolConfig {
    fn from(settings: &crate::config::ConfigFile) -> Self {
        let pool = &settings.pool;
        Self {
            size: pool.size,
            max_reuse: pool.max_reuse,
            acquire_timeout: Duration::from_millis(pool.acquire_timeout_ms),
            idle_timeout: Duration::from_secs(pool.idle_timeout_secs),
            sweep_interval: Duration::from_secs(pool.sweep_interval_secs),
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Failures surfaced by [`ResourcePool::acquire`] and
/// [`ResourcePool::initialize`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// No session became idle in time. Retryable.
    #[error("no session became available within {0:?}")]
    AcquireTimeout(Duration),

    /// The shared resource or its sessions could not be constructed.
    #[error("failed to construct worker pool: {0}")]
    Construction(#[source] BackendError),

    /// The waiting caller was cancelled.
    #[error("acquisition cancelled")]
    Cancelled,

    /// The pool was closed for good and will not start again.
    #[error("render pool is closed")]
    Closed,
}

impl From<PoolError> for super::job::JobError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::AcquireTimeout(waited) => Self::AcquireTimeout(waited),
            PoolError::Construction(e) => Self::PoolUnavailable(e.to_string()),
            PoolError::Cancelled => Self::Cancelled,
            PoolError::Closed => Self::ShuttingDown,
        }
    }
}

// =============================================================================
// Sessions
// =============================================================================

/// Pool-local session identifier.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SessionId(u64);

impl SessionId {
    /// Returns the raw numeric value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Why a session was sent to retirement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetireReason {
    /// The session served `max_reuse` jobs.
    ReuseLimit,
    /// The backend health check failed.
    Unhealthy,
}

impl fmt::Display for RetireReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReuseLimit => write!(f, "reuse limit"),
            Self::Unhealthy => write!(f, "health check failed"),
        }
    }
}

/// Where a session currently sits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    InUse,
    Retiring,
}

/// One backend session plus its pool bookkeeping.
struct WorkerSession<S> {
    id: SessionId,
    session: S,
    use_count: u32,
    /// Pool generation the session was opened in.
    generation: u64,
}

/// Exclusive lease on a session.
///
/// Must be handed back through [`ResourcePool::release`]; the lease has no
/// `Drop` hook because returning a session may need async backend calls.
pub struct SessionLease<S> {
    worker: WorkerSession<S>,
}

impl<S> SessionLease<S> {
    /// Returns the leased session.
    pub fn session(&self) -> &S {
        &self.worker.session
    }

    /// Returns the session identifier.
    pub fn id(&self) -> SessionId {
        self.worker.id
    }

    /// Jobs served by this session, including the current one.
    pub fn use_count(&self) -> u32 {
        self.worker.use_count
    }
}

impl<S> fmt::Debug for SessionLease<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLease")
            .field("id", &self.worker.id)
            .field("use_count", &self.worker.use_count)
            .finish()
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Point-in-time view of the pool's accounting.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    /// Whether the shared resource is up.
    pub running: bool,
    /// Configured session count.
    pub size: usize,
    /// Sessions waiting to be leased.
    pub idle: usize,
    /// Sessions currently leased.
    pub in_use: usize,
    /// Sessions being replaced.
    pub retiring: usize,
    /// Highest use count among idle sessions.
    pub max_idle_use_count: u32,
}

impl PoolSnapshot {
    /// Checks `idle + in_use + retiring == size` while running.
    pub fn is_consistent(&self) -> bool {
        !self.running || self.idle + self.in_use + self.retiring == self.size
    }
}

// =============================================================================
// Resource Pool
// =============================================================================

struct PoolState<S> {
    running: bool,
    /// Set by [`ResourcePool::close`]; the pool never starts again.
    closed: bool,
    generation: u64,
    idle: Vec<WorkerSession<S>>,
    in_use: HashSet<SessionId>,
    retiring: HashSet<SessionId>,
    last_activity: Instant,
    next_id: u64,
}

impl<S> PoolState<S> {
    fn allocate_id(&mut self) -> SessionId {
        self.next_id += 1;
        SessionId(self.next_id)
    }

    /// True when a session belongs to the pool's current lifetime.
    fn owns(&self, worker: &WorkerSession<S>) -> bool {
        self.running && worker.generation == self.generation
    }
}

/// Outcome of one look at the pool state during acquisition.
enum AcquireStep<S> {
    Initialize,
    Take(WorkerSession<S>),
    Wait,
}

/// Bounded set of reusable sessions over one shared backend resource.
pub struct ResourcePool<B: SessionBackend> {
    backend: Arc<B>,
    config: PoolConfig,
    state: Mutex<PoolState<B::Session>>,
    /// Signalled whenever a session returns to the idle set.
    available: Notify,
    /// Serializes initialize and teardown.
    lifecycle: tokio::sync::Mutex<()>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl<B: SessionBackend> ResourcePool<B> {
    /// Creates a pool. Nothing is launched until first use.
    pub fn new(backend: Arc<B>, config: PoolConfig) -> Self {
        Self::with_telemetry(backend, config, Arc::new(NullTelemetrySink))
    }

    /// Creates a pool that reports to the given telemetry sink.
    ///
    /// A zero `size` or `max_reuse` is raised to 1.
    pub fn with_telemetry(
        backend: Arc<B>,
        config: PoolConfig,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let config = PoolConfig {
            size: at_least_one("size", config.size),
            max_reuse: config.max_reuse.max(1),
            ..config
        };
        Self {
            backend,
            config,
            state: Mutex::new(PoolState {
                running: false,
                closed: false,
                generation: 0,
                idle: Vec::new(),
                in_use: HashSet::new(),
                retiring: HashSet::new(),
                last_activity: Instant::now(),
                next_id: 0,
            }),
            available: Notify::new(),
            lifecycle: tokio::sync::Mutex::new(()),
            telemetry,
        }
    }

    /// Returns the pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Returns the backend the pool drives.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Returns true while the shared resource is up.
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Launches the shared resource and opens `size` sessions.
    ///
    /// Idempotent. Concurrent callers wait for the first one instead of
    /// launching twice. Fails with [`PoolError::Closed`] after
    /// [`close`](Self::close). If a session fails to open, the sessions opened so
    /// far are closed and the backend is shut down before the error is
    /// returned.
    pub async fn initialize(&self) -> Result<(), PoolError> {
        if self.is_running() {
            return Ok(());
        }

        let _guard = self.lifecycle.lock().await;
        {
            let state = self.state.lock();
            if state.closed {
                return Err(PoolError::Closed);
            }
            if state.running {
                return Ok(());
            }
        }

        info!(sessions = self.config.size, "Initializing render pool");
        self.backend.launch().await.map_err(PoolError::Construction)?;

        let mut sessions = Vec::with_capacity(self.config.size);
        for _ in 0..self.config.size {
            match self.backend.open_session().await {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    warn!(
                        opened = sessions.len(),
                        error = %e,
                        "Session construction failed, rolling back pool initialization"
                    );
                    for session in sessions {
                        if let Err(close_err) = self.backend.close_session(session).await {
                            debug!(error = %close_err, "Failed to close session during rollback");
                        }
                    }
                    if let Err(shutdown_err) = self.backend.shutdown().await {
                        debug!(error = %shutdown_err, "Failed to shut down backend during rollback");
                    }
                    return Err(PoolError::Construction(e));
                }
            }
        }

        {
            let mut state = self.state.lock();
            state.generation += 1;
            state.in_use.clear();
            state.retiring.clear();
            let generation = state.generation;
            let workers: Vec<_> = sessions
                .into_iter()
                .map(|session| WorkerSession {
                    id: state.allocate_id(),
                    session,
                    use_count: 0,
                    generation,
                })
                .collect();
            state.idle = workers;
            state.last_activity = Instant::now();
            state.running = true;
        }

        self.telemetry.emit(TelemetryEvent::PoolInitialized {
            size: self.config.size,
        });
        self.available.notify_waiters();
        Ok(())
    }

    /// Leases an idle session, initializing the pool if needed.
    ///
    /// Waits at most `acquire_timeout`. The most recently returned session
    /// is handed out first.
    pub async fn acquire(&self) -> Result<SessionLease<B::Session>, PoolError> {
        self.acquire_cancellable(&CancellationToken::new()).await
    }

    /// Like [`acquire`](Self::acquire), but gives up when `cancel` fires
    /// while waiting for an idle session.
    ///
    /// Initialization and retirement are never interrupted half-way.
    pub async fn acquire_cancellable(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SessionLease<B::Session>, PoolError> {
        let deadline = Instant::now() + self.config.acquire_timeout;

        loop {
            if cancel.is_cancelled() {
                return Err(PoolError::Cancelled);
            }

            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let step = {
                let mut state = self.state.lock();
                if !state.running {
                    AcquireStep::Initialize
                } else if let Some(worker) = state.idle.pop() {
                    state.in_use.insert(worker.id);
                    state.last_activity = Instant::now();
                    AcquireStep::Take(worker)
                } else {
                    AcquireStep::Wait
                }
            };

            match step {
                AcquireStep::Initialize => {
                    self.initialize().await?;
                }
                AcquireStep::Take(worker) => {
                    let mut worker = if worker.use_count >= self.config.max_reuse {
                        self.replace_leased(worker).await
                    } else {
                        worker
                    };
                    worker.use_count += 1;
                    return Ok(SessionLease { worker });
                }
                AcquireStep::Wait => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(PoolError::Cancelled),
                        waited = tokio::time::timeout_at(deadline, notified) => {
                            if waited.is_err() {
                                self.telemetry.emit(TelemetryEvent::PoolExhausted {
                                    waited: self.config.acquire_timeout,
                                });
                                return Err(PoolError::AcquireTimeout(self.config.acquire_timeout));
                            }
                        }
                    }
                }
            }
        }
    }

    /// Returns a leased session to the pool.
    ///
    /// Sessions at the reuse limit or failing the health check are retired.
    /// Never fails: retirement problems are reported and the pool degrades
    /// instead of shrinking.
    pub async fn release(&self, lease: SessionLease<B::Session>) {
        let worker = lease.worker;

        let reason = if worker.use_count >= self.config.max_reuse {
            Some(RetireReason::ReuseLimit)
        } else if !self.backend.health_check(&worker.session).await {
            Some(RetireReason::Unhealthy)
        } else {
            None
        };

        match reason {
            Some(reason) => self.retire(worker, reason).await,
            None => {
                let stale = {
                    let mut state = self.state.lock();
                    if state.owns(&worker) {
                        state.in_use.remove(&worker.id);
                        state.last_activity = Instant::now();
                        state.idle.push(worker);
                        None
                    } else {
                        Some(worker)
                    }
                };
                match stale {
                    Some(worker) => self.close_stale(worker).await,
                    None => self.available.notify_one(),
                }
            }
        }
    }

    /// Replaces a released session with a freshly opened one.
    async fn retire(&self, worker: WorkerSession<B::Session>, reason: RetireReason) {
        let owned = {
            let mut state = self.state.lock();
            let owned = state.owns(&worker);
            if owned {
                state.in_use.remove(&worker.id);
                state.retiring.insert(worker.id);
            }
            owned
        };
        if !owned {
            self.close_stale(worker).await;
            return;
        }

        debug!(
            session = %worker.id,
            use_count = worker.use_count,
            reason = %reason,
            "Retiring session"
        );

        match self.backend.open_session().await {
            Ok(session) => {
                let (fresh_id, orphan) = {
                    let mut state = self.state.lock();
                    let id = state.allocate_id();
                    let fresh = WorkerSession {
                        id,
                        session,
                        use_count: 0,
                        generation: worker.generation,
                    };
                    if state.owns(&fresh) {
                        state.retiring.remove(&worker.id);
                        state.last_activity = Instant::now();
                        state.idle.push(fresh);
                        (id, None)
                    } else {
                        (id, Some(fresh))
                    }
                };

                let old_id = worker.id;
                let use_count = worker.use_count;
                self.close_session(worker.session).await;
                if let Some(orphan) = orphan {
                    self.close_session(orphan.session).await;
                }

                self.telemetry.emit(TelemetryEvent::SessionRetired {
                    old: old_id,
                    new: fresh_id,
                    use_count,
                    reason,
                });
                self.available.notify_one();
            }
            Err(e) => {
                warn!(session = %worker.id, error = %e, "Failed to open replacement session");
                let session = worker.id;
                let use_count = worker.use_count;
                let stale = {
                    let mut state = self.state.lock();
                    if state.owns(&worker) {
                        state.retiring.remove(&worker.id);
                        state.idle.push(worker);
                        None
                    } else {
                        Some(worker)
                    }
                };
                if let Some(worker) = stale {
                    self.close_stale(worker).await;
                }

                self.telemetry.emit(TelemetryEvent::SessionRetirementFailed {
                    session,
                    use_count,
                    reason,
                });
                self.available.notify_one();
            }
        }
    }

    /// Retries retirement of a degraded session that was just leased.
    ///
    /// The session stays counted as in use throughout; on success the fresh
    /// session takes its place in the in-use set.
    async fn replace_leased(&self, worker: WorkerSession<B::Session>) -> WorkerSession<B::Session> {
        match self.backend.open_session().await {
            Ok(session) => {
                let fresh = {
                    let mut state = self.state.lock();
                    let id = state.allocate_id();
                    if state.owns(&worker) {
                        state.in_use.remove(&worker.id);
                        state.in_use.insert(id);
                    }
                    WorkerSession {
                        id,
                        session,
                        use_count: 0,
                        generation: worker.generation,
                    }
                };
                self.telemetry.emit(TelemetryEvent::SessionRetired {
                    old: worker.id,
                    new: fresh.id,
                    use_count: worker.use_count,
                    reason: RetireReason::ReuseLimit,
                });
                self.close_session(worker.session).await;
                fresh
            }
            Err(e) => {
                warn!(
                    session = %worker.id,
                    use_count = worker.use_count,
                    error = %e,
                    "Handing out degraded session"
                );
                self.telemetry.emit(TelemetryEvent::SessionRetirementFailed {
                    session: worker.id,
                    use_count: worker.use_count,
                    reason: RetireReason::ReuseLimit,
                });
                worker
            }
        }
    }

    /// Tears everything down if no session is leased or being replaced.
    ///
    /// Returns true if the pool was shut down.
    pub async fn shutdown_if_idle(&self) -> bool {
        let _guard = self.lifecycle.lock().await;

        let sessions = {
            let mut state = self.state.lock();
            if !state.running || !state.in_use.is_empty() || !state.retiring.is_empty() {
                return false;
            }
            state.running = false;
            std::mem::take(&mut state.idle)
        };

        self.teardown(sessions).await;
        true
    }

    /// Tears the pool down regardless of leased sessions.
    ///
    /// Leases still outstanding belong to the finished lifetime; their
    /// sessions are closed when released.
    pub async fn shutdown(&self) {
        let _guard = self.lifecycle.lock().await;

        let sessions = {
            let mut state = self.state.lock();
            if !state.running {
                return;
            }
            state.running = false;
            if !state.in_use.is_empty() {
                warn!(
                    in_use = state.in_use.len(),
                    "Shutting down render pool with sessions still leased"
                );
            }
            state.in_use.clear();
            state.retiring.clear();
            std::mem::take(&mut state.idle)
        };

        self.teardown(sessions).await;
    }

    /// Tears the pool down for good.
    ///
    /// Like [`shutdown`](Self::shutdown), but later acquisitions fail with
    /// [`PoolError::Closed`] instead of starting the backend again.
    pub async fn close(&self) {
        self.state.lock().closed = true;
        self.shutdown().await;
        self.available.notify_waiters();
    }

    /// Returns true once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    async fn teardown(&self, sessions: Vec<WorkerSession<B::Session>>) {
        for worker in sessions {
            self.close_session(worker.session).await;
        }
        if let Err(e) = self.backend.shutdown().await {
            warn!(error = %e, "Backend shutdown failed");
        }
        self.telemetry.emit(TelemetryEvent::PoolShutdown);
        self.available.notify_waiters();
    }

    async fn close_session(&self, session: B::Session) {
        if let Err(e) = self.backend.close_session(session).await {
            debug!(error = %e, "Failed to close session");
        }
    }

    async fn close_stale(&self, worker: WorkerSession<B::Session>) {
        debug!(session = %worker.id, "Closing session from a finished pool lifetime");
        self.close_session(worker.session).await;
    }

    /// Time since the last acquire or release, if the pool is running.
    pub fn idle_for(&self) -> Option<Duration> {
        let state = self.state.lock();
        state.running.then(|| state.last_activity.elapsed())
    }

    /// Returns where the given session currently sits, if it is known.
    pub fn session_state(&self, id: SessionId) -> Option<SessionState> {
        let state = self.state.lock();
        if state.in_use.contains(&id) {
            Some(SessionState::InUse)
        } else if state.retiring.contains(&id) {
            Some(SessionState::Retiring)
        } else if state.idle.iter().any(|w| w.id == id) {
            Some(SessionState::Idle)
        } else {
            None
        }
    }

    /// Returns the current accounting.
    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.state.lock();
        PoolSnapshot {
            running: state.running,
            size: self.config.size,
            idle: state.idle.len(),
            in_use: state.in_use.len(),
            retiring: state.retiring.len(),
            max_idle_use_count: state.idle.iter().map(|w| w.use_count).max().unwrap_or(0),
        }
    }
}

impl<B: SessionBackend> fmt::Debug for ResourcePool<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("ResourcePool")
            .field("running", &snapshot.running)
            .field("idle", &snapshot.idle)
            .field("in_use", &snapshot.in_use)
            .field("retiring", &snapshot.retiring)
            .field("size", &snapshot.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::JobError;
    use crate::simulate::SimulatedBackend;

    fn pool_with(size: usize, max_reuse: u32) -> (Arc<SimulatedBackend>, ResourcePool<SimulatedBackend>) {
        let backend = Arc::new(SimulatedBackend::new());
        let config = PoolConfig {
            size,
            max_reuse,
            acquire_timeout: Duration::from_millis(200),
            ..PoolConfig::default()
        };
        (Arc::clone(&backend), ResourcePool::new(backend, config))
    }

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.size, 5);
        assert_eq!(config.max_reuse, 100);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_initialize_is_lazy_and_idempotent() {
        let (backend, pool) = pool_with(3, 10);
        assert!(!pool.is_running());
        assert_eq!(backend.launches(), 0);

        pool.initialize().await.unwrap();
        pool.initialize().await.unwrap();

        assert_eq!(backend.launches(), 1);
        assert_eq!(backend.sessions_opened(), 3);
        let snapshot = pool.snapshot();
        assert!(snapshot.running);
        assert_eq!(snapshot.idle, 3);
        assert!(snapshot.is_consistent());
    }

    #[tokio::test]
    async fn test_concurrent_initialize_launches_once() {
        let (backend, pool) = pool_with(2, 10);
        let pool = Arc::new(pool);

        let a = tokio::spawn({
            let pool = Arc::clone(&pool);
            async move { pool.initialize().await }
        });
        let b = tokio::spawn({
            let pool = Arc::clone(&pool);
            async move { pool.initialize().await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(backend.launches(), 1);
        assert_eq!(backend.sessions_opened(), 2);
    }

    #[tokio::test]
    async fn test_acquire_initializes_and_counts_use() {
        let (_backend, pool) = pool_with(2, 10);

        let lease = pool.acquire().await.unwrap();
        assert_eq!(lease.use_count(), 1);
        assert_eq!(pool.session_state(lease.id()), Some(SessionState::InUse));

        let snapshot = pool.snapshot();
        assert_eq!(snapshot.in_use, 1);
        assert_eq!(snapshot.idle, 1);
        assert!(snapshot.is_consistent());

        let id = lease.id();
        pool.release(lease).await;
        assert_eq!(pool.session_state(id), Some(SessionState::Idle));
        assert!(pool.snapshot().is_consistent());
    }

    #[tokio::test]
    async fn test_idle_sessions_reused_lifo() {
        let (_backend, pool) = pool_with(3, 10);

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        let b_id = b.id();

        pool.release(a).await;
        pool.release(b).await;

        let next = pool.acquire().await.unwrap();
        assert_eq!(next.id(), b_id);
        pool.release(next).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_times_out_when_exhausted() {
        let (_backend, pool) = pool_with(1, 10);

        let held = pool.acquire().await.unwrap();
        let result = pool.acquire().await;
        assert_eq!(
            result.unwrap_err(),
            PoolError::AcquireTimeout(Duration::from_millis(200))
        );

        pool.release(held).await;
        assert!(pool.snapshot().is_consistent());
    }

    #[tokio::test]
    async fn test_waiter_woken_on_release() {
        let (_backend, pool) = pool_with(1, 10);
        let pool = Arc::new(pool);

        let held = pool.acquire().await.unwrap();
        let waiter = tokio::spawn({
            let pool = Arc::clone(&pool);
            async move { pool.acquire().await.map(|lease| lease.use_count()) }
        });
        tokio::task::yield_now().await;

        pool.release(held).await;
        assert_eq!(waiter.await.unwrap().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_gives_up() {
        let (_backend, pool) = pool_with(1, 10);
        let held = pool.acquire().await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = pool.acquire_cancellable(&cancel).await;
        assert_eq!(result.unwrap_err(), PoolError::Cancelled);

        pool.release(held).await;
    }

    #[tokio::test]
    async fn test_session_retired_at_reuse_limit() {
        let (backend, pool) = pool_with(1, 2);

        let first = pool.acquire().await.unwrap();
        let original = first.id();
        pool.release(first).await;

        let second = pool.acquire().await.unwrap();
        assert_eq!(second.id(), original);
        assert_eq!(second.use_count(), 2);
        pool.release(second).await;

        // Retired on release: a new session holds the slot.
        let third = pool.acquire().await.unwrap();
        assert_ne!(third.id(), original);
        assert_eq!(third.use_count(), 1);
        pool.release(third).await;

        assert_eq!(backend.sessions_opened(), 2);
        assert_eq!(backend.sessions_closed(), 1);
        assert!(pool.snapshot().is_consistent());
    }

    #[tokio::test]
    async fn test_unhealthy_session_retired() {
        let (backend, pool) = pool_with(1, 100);

        let lease = pool.acquire().await.unwrap();
        let original = lease.id();
        backend.set_healthy(false);
        pool.release(lease).await;
        backend.set_healthy(true);

        let next = pool.acquire().await.unwrap();
        assert_ne!(next.id(), original);
        pool.release(next).await;
    }

    #[tokio::test]
    async fn test_failed_retirement_keeps_degraded_session() {
        let (backend, pool) = pool_with(1, 1);

        let lease = pool.acquire().await.unwrap();
        let original = lease.id();
        backend.fail_next_opens(2);
        pool.release(lease).await;

        let snapshot = pool.snapshot();
        assert_eq!(snapshot.idle, 1);
        assert_eq!(snapshot.max_idle_use_count, 1);
        assert!(snapshot.is_consistent());

        // Retry at acquire fails too: handed out degraded.
        let degraded = pool.acquire().await.unwrap();
        assert_eq!(degraded.id(), original);
        assert_eq!(degraded.use_count(), 2);
        pool.release(degraded).await;

        // Replacement succeeds now.
        let fresh = pool.acquire().await.unwrap();
        assert_ne!(fresh.id(), original);
        assert_eq!(fresh.use_count(), 1);
        pool.release(fresh).await;
        assert!(pool.snapshot().is_consistent());
    }

    #[tokio::test]
    async fn test_initialize_rolls_back_on_construction_failure() {
        let (backend, pool) = pool_with(3, 10);
        backend.fail_opens_after(2);

        let err = pool.initialize().await.unwrap_err();
        assert!(matches!(err, PoolError::Construction(_)));
        assert!(!pool.is_running());
        assert_eq!(backend.live_sessions(), 0);
        assert_eq!(backend.shutdowns(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_if_idle() {
        let (backend, pool) = pool_with(2, 10);

        let lease = pool.acquire().await.unwrap();
        assert!(!pool.shutdown_if_idle().await);
        assert!(pool.is_running());

        pool.release(lease).await;
        assert!(pool.shutdown_if_idle().await);
        assert!(!pool.is_running());
        assert_eq!(backend.live_sessions(), 0);
        assert_eq!(backend.shutdowns(), 1);
        assert_eq!(pool.idle_for(), None);

        // Re-initializes transparently on next use.
        let lease = pool.acquire().await.unwrap();
        pool.release(lease).await;
        assert_eq!(backend.launches(), 2);
    }

    #[test]
    fn test_zero_size_raised_to_one() {
        let (_backend, pool) = pool_with(0, 0);
        assert_eq!(pool.config().size, 1);
        assert_eq!(pool.config().max_reuse, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_wakes_waiters_and_stays_closed() {
        let (backend, pool) = pool_with(1, 10);
        let pool = Arc::new(pool);

        let held = pool.acquire().await.unwrap();
        let waiter = tokio::spawn({
            let pool = Arc::clone(&pool);
            async move {
                let started = Instant::now();
                (pool.acquire().await.map(|lease| lease.id()), started.elapsed())
            }
        });
        tokio::task::yield_now().await;

        pool.close().await;
        let (result, waited) = waiter.await.unwrap();
        assert_eq!(result.unwrap_err(), PoolError::Closed);
        assert!(waited < Duration::from_millis(200));

        // A late release and a stray wake-up never bring the backend back.
        pool.release(held).await;
        pool.available.notify_one();
        assert_eq!(pool.acquire().await.unwrap_err(), PoolError::Closed);
        assert!(pool.is_closed());
        assert_eq!(backend.launches(), 1);
        assert_eq!(backend.live_sessions(), 0);
        assert_eq!(JobError::from(PoolError::Closed), JobError::ShuttingDown);
    }

    #[tokio::test]
    async fn test_forced_shutdown_closes_late_release() {
        let (backend, pool) = pool_with(2, 10);

        let lease = pool.acquire().await.unwrap();
        pool.shutdown().await;
        assert_eq!(backend.live_sessions(), 1);

        pool.release(lease).await;
        assert_eq!(backend.live_sessions(), 0);
        assert_eq!(pool.snapshot().idle, 0);
    }
}
