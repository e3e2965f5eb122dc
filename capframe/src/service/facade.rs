//! Render service facade.
//!
//! Wires pool, rate limiter, scheduler and the maintenance tasks together
//! and owns their lifecycle.

use super::config::ServiceConfig;
use super::error::ServiceError;
use crate::assets::AssetCatalog;
use crate::executor::{
    BatchScheduler, CallerId, Encoder, JobExecutor, PoolIdleReaper, PoolSnapshot, QueueStatus,
    RateLimiter, RateWindowSweeper, Renderer, ResourcePool, SessionBackend, ShutdownReport,
    StatsSnapshot, Submission, TelemetrySink, TracingTelemetrySink,
};
use crate::payload::RenderPayload;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Running render service.
///
/// Created with [`RenderService::start`], stopped with
/// [`RenderService::shutdown`]. Dropping a running service cancels its
/// maintenance tasks but does not wait for in-flight jobs.
pub struct RenderService<B: SessionBackend> {
    scheduler: BatchScheduler<B>,
    pool: Arc<ResourcePool<B>>,
    assets: AssetCatalog,
    shutdown_grace: Duration,
    maintenance: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<B: SessionBackend> RenderService<B> {
    /// Builds every component and spawns the maintenance tasks.
    ///
    /// Events are reported through [`TracingTelemetrySink`]. The session
    /// pool starts lazily on the first job; see [`warm_up`](Self::warm_up).
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(
        backend: Arc<B>,
        renderer: Arc<dyn Renderer<B::Session>>,
        encoder: Arc<dyn Encoder>,
        config: ServiceConfig,
    ) -> Self {
        Self::start_with_telemetry(
            backend,
            renderer,
            encoder,
            config,
            Arc::new(TracingTelemetrySink),
        )
    }

    /// Like [`start`](Self::start) with a custom telemetry sink.
    pub fn start_with_telemetry(
        backend: Arc<B>,
        renderer: Arc<dyn Renderer<B::Session>>,
        encoder: Arc<dyn Encoder>,
        config: ServiceConfig,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let pool = Arc::new(ResourcePool::with_telemetry(
            backend,
            config.pool().clone(),
            Arc::clone(&telemetry),
        ));
        let limiter = Arc::new(RateLimiter::new(config.rate_limit().clone()));
        let executor = JobExecutor::new(
            Arc::clone(&pool),
            renderer,
            encoder,
            config.scheduler().job_timeout,
        )
        .with_telemetry(Arc::clone(&telemetry));
        let scheduler = BatchScheduler::with_telemetry(
            config.scheduler().clone(),
            config.queue().clone(),
            Arc::clone(&limiter),
            executor,
            telemetry,
        );

        let maintenance = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(PoolIdleReaper::new(Arc::clone(&pool)).run(maintenance.clone())),
            tokio::spawn(RateWindowSweeper::new(limiter).run(maintenance.clone())),
        ];

        info!(
            pool_size = config.pool().size,
            max_concurrent = config.scheduler().max_concurrent,
            batch_size = config.scheduler().batch_size,
            max_queue = config.queue().max_size,
            "Render service started"
        );

        Self {
            scheduler,
            pool,
            assets: AssetCatalog::default(),
            shutdown_grace: config.shutdown_grace(),
            maintenance,
            tasks: Mutex::new(tasks),
        }
    }

    /// Sets the catalog used by [`submit_text`](Self::submit_text).
    pub fn with_assets(mut self, assets: AssetCatalog) -> Self {
        self.assets = assets;
        self
    }

    /// Starts the session pool ahead of the first job.
    pub async fn warm_up(&self) -> Result<(), ServiceError> {
        if !self.is_running() {
            return Err(ServiceError::NotRunning);
        }
        self.pool.initialize().await?;
        Ok(())
    }

    /// Submits a validated payload.
    pub fn submit(
        &self,
        caller: impl Into<CallerId>,
        payload: RenderPayload,
    ) -> Result<Submission, ServiceError> {
        Ok(self.scheduler.submit(caller, payload)?)
    }

    /// Validates raw caption text, resolves the asset from the catalog and
    /// submits the job.
    pub fn submit_text(
        &self,
        caller: impl Into<CallerId>,
        text: &str,
        asset_query: Option<&str>,
    ) -> Result<Submission, ServiceError> {
        let asset = self.assets.resolve(asset_query)?;
        let payload = RenderPayload::with_asset(text, asset)?;
        self.submit(caller, payload)
    }

    /// Queue position and totals for a caller.
    pub fn queue_status(&self, caller: &CallerId) -> QueueStatus {
        self.scheduler.queue_status(caller)
    }

    /// Scheduler counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.scheduler.stats()
    }

    /// Session pool counts.
    pub fn pool_snapshot(&self) -> PoolSnapshot {
        self.pool.snapshot()
    }

    pub fn assets(&self) -> &AssetCatalog {
        &self.assets
    }

    pub fn scheduler(&self) -> &BatchScheduler<B> {
        &self.scheduler
    }

    /// Whether the service still accepts work.
    pub fn is_running(&self) -> bool {
        !self.maintenance.is_cancelled()
    }

    /// Stops the service.
    ///
    /// Stops the maintenance tasks, fails queued jobs, waits up to the
    /// grace period for in-flight jobs and closes the session pool. Calling
    /// it again returns an empty report.
    pub async fn shutdown(&self) -> ShutdownReport {
        if !self.is_running() {
            return ShutdownReport::default();
        }
        self.maintenance.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Maintenance task ended abnormally");
            }
        }

        let report = self.scheduler.shutdown(self.shutdown_grace).await;
        if report.still_running > 0 {
            warn!(
                still_running = report.still_running,
                grace_secs = self.shutdown_grace.as_secs(),
                "Jobs still running after shutdown grace period"
            );
        }
        self.pool.close().await;

        info!(
            abandoned = report.abandoned,
            still_running = report.still_running,
            "Render service stopped"
        );
        report
    }
}

impl<B: SessionBackend> Drop for RenderService<B> {
    fn drop(&mut self) {
        self.maintenance.cancel();
    }
}

impl<B: SessionBackend> std::fmt::Debug for RenderService<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderService")
            .field("running", &self.is_running())
            .field("scheduler", &self.scheduler)
            .field("pool", &self.pool)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Admission, JobError, PoolConfig, SchedulerConfig};
    use crate::simulate::{SimulatedBackend, SimulatedEncoder, SimulatedRenderer};

    fn service(config: ServiceConfig) -> RenderService<SimulatedBackend> {
        RenderService::start(
            Arc::new(SimulatedBackend::new()),
            Arc::new(SimulatedRenderer::new().with_latency(Duration::from_millis(50))),
            Arc::new(SimulatedEncoder::new()),
            config,
        )
    }

    fn payload(text: &str) -> RenderPayload {
        RenderPayload::new(text, "wave").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_and_complete() {
        let service = service(ServiceConfig::default());
        let submission = service.submit("alice", payload("hello")).unwrap();
        assert_eq!(submission.admission, Admission::Dispatched);

        let output = submission.handle.wait().await.unwrap();
        assert_eq!(output.file_name, "wave.gif");
        assert_eq!(service.stats().succeeded, 1);
        assert!(service.pool_snapshot().running);

        service.shutdown().await;
        assert!(!service.pool_snapshot().running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_text_resolves_asset() {
        let service = service(ServiceConfig::default())
            .with_assets(AssetCatalog::from_names(["wave", "shrug"]));

        let submission = service.submit_text("alice", "hi\u{7}", Some("shr")).unwrap();
        let output = submission.handle.wait().await.unwrap();
        assert_eq!(output.file_name, "shrug.gif");

        let err = service.submit_text("alice", "   ", None).unwrap_err();
        assert!(matches!(err, ServiceError::Payload(_)));
        service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_text_without_assets() {
        let service = service(ServiceConfig::default());
        let err = service.submit_text("alice", "hi", Some("wave")).unwrap_err();
        assert!(matches!(err, ServiceError::Asset(_)));
        service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_fails_queued_jobs() {
        let config = ServiceConfig::builder()
            .scheduler(SchedulerConfig {
                max_concurrent: 1,
                ..SchedulerConfig::default()
            })
            .pool(PoolConfig::with_size(1))
            .build();
        let service = service(config);

        let running = service.submit("alice", payload("one")).unwrap();
        let queued = service.submit("bob", payload("two")).unwrap();
        assert!(!queued.admission.is_dispatched());

        let report = service.shutdown().await;
        assert_eq!(report.abandoned, 1);
        assert_eq!(report.still_running, 0);
        assert!(running.handle.wait().await.is_ok());
        assert_eq!(queued.handle.wait().await, Err(JobError::ShuttingDown));

        let err = service.submit("carol", payload("three")).unwrap_err();
        assert!(matches!(err, ServiceError::Admission(_)));
        assert!(!err.is_retryable());
        assert_eq!(service.shutdown().await, ShutdownReport::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_warm_up_starts_pool() {
        let service = service(ServiceConfig::builder().pool(PoolConfig::with_size(3)).build());
        service.warm_up().await.unwrap();

        let snapshot = service.pool_snapshot();
        assert!(snapshot.running);
        assert_eq!(snapshot.idle, 3);

        service.shutdown().await;
        assert!(matches!(service.warm_up().await, Err(ServiceError::NotRunning)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_waiting_for_session_fails_at_shutdown() {
        let backend = Arc::new(SimulatedBackend::new());
        let config = ServiceConfig::builder()
            .pool(PoolConfig {
                size: 1,
                acquire_timeout: Duration::from_secs(30),
                ..PoolConfig::default()
            })
            .scheduler(SchedulerConfig {
                max_concurrent: 2,
                job_timeout: Duration::from_secs(60),
                ..SchedulerConfig::default()
            })
            .shutdown_grace(Duration::from_secs(1))
            .build();
        let service = RenderService::start(
            Arc::clone(&backend),
            Arc::new(SimulatedRenderer::new().with_latency(Duration::from_secs(10))),
            Arc::new(SimulatedEncoder::new()),
            config,
        );

        // One job holds the only session, the other waits for it.
        let first = service.submit("alice", payload("one")).unwrap();
        let second = service.submit("bob", payload("two")).unwrap();
        assert!(second.admission.is_dispatched());
        tokio::time::sleep(Duration::from_millis(10)).await;

        let report = service.shutdown().await;
        assert_eq!(report.still_running, 2);

        let outcomes = [first.handle.wait().await, second.handle.wait().await];
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(outcomes.contains(&Err(JobError::ShuttingDown)));
        assert_eq!(backend.launches(), 1);
        assert_eq!(backend.live_sessions(), 0);
    }
}
