//! Job admission, batching and worker-session execution.
//!
//! This module accepts short-lived render jobs from many callers and runs
//! them against a small pool of expensive, stateful worker sessions while
//! protecting both the sessions (bounded concurrency) and the callers
//! (bounded waits, one answer per accepted job).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       BatchScheduler                         │
//! │  submit → RateLimiter → fast path | AdmissionQueue → batches │
//! ├─────────────────────────────────────────────────────────────┤
//! │                        JobExecutor                           │
//! │  deadline, cancellation, panic isolation per job             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │ Resource    │  │ Renderer /  │  │ Telemetry           │  │
//! │  │ Pool        │  │ Encoder     │  │ Sink                │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **Job**: caller identity plus a validated [`RenderPayload`]. Its result
//!   sink is completed exactly once, success or failure.
//!
//! - **Resource Pool**: a fixed set of sessions on one shared backend
//!   resource, leased LIFO and retired after `max_reuse` jobs or a failed
//!   health check.
//!
//! - **Admission**: a per-caller sliding-window rate limit, then either the
//!   fast path (empty queue and free capacity) or a bounded FIFO queue with
//!   a per-caller cap.
//!
//! - **Batches**: a single drain loop pulls `min(batch_size, headroom,
//!   queue_len)` jobs, runs them concurrently and pauses between batches.
//!
//! # Example
//!
//! ```ignore
//! use capframe::executor::*;
//!
//! let pool = Arc::new(ResourcePool::new(backend, PoolConfig::default()));
//! let executor = JobExecutor::new(pool, renderer, encoder, DEFAULT_JOB_TIMEOUT);
//! let limiter = Arc::new(RateLimiter::default());
//! let scheduler = BatchScheduler::new(
//!     SchedulerConfig::default(),
//!     QueueConfig::default(),
//!     limiter,
//!     executor,
//! );
//!
//! let submission = scheduler.submit("alice", payload)?;
//! println!("{}", submission.admission);
//! let output = submission.handle.wait().await?;
//! ```
//!
//! # Telemetry
//!
//! The scheduler, executor and pool emit structured events via the
//! [`TelemetrySink`] trait: admission decisions, batch boundaries, job
//! results and session retirement.
//!
//! [`RenderPayload`]: crate::payload::RenderPayload

mod config;
mod core;
mod handle;
mod job;
mod queue;
mod rate_limiter;
mod resource_pool;
mod scheduler;
mod stats;
mod telemetry;
mod traits;
mod watchdog;

// Re-export public types

// Configuration
pub use config::{
    SchedulerConfig, DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, DEFAULT_JOB_TIMEOUT,
    DEFAULT_MAX_CONCURRENT, DEFAULT_SHUTDOWN_GRACE,
};

// Jobs and handles
pub use handle::{Admission, JobHandle, QueueStatus, Submission};
pub use job::{CallerId, Job, JobError, JobId, JobOutcome, ResultSink};

// Collaborators
pub use traits::{
    BackendError, EncodeError, Encoder, ImageHandle, OutputHandle, RenderError, Renderer,
    SessionBackend,
};

// Resource pool
pub use resource_pool::{
    PoolConfig, PoolError, PoolSnapshot, ResourcePool, RetireReason, SessionId, SessionLease,
    SessionState, DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_IDLE_SWEEP_INTERVAL, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_MAX_REUSE, DEFAULT_POOL_SIZE,
};

// Admission
pub use queue::{
    AdmissionError, AdmissionQueue, QueueConfig, DEFAULT_MAX_PER_CALLER, DEFAULT_MAX_QUEUE_SIZE,
};
pub use rate_limiter::{
    RateLimitConfig, RateLimiter, DEFAULT_MAX_REQUESTS, DEFAULT_RATE_SWEEP_INTERVAL,
    DEFAULT_RATE_WINDOW,
};

// Execution
pub use self::core::{ExecutionReport, JobExecutor};
pub use scheduler::{BatchScheduler, LoopState, ShutdownReport};
pub use stats::{SchedulerStats, StatsSnapshot};

// Maintenance
pub use watchdog::{PoolIdleReaper, RateWindowSweeper, ReapOutcome, FORCED_RECLAIM_FACTOR};

// Telemetry
pub use telemetry::{
    MultiplexTelemetrySink, NullTelemetrySink, TelemetryEvent, TelemetrySink,
    TracingTelemetrySink,
};
