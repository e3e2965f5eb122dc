//! Batch scheduler: admission control and the drain loop.
//!
//! The scheduler owns the admission queue and the global in-flight counter
//! behind one mutex, so a rate check, a capacity check and the resulting
//! state change form a single transition.
//!
//! # Admission
//!
//! ```text
//!  submit ──► accepting? ──► rate allowed? ──► queue empty && in_flight < max?
//!                                                 │yes               │no
//!                                                 ▼                  ▼
//!                                            fast path          queue.submit
//!                                         (spawn, in_flight+1)   + trigger()
//! ```
//!
//! # Drain Loop
//!
//! At most one drain loop runs at a time (`LoopState::Draining`). Each
//! iteration takes `min(batch_size, headroom, queue_len)` jobs, adds them to
//! the in-flight counter before dispatch, runs them concurrently and waits
//! for every one to settle. It then subtracts the batch and, while jobs
//! remain, sleeps `batch_delay` before the next iteration. When headroom is
//! zero the loop parks; the fast-path job that frees capacity re-triggers it.

use super::config::SchedulerConfig;
use super::core::{ExecutionReport, JobExecutor};
use super::handle::{Admission, QueueStatus, Submission};
use super::job::{CallerId, Job, JobError};
use super::queue::{AdmissionError, AdmissionQueue, QueueConfig};
use super::rate_limiter::RateLimiter;
use super::stats::{SchedulerStats, StatsSnapshot};
use super::telemetry::{NullTelemetrySink, TelemetryEvent, TelemetrySink};
use super::traits::SessionBackend;
use crate::payload::RenderPayload;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info};

// =============================================================================
// State
// =============================================================================

/// Whether the drain loop is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    /// No drain loop is running.
    Idle,
    /// A drain loop is pulling batches.
    Draining,
}

/// Everything the control path mutates, guarded together.
#[derive(Debug)]
struct ControlState {
    queue: AdmissionQueue,
    in_flight: usize,
    loop_state: LoopState,
    accepting: bool,
}

/// Result of one admission decision, acted on outside the lock.
enum Decision {
    Dispatch { job: Job, in_flight: usize },
    Queued { position: usize, queued: usize, in_flight: usize },
}

/// What [`BatchScheduler::shutdown`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Queued jobs failed with [`JobError::ShuttingDown`].
    pub abandoned: usize,
    /// Jobs still executing when the grace period ran out.
    pub still_running: usize,
}

// =============================================================================
// Scheduler
// =============================================================================

struct Inner<B: SessionBackend> {
    config: SchedulerConfig,
    executor: JobExecutor<B>,
    limiter: Arc<RateLimiter>,
    control: Mutex<ControlState>,
    /// Signalled whenever in-flight work finishes.
    settled: Notify,
    stats: SchedulerStats,
    telemetry: Arc<dyn TelemetrySink>,
}

/// Admission, batching and concurrency control over a [`JobExecutor`].
///
/// Cheap to clone; clones share the same state.
pub struct BatchScheduler<B: SessionBackend> {
    inner: Arc<Inner<B>>,
}

impl<B: SessionBackend> Clone for BatchScheduler<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: SessionBackend> BatchScheduler<B> {
    /// Creates a scheduler.
    pub fn new(
        config: SchedulerConfig,
        queue: QueueConfig,
        limiter: Arc<RateLimiter>,
        executor: JobExecutor<B>,
    ) -> Self {
        Self::with_telemetry(config, queue, limiter, executor, Arc::new(NullTelemetrySink))
    }

    /// Creates a scheduler that reports to the given telemetry sink.
    ///
    /// A zero `max_concurrent` or `batch_size` is raised to 1.
    pub fn with_telemetry(
        config: SchedulerConfig,
        queue: QueueConfig,
        limiter: Arc<RateLimiter>,
        executor: JobExecutor<B>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: config.normalized(),
                executor,
                limiter,
                control: Mutex::new(ControlState {
                    queue: AdmissionQueue::new(queue),
                    in_flight: 0,
                    loop_state: LoopState::Idle,
                    accepting: true,
                }),
                settled: Notify::new(),
                stats: SchedulerStats::new(),
                telemetry,
            }),
        }
    }

    /// Submits a job.
    ///
    /// Answers synchronously: either the job was admitted (immediately or
    /// into the queue) and the returned handle will resolve exactly once, or
    /// the submission was refused and nothing was recorded against the
    /// caller's rate quota.
    ///
    /// Must be called within a Tokio runtime.
    pub fn submit(
        &self,
        caller: impl Into<CallerId>,
        payload: RenderPayload,
    ) -> Result<Submission, AdmissionError> {
        let inner = &self.inner;
        let caller = caller.into();
        inner.stats.submitted();

        let (job, handle) = Job::new(caller.clone(), payload);
        let job_id = job.id();

        let decision = {
            let mut control = inner.control.lock();
            if !control.accepting {
                Err(AdmissionError::ShuttingDown)
            } else if !inner.limiter.is_allowed(&caller) {
                Err(AdmissionError::RateLimited)
            } else if control.queue.is_empty() && control.in_flight < inner.config.max_concurrent {
                inner.limiter.record(&caller);
                control.in_flight += 1;
                Ok(Decision::Dispatch {
                    job,
                    in_flight: control.in_flight,
                })
            } else {
                match control.queue.submit(job) {
                    Ok(position) => {
                        inner.limiter.record(&caller);
                        Ok(Decision::Queued {
                            position,
                            queued: control.queue.len(),
                            in_flight: control.in_flight,
                        })
                    }
                    Err((reason, _job)) => Err(reason),
                }
            }
        };

        match decision {
            Ok(Decision::Dispatch { job, in_flight }) => {
                inner.stats.dispatched_immediately();
                inner.stats.observe_in_flight(in_flight);
                inner.telemetry.emit(TelemetryEvent::JobDispatched {
                    job_id,
                    caller,
                    in_flight,
                });
                let task = Arc::clone(inner);
                tokio::spawn(async move {
                    let report = task.executor.execute(job).await;
                    task.record(&report);
                    task.finish(1);
                    Inner::trigger(&task);
                });
                Ok(Submission {
                    admission: Admission::Dispatched,
                    handle,
                })
            }
            Ok(Decision::Queued {
                position,
                queued,
                in_flight,
            }) => {
                inner.stats.queued();
                inner.telemetry.emit(TelemetryEvent::JobQueued {
                    job_id,
                    caller,
                    position,
                    queue_depth: queued,
                });
                Inner::trigger(inner);
                Ok(Submission {
                    admission: Admission::Queued {
                        position,
                        queued,
                        in_flight,
                    },
                    handle,
                })
            }
            Err(reason) => {
                inner.stats.rejected(&reason);
                inner.telemetry.emit(TelemetryEvent::JobRejected { caller, reason });
                Err(reason)
            }
        }
    }

    /// Starts the drain loop if work is queued and capacity is free.
    pub fn trigger(&self) {
        Inner::trigger(&self.inner);
    }

    /// Stops accepting work, fails queued jobs and waits for in-flight ones.
    ///
    /// Queued jobs receive [`JobError::ShuttingDown`]. In-flight jobs are
    /// given `grace` to finish; whatever still runs afterwards completes on
    /// its own.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        let inner = &self.inner;
        let queued = {
            let mut control = inner.control.lock();
            control.accepting = false;
            control.queue.drain_all()
        };

        let abandoned = queued.len();
        for job in queued {
            job.complete(Err(JobError::ShuttingDown));
        }
        inner.stats.abandoned(abandoned);
        if abandoned > 0 {
            info!(abandoned, "Failed queued jobs at shutdown");
        }

        let deadline = Instant::now() + grace;
        loop {
            let notified = inner.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight() == 0 {
                break;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                break;
            }
        }

        let still_running = self.in_flight();
        ShutdownReport {
            abandoned,
            still_running,
        }
    }

    /// Caller-facing position plus queue and in-flight totals.
    pub fn queue_status(&self, caller: &CallerId) -> QueueStatus {
        let control = self.inner.control.lock();
        QueueStatus {
            position: control.queue.position(caller),
            queued: control.queue.len(),
            in_flight: control.in_flight,
        }
    }

    /// Jobs currently executing.
    pub fn in_flight(&self) -> usize {
        self.inner.control.lock().in_flight
    }

    /// Jobs waiting in the queue.
    pub fn queue_len(&self) -> usize {
        self.inner.control.lock().queue.len()
    }

    /// Whether the drain loop is running.
    pub fn loop_state(&self) -> LoopState {
        self.inner.control.lock().loop_state
    }

    /// Returns false once shutdown has begun.
    pub fn is_accepting(&self) -> bool {
        self.inner.control.lock().accepting
    }

    /// Returns the scheduler configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Returns the rate limiter.
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.inner.limiter
    }

    /// Returns the job executor.
    pub fn executor(&self) -> &JobExecutor<B> {
        &self.inner.executor
    }

    /// Returns a copy of the counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }
}

impl<B: SessionBackend> Inner<B> {
    fn trigger(this: &Arc<Self>) {
        {
            let mut control = this.control.lock();
            if control.loop_state == LoopState::Draining
                || control.queue.is_empty()
                || control.in_flight >= this.config.max_concurrent
            {
                return;
            }
            control.loop_state = LoopState::Draining;
        }

        let task = Arc::clone(this);
        tokio::spawn(async move { task.drain().await });
    }

    async fn drain(self: Arc<Self>) {
        loop {
            let batch = {
                let mut control = self.control.lock();
                let headroom = self.config.max_concurrent.saturating_sub(control.in_flight);
                let size = self.config.batch_size.min(headroom).min(control.queue.len());
                if size == 0 {
                    control.loop_state = LoopState::Idle;
                    None
                } else {
                    let batch = control.queue.take_batch(size);
                    control.in_flight += batch.len();
                    Some((batch, control.in_flight))
                }
            };
            let Some((batch, in_flight)) = batch else {
                debug!("Drain loop parked");
                return;
            };

            let size = batch.len();
            self.stats.observe_in_flight(in_flight);
            self.telemetry
                .emit(TelemetryEvent::BatchStarted { size, in_flight });

            let started = Instant::now();
            let reports = join_all(batch.into_iter().map(|job| self.executor.execute(job))).await;
            for report in &reports {
                self.record(report);
            }
            self.telemetry.emit(TelemetryEvent::BatchSettled {
                size,
                duration: started.elapsed(),
            });

            let more = {
                let mut control = self.control.lock();
                control.in_flight -= size;
                let more = !control.queue.is_empty();
                if !more {
                    control.loop_state = LoopState::Idle;
                }
                more
            };
            self.settled.notify_waiters();

            if !more {
                return;
            }
            tokio::time::sleep(self.config.batch_delay).await;
        }
    }

    fn record(&self, report: &ExecutionReport) {
        self.stats.finished(report.error.as_ref());
    }

    fn finish(&self, count: usize) {
        {
            let mut control = self.control.lock();
            control.in_flight -= count;
        }
        self.settled.notify_waiters();
    }
}

impl<B: SessionBackend> std::fmt::Debug for BatchScheduler<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let control = self.inner.control.lock();
        f.debug_struct("BatchScheduler")
            .field("queued", &control.queue.len())
            .field("in_flight", &control.in_flight)
            .field("loop_state", &control.loop_state)
            .field("accepting", &control.accepting)
            .finish()
    }
}
