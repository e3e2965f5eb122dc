//! Job executor core: one job, one session, one deadline.
//!
//! [`JobExecutor::run`] leases a session, renders, encodes and releases the
//! session. The work runs on its own task; the caller waits on it with the
//! job deadline.
//!
//! # Deadline Semantics
//!
//! ```text
//!  caller ──timeout(job_timeout)──► JoinHandle ─── work task ───────────┐
//!     │                                             acquire (cancellable)
//!     │ deadline passes                             render(cancel)
//!     ├─► cancel token fired                        encode(cancel)
//!     └─► Err(DeadlineExceeded)                     release  ◄── always
//! ```
//!
//! On deadline the caller gets [`JobError::DeadlineExceeded`] right away and
//! the token is cancelled. The work task keeps its lease until the renderer
//! or encoder returns, then releases the session; it never leaks one. A job
//! still waiting for a session when the token fires gives up without taking
//! one.

use super::job::{CallerId, Job, JobError, JobId, JobOutcome};
use super::resource_pool::ResourcePool;
use super::telemetry::{NullTelemetrySink, TelemetryEvent, TelemetrySink};
use super::traits::{Encoder, Renderer, SessionBackend};
use crate::payload::RenderPayload;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Summary of one executed job, returned after its sink was completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    /// The job that ran.
    pub job_id: JobId,
    /// Submitting caller.
    pub caller: CallerId,
    /// Failure delivered to the caller, if any.
    pub error: Option<JobError>,
    /// Time from submission to completion.
    pub latency: Duration,
}

impl ExecutionReport {
    /// Returns true if the caller received an output.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs single jobs against the shared session pool.
pub struct JobExecutor<B: SessionBackend> {
    pool: Arc<ResourcePool<B>>,
    renderer: Arc<dyn Renderer<B::Session>>,
    encoder: Arc<dyn Encoder>,
    job_timeout: Duration,
    telemetry: Arc<dyn TelemetrySink>,
}

impl<B: SessionBackend> JobExecutor<B> {
    /// Creates an executor with the given job deadline.
    pub fn new(
        pool: Arc<ResourcePool<B>>,
        renderer: Arc<dyn Renderer<B::Session>>,
        encoder: Arc<dyn Encoder>,
        job_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            renderer,
            encoder,
            job_timeout,
            telemetry: Arc::new(NullTelemetrySink),
        }
    }

    /// Sets the telemetry sink.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Returns the session pool.
    pub fn pool(&self) -> &Arc<ResourcePool<B>> {
        &self.pool
    }

    /// Returns the per-job deadline.
    pub fn job_timeout(&self) -> Duration {
        self.job_timeout
    }

    /// Runs one payload under the job deadline.
    pub async fn run(&self, payload: RenderPayload) -> JobOutcome {
        let cancel = CancellationToken::new();
        let work = tokio::spawn(perform(
            Arc::clone(&self.pool),
            Arc::clone(&self.renderer),
            Arc::clone(&self.encoder),
            payload,
            cancel.clone(),
        ));

        match tokio::time::timeout(self.job_timeout, work).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) => Err(JobError::Panicked(join_err.to_string())),
            Err(_) => {
                cancel.cancel();
                Err(JobError::DeadlineExceeded(self.job_timeout))
            }
        }
    }

    /// Runs a job and completes its result sink exactly once.
    pub async fn execute(&self, job: Job) -> ExecutionReport {
        let (job_id, caller, payload, submitted_at, sink) = job.into_parts();
        let started = Instant::now();

        let outcome = self.run(payload).await;
        let error = outcome.as_ref().err().cloned();

        self.telemetry.emit(TelemetryEvent::JobCompleted {
            job_id,
            caller: caller.clone(),
            success: error.is_none(),
            error_kind: error.as_ref().map(JobError::kind),
            duration: started.elapsed(),
        });

        if !sink.complete(outcome) {
            debug!(job_id = %job_id, caller = %caller, "Caller dropped its handle, result discarded");
        }

        ExecutionReport {
            job_id,
            caller,
            error,
            latency: submitted_at.elapsed(),
        }
    }
}

/// Acquire, render, encode, release. Runs detached from the caller.
async fn perform<B: SessionBackend>(
    pool: Arc<ResourcePool<B>>,
    renderer: Arc<dyn Renderer<B::Session>>,
    encoder: Arc<dyn Encoder>,
    payload: RenderPayload,
    cancel: CancellationToken,
) -> JobOutcome {
    let lease = pool.acquire_cancellable(&cancel).await?;

    let result = AssertUnwindSafe(async {
        let image = renderer.render(lease.session(), &payload, &cancel).await?;
        let output = encoder.encode(&image, payload.asset(), &cancel).await?;
        Ok::<_, JobError>(output)
    })
    .catch_unwind()
    .await;

    pool.release(lease).await;

    match result {
        Ok(outcome) => outcome,
        Err(panic) => Err(JobError::Panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
