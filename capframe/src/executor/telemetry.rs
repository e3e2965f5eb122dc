//! Telemetry for scheduler and pool observability.
//!
//! The scheduler, executor and resource pool emit structured events via a
//! sink abstraction and never decide how they are presented.
//!
//! # Pattern: Emit, Don't Present
//!
//! Components focus on emitting structured events. Consumers (logging,
//! metrics, a status command) decide how to present or aggregate them.
//!
//! # Example
//!
//! ```ignore
//! use capframe::executor::{TelemetryEvent, TelemetrySink};
//!
//! struct LoggingSink;
//!
//! impl TelemetrySink for LoggingSink {
//!     fn emit(&self, event: TelemetryEvent) {
//!         tracing::info!(?event, "Scheduler event");
//!     }
//! }
//! ```

use super::job::{CallerId, JobId};
use super::queue::AdmissionError;
use super::resource_pool::{RetireReason, SessionId};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Telemetry Events
// =============================================================================

/// Events emitted while admitting and running jobs.
#[derive(Clone, Debug)]
pub enum TelemetryEvent {
    // -------------------------------------------------------------------------
    // Admission Events
    // -------------------------------------------------------------------------
    /// A job bypassed the queue and started immediately.
    JobDispatched {
        job_id: JobId,
        caller: CallerId,
        in_flight: usize,
    },

    /// A job was appended to the admission queue.
    JobQueued {
        job_id: JobId,
        caller: CallerId,
        position: usize,
        queue_depth: usize,
    },

    /// A submission was refused.
    JobRejected {
        caller: CallerId,
        reason: AdmissionError,
    },

    // -------------------------------------------------------------------------
    // Execution Events
    // -------------------------------------------------------------------------
    /// A job finished (success or failure).
    JobCompleted {
        job_id: JobId,
        caller: CallerId,
        success: bool,
        error_kind: Option<&'static str>,
        duration: Duration,
    },

    /// The scheduler pulled a batch from the queue.
    BatchStarted { size: usize, in_flight: usize },

    /// Every job in a batch settled.
    BatchSettled { size: usize, duration: Duration },

    // -------------------------------------------------------------------------
    // Resource Pool Events
    // -------------------------------------------------------------------------
    /// The shared resource and its sessions were constructed.
    PoolInitialized { size: usize },

    /// The shared resource was torn down.
    PoolShutdown,

    /// No session became idle within the acquisition timeout.
    PoolExhausted { waited: Duration },

    /// A session was replaced by a fresh one.
    SessionRetired {
        old: SessionId,
        new: SessionId,
        use_count: u32,
        reason: RetireReason,
    },

    /// Replacement failed; the old session stays in service degraded.
    SessionRetirementFailed {
        session: SessionId,
        use_count: u32,
        reason: RetireReason,
    },
}

impl TelemetryEvent {
    /// Returns the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Self::JobDispatched { job_id, .. }
            | Self::JobQueued { job_id, .. }
            | Self::JobCompleted { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    /// Returns a short name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::JobDispatched { .. } => "job_dispatched",
            Self::JobQueued { .. } => "job_queued",
            Self::JobRejected { .. } => "job_rejected",
            Self::JobCompleted { .. } => "job_completed",
            Self::BatchStarted { .. } => "batch_started",
            Self::BatchSettled { .. } => "batch_settled",
            Self::PoolInitialized { .. } => "pool_initialized",
            Self::PoolShutdown => "pool_shutdown",
            Self::PoolExhausted { .. } => "pool_exhausted",
            Self::SessionRetired { .. } => "session_retired",
            Self::SessionRetirementFailed { .. } => "session_retirement_failed",
        }
    }
}

// =============================================================================
// Telemetry Sink Trait
// =============================================================================

/// Sink for telemetry events.
///
/// Implementations must be thread-safe (`Send + Sync`) as events are
/// emitted from many tasks concurrently, and `emit` should be fast and
/// non-blocking.
pub trait TelemetrySink: Send + Sync {
    /// Called when a telemetry event occurs.
    fn emit(&self, event: TelemetryEvent);
}

// =============================================================================
// Built-in Sink Implementations
// =============================================================================

/// No-op sink for when telemetry is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetrySink;

impl TelemetrySink for NullTelemetrySink {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// Sink that logs events using the `tracing` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn emit(&self, event: TelemetryEvent) {
        match &event {
            TelemetryEvent::JobDispatched {
                job_id,
                caller,
                in_flight,
            } => {
                tracing::info!(
                    job_id = %job_id,
                    caller = %caller,
                    in_flight = in_flight,
                    "Processing immediately"
                );
            }
            TelemetryEvent::JobQueued {
                job_id,
                caller,
                position,
                queue_depth,
            } => {
                tracing::info!(
                    job_id = %job_id,
                    caller = %caller,
                    position = position,
                    queue_depth = queue_depth,
                    "Added to queue"
                );
            }
            TelemetryEvent::JobRejected { caller, reason } => {
                tracing::info!(caller = %caller, reason = %reason, "Submission rejected");
            }
            TelemetryEvent::JobCompleted {
                job_id,
                caller,
                success,
                error_kind,
                duration,
            } => {
                if *success {
                    tracing::debug!(
                        job_id = %job_id,
                        caller = %caller,
                        duration_ms = duration.as_millis(),
                        "Job completed"
                    );
                } else {
                    tracing::warn!(
                        job_id = %job_id,
                        caller = %caller,
                        error = error_kind.unwrap_or("unknown"),
                        duration_ms = duration.as_millis(),
                        "Job failed"
                    );
                }
            }
            TelemetryEvent::BatchStarted { size, in_flight } => {
                tracing::info!(size = size, in_flight = in_flight, "Processing batch");
            }
            TelemetryEvent::BatchSettled { size, duration } => {
                tracing::debug!(
                    size = size,
                    duration_ms = duration.as_millis(),
                    "Batch settled"
                );
            }
            TelemetryEvent::PoolInitialized { size } => {
                tracing::info!(sessions = size, "Render pool initialized");
            }
            TelemetryEvent::PoolShutdown => {
                tracing::info!("Render pool shut down");
            }
            TelemetryEvent::PoolExhausted { waited } => {
                tracing::warn!(waited_ms = waited.as_millis(), "No available sessions in pool");
            }
            TelemetryEvent::SessionRetired {
                old,
                new,
                use_count,
                reason,
            } => {
                tracing::debug!(
                    old = %old,
                    new = %new,
                    use_count = use_count,
                    reason = %reason,
                    "Session retired"
                );
            }
            TelemetryEvent::SessionRetirementFailed {
                session,
                use_count,
                reason,
            } => {
                tracing::warn!(
                    session = %session,
                    use_count = use_count,
                    reason = %reason,
                    "Session replacement failed, keeping degraded session"
                );
            }
        }
    }
}

/// Sink that forwards events to multiple sinks.
pub struct MultiplexTelemetrySink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl MultiplexTelemetrySink {
    /// Creates a new multiplex sink with the given sinks.
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }

    /// Adds a sink to the multiplex.
    pub fn add_sink(&mut self, sink: Arc<dyn TelemetrySink>) {
        self.sinks.push(sink);
    }
}

impl TelemetrySink for MultiplexTelemetrySink {
    fn emit(&self, event: TelemetryEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

impl std::fmt::Debug for MultiplexTelemetrySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiplexTelemetrySink")
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_null_and_tracing_sinks_accept_events() {
        NullTelemetrySink.emit(TelemetryEvent::PoolShutdown);
        TracingTelemetrySink.emit(TelemetryEvent::PoolInitialized { size: 5 });
    }

    #[test]
    fn test_event_job_id() {
        let job_id = JobId::next();
        let event = TelemetryEvent::JobQueued {
            job_id,
            caller: CallerId::from("alice"),
            position: 1,
            queue_depth: 1,
        };
        assert_eq!(event.job_id(), Some(job_id));
        assert_eq!(TelemetryEvent::PoolShutdown.job_id(), None);
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(
            TelemetryEvent::BatchStarted {
                size: 3,
                in_flight: 3
            }
            .event_type(),
            "batch_started"
        );
        assert_eq!(
            TelemetryEvent::JobRejected {
                caller: CallerId::from("bob"),
                reason: AdmissionError::RateLimited,
            }
            .event_type(),
            "job_rejected"
        );
    }

    #[test]
    fn test_multiplex_sink() {
        struct CountingSink(AtomicUsize);

        impl TelemetrySink for CountingSink {
            fn emit(&self, _event: TelemetryEvent) {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        let sink1 = Arc::new(CountingSink(AtomicUsize::new(0)));
        let sink2 = Arc::new(CountingSink(AtomicUsize::new(0)));

        let multiplex = MultiplexTelemetrySink::new(vec![
            Arc::clone(&sink1) as Arc<dyn TelemetrySink>,
            Arc::clone(&sink2) as Arc<dyn TelemetrySink>,
        ]);

        multiplex.emit(TelemetryEvent::PoolShutdown);

        assert_eq!(sink1.0.load(Ordering::Relaxed), 1);
        assert_eq!(sink2.0.load(Ordering::Relaxed), 1);
    }
}
