//! In-process stand-ins for the rendering collaborators.
//!
//! Used by the `simulate` CLI command and the test suites. The backend
//! counts every lifecycle call and can be told to fail session construction
//! or report sessions as unhealthy. The renderer and encoder sleep for a
//! configurable latency and honour the job's cancellation token.

use crate::executor::{
    BackendError, EncodeError, Encoder, ImageHandle, OutputHandle, RenderError, Renderer,
    SessionBackend,
};
use crate::payload::{AssetSelector, RenderPayload};
use bytes::Bytes;
use futures::future::BoxFuture;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Width of simulated caption bitmaps.
const CAPTION_WIDTH: u32 = 800;

/// Height of one caption line.
const LINE_HEIGHT: u32 = 58;

// =============================================================================
// Backend
// =============================================================================

/// A session handed out by [`SimulatedBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedSession {
    serial: u64,
}

impl SimulatedSession {
    /// Serial number in open order, starting at 1.
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

/// Backend that opens counter-backed sessions.
#[derive(Debug)]
pub struct SimulatedBackend {
    open_latency: Duration,
    launches: AtomicUsize,
    shutdowns: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    next_serial: AtomicU64,
    /// Upcoming `open_session` calls that fail.
    failing_opens: AtomicUsize,
    /// Successful opens remaining before every open fails; `usize::MAX` = never.
    opens_until_failure: AtomicUsize,
    unhealthy: AtomicBool,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self {
            open_latency: Duration::ZERO,
            launches: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
            next_serial: AtomicU64::new(0),
            failing_opens: AtomicUsize::new(0),
            opens_until_failure: AtomicUsize::new(usize::MAX),
            unhealthy: AtomicBool::new(false),
        }
    }
}

impl SimulatedBackend {
    /// Creates a backend that never fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every session construction.
    pub fn with_open_latency(mut self, latency: Duration) -> Self {
        self.open_latency = latency;
        self
    }

    /// Makes the next `count` session constructions fail.
    pub fn fail_next_opens(&self, count: usize) {
        self.failing_opens.store(count, Ordering::SeqCst);
    }

    /// Lets `count` more constructions succeed, then fails all of them.
    pub fn fail_opens_after(&self, count: usize) {
        self.opens_until_failure.store(count, Ordering::SeqCst);
    }

    /// Sets the answer of every health check.
    pub fn set_healthy(&self, healthy: bool) {
        self.unhealthy.store(!healthy, Ordering::SeqCst);
    }

    /// Number of `launch` calls.
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Number of `shutdown` calls.
    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Sessions successfully opened.
    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Sessions closed.
    pub fn sessions_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sessions opened and not yet closed.
    pub fn live_sessions(&self) -> usize {
        self.sessions_opened().saturating_sub(self.sessions_closed())
    }

    fn take_failure(&self) -> bool {
        let forced = self
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if forced {
            return true;
        }
        self.opens_until_failure
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                usize::MAX => Some(usize::MAX),
                0 => None,
                n => Some(n - 1),
            })
            .is_err()
    }
}

impl SessionBackend for SimulatedBackend {
    type Session = SimulatedSession;

    fn launch(&self) -> BoxFuture<'_, Result<(), BackendError>> {
        Box::pin(async move {
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn open_session(&self) -> BoxFuture<'_, Result<SimulatedSession, BackendError>> {
        Box::pin(async move {
            if !self.open_latency.is_zero() {
                tokio::time::sleep(self.open_latency).await;
            }
            if self.take_failure() {
                return Err(BackendError::new("simulated session construction failure"));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            let serial = self.next_serial.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(SimulatedSession { serial })
        })
    }

    fn close_session(&self, _session: SimulatedSession) -> BoxFuture<'_, Result<(), BackendError>> {
        Box::pin(async move {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn health_check<'a>(&'a self, _session: &'a SimulatedSession) -> BoxFuture<'a, bool> {
        let healthy = !self.unhealthy.load(Ordering::SeqCst);
        Box::pin(std::future::ready(healthy))
    }

    fn shutdown(&self) -> BoxFuture<'_, Result<(), BackendError>> {
        Box::pin(async move {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

// =============================================================================
// Renderer
// =============================================================================

/// Renderer that waits `latency` and produces a text-sized bitmap.
#[derive(Debug, Default)]
pub struct SimulatedRenderer {
    latency: Duration,
    failure_rate: f64,
    calls: AtomicUsize,
    cancelled: AtomicUsize,
}

impl SimulatedRenderer {
    /// Creates an instant, infallible renderer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the time one render takes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Sets the probability (0.0 to 1.0) that a render fails.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Number of render calls started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of renders that observed cancellation.
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl<S: Send + Sync + 'static> Renderer<S> for SimulatedRenderer {
    fn render<'a>(
        &'a self,
        _session: &'a S,
        payload: &'a RenderPayload,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ImageHandle, RenderError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = rand::thread_rng().gen_bool(self.failure_rate);

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.cancelled.fetch_add(1, Ordering::SeqCst);
                    return Err(RenderError::new("render cancelled"));
                }
                _ = tokio::time::sleep(self.latency) => {}
            }

            if fail {
                return Err(RenderError::new("simulated render failure"));
            }

            let lines = payload.text().lines().count().max(1) as u32;
            Ok(ImageHandle {
                data: Bytes::copy_from_slice(payload.text().as_bytes()),
                width: CAPTION_WIDTH,
                height: lines * LINE_HEIGHT,
            })
        })
    }
}

// =============================================================================
// Encoder
// =============================================================================

/// Encoder that waits `latency` and names the output after the asset.
#[derive(Debug, Default)]
pub struct SimulatedEncoder {
    latency: Duration,
    calls: AtomicUsize,
}

impl SimulatedEncoder {
    /// Creates an instant encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the time one encode takes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of encode calls started.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Encoder for SimulatedEncoder {
    fn encode<'a>(
        &'a self,
        image: &'a ImageHandle,
        asset: &'a AssetSelector,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<OutputHandle, EncodeError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::select! {
                _ = cancel.cancelled() => return Err(EncodeError::new("encode cancelled")),
                _ = tokio::time::sleep(self.latency) => {}
            }

            let mut data = Vec::with_capacity(image.data.len() + asset.as_str().len() + 1);
            data.extend_from_slice(asset.as_str().as_bytes());
            data.push(b':');
            data.extend_from_slice(&image.data);

            Ok(OutputHandle {
                data: Bytes::from(data),
                file_name: format!("{}.gif", asset.as_str().replace(' ', "_")),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_backend_counts_lifecycle() {
        let backend = SimulatedBackend::new();
        backend.launch().await.unwrap();
        let a = backend.open_session().await.unwrap();
        let b = backend.open_session().await.unwrap();
        assert_eq!(a.serial(), 1);
        assert_eq!(b.serial(), 2);
        backend.close_session(a).await.unwrap();
        assert_eq!(backend.live_sessions(), 1);
        backend.shutdown().await.unwrap();
        assert_eq!(backend.launches(), 1);
        assert_eq!(backend.shutdowns(), 1);
    }

    #[tokio::test]
    async fn test_backend_failure_injection() {
        let backend = SimulatedBackend::new();
        backend.fail_next_opens(1);
        assert!(backend.open_session().await.is_err());
        assert!(backend.open_session().await.is_ok());

        backend.fail_opens_after(1);
        assert!(backend.open_session().await.is_ok());
        assert!(backend.open_session().await.is_err());
        assert!(backend.open_session().await.is_err());
        assert_eq!(backend.sessions_opened(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_open_latency() {
        let backend = SimulatedBackend::new().with_open_latency(Duration::from_secs(2));
        let started = tokio::time::Instant::now();
        backend.open_session().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_backend_health_toggle() {
        let backend = SimulatedBackend::new();
        let session = backend.open_session().await.unwrap();
        assert!(backend.health_check(&session).await);
        backend.set_healthy(false);
        assert!(!backend.health_check(&session).await);
    }

    #[tokio::test]
    async fn test_render_and_encode() {
        let renderer = SimulatedRenderer::new();
        let encoder = SimulatedEncoder::new();
        let payload = RenderPayload::new("line one\nline two", "happy cat").unwrap();
        let cancel = CancellationToken::new();

        let image = Renderer::<()>::render(&renderer, &(), &payload, &cancel)
            .await
            .unwrap();
        assert_eq!(image.height, 2 * LINE_HEIGHT);

        let output = encoder.encode(&image, payload.asset(), &cancel).await.unwrap();
        assert_eq!(output.file_name, "happy_cat.gif");
        assert!(output.data.starts_with(b"happy cat:"));
        assert_eq!(renderer.calls(), 1);
        assert_eq!(encoder.calls(), 1);
    }

    #[tokio::test]
    async fn test_render_observes_cancellation() {
        let renderer = SimulatedRenderer::new().with_latency(Duration::from_secs(60));
        let payload = RenderPayload::new("slow", "cat").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = Renderer::<()>::render(&renderer, &(), &payload, &cancel).await;
        assert!(result.is_err());
        assert_eq!(renderer.cancelled(), 1);
    }

    #[tokio::test]
    async fn test_render_failure_rate_one_always_fails() {
        let renderer = SimulatedRenderer::new().with_failure_rate(1.0);
        let payload = RenderPayload::new("x", "cat").unwrap();
        let cancel = CancellationToken::new();
        let result = Renderer::<()>::render(&renderer, &(), &payload, &cancel).await;
        assert_eq!(result, Err(RenderError::new("simulated render failure")));
    }
}
