//! Collaborator traits for the job executor.
//!
//! The scheduling core never renders or encodes anything itself. It drives
//! three abstractions supplied by the embedding application:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Scheduling core                          │
//! │  • SessionBackend - shared resource + reusable sessions      │
//! │  • Renderer       - payload text → bitmap, on a session      │
//! │  • Encoder        - bitmap + asset → output clip             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All methods return boxed futures so the traits stay object safe; the
//! scheduler stores renderers and encoders as `Arc<dyn ...>`.
//!
//! Every render and encode call receives a [`CancellationToken`]. It is
//! cancelled when the job's deadline passes. Implementations should stop
//! early when they observe it, but the executor never waits for them to.

use crate::payload::{AssetSelector, RenderPayload};
use bytes::Bytes;
use futures::future::BoxFuture;
use std::fmt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Handles
// ============================================================================

/// A rendered caption bitmap.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageHandle {
    /// Encoded image bytes (PNG for real renderers).
    pub data: Bytes,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("bytes", &self.data.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// A finished output clip handed back to the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct OutputHandle {
    /// Encoded clip bytes.
    pub data: Bytes,
    /// Suggested file name for delivery.
    pub file_name: String,
}

impl fmt::Debug for OutputHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputHandle")
            .field("bytes", &self.data.len())
            .field("file_name", &self.file_name)
            .finish()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Renderer failure: malformed input or resource unavailability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct RenderError {
    /// Human-readable error message.
    pub message: String,
}

impl RenderError {
    /// Creates a new render error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Encoder failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct EncodeError {
    /// Human-readable error message.
    pub message: String,
}

impl EncodeError {
    /// Creates a new encode error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure reported by a [`SessionBackend`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    /// Human-readable error message.
    pub message: String,
}

impl BackendError {
    /// Creates a new backend error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============================================================================
// Session Backend
// ============================================================================

/// Owner of the expensive shared resource and its reusable sessions.
///
/// For a headless browser this is the browser process (`launch`/`shutdown`)
/// and its pages (`open_session`/`close_session`). The resource pool is the
/// only caller.
pub trait SessionBackend: Send + Sync + 'static {
    /// One reusable handle into the shared resource.
    type Session: Send + Sync + 'static;

    /// Starts the shared resource. Called once per pool lifetime.
    fn launch(&self) -> BoxFuture<'_, Result<(), BackendError>>;

    /// Opens a fresh session on the running resource.
    fn open_session(&self) -> BoxFuture<'_, Result<Self::Session, BackendError>>;

    /// Tears a session down.
    fn close_session(&self, session: Self::Session) -> BoxFuture<'_, Result<(), BackendError>>;

    /// Reports whether a session is still fit for reuse.
    ///
    /// Checked on every release; unhealthy sessions are retired.
    fn health_check<'a>(&'a self, _session: &'a Self::Session) -> BoxFuture<'a, bool> {
        Box::pin(std::future::ready(true))
    }

    /// Stops the shared resource after all sessions were closed.
    fn shutdown(&self) -> BoxFuture<'_, Result<(), BackendError>>;
}

// ============================================================================
// Renderer / Encoder
// ============================================================================

/// Turns a payload into a bitmap using a leased session.
pub trait Renderer<S>: Send + Sync + 'static {
    /// Renders the payload's caption text.
    fn render<'a>(
        &'a self,
        session: &'a S,
        payload: &'a RenderPayload,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ImageHandle, RenderError>>;
}

/// Combines a rendered bitmap with the selected asset.
pub trait Encoder: Send + Sync + 'static {
    /// Produces the output clip.
    fn encode<'a>(
        &'a self,
        image: &'a ImageHandle,
        asset: &'a AssetSelector,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<OutputHandle, EncodeError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysHealthy;

    impl SessionBackend for AlwaysHealthy {
        type Session = u32;

        fn launch(&self) -> BoxFuture<'_, Result<(), BackendError>> {
            Box::pin(async { Ok(()) })
        }

        fn open_session(&self) -> BoxFuture<'_, Result<u32, BackendError>> {
            Box::pin(async { Ok(7) })
        }

        fn close_session(&self, _session: u32) -> BoxFuture<'_, Result<(), BackendError>> {
            Box::pin(async { Ok(()) })
        }

        fn shutdown(&self) -> BoxFuture<'_, Result<(), BackendError>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn test_default_health_check_is_healthy() {
        let backend = AlwaysHealthy;
        let session = backend.open_session().await.unwrap();
        assert!(backend.health_check(&session).await);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(RenderError::new("Invalid text").to_string(), "Invalid text");
        assert_eq!(EncodeError::new("probe failed").to_string(), "probe failed");
        assert_eq!(BackendError::new("no browser").to_string(), "no browser");
    }

    #[test]
    fn test_handle_debug_hides_bytes() {
        let image = ImageHandle {
            data: Bytes::from_static(b"png"),
            width: 800,
            height: 116,
        };
        let debug = format!("{:?}", image);
        assert!(debug.contains("bytes: 3"));
        assert!(debug.contains("800"));
    }
}
