//! capframe - admission, batching and session pooling for caption renders
//!
//! Many callers submit short render jobs (caption text laid over an
//! animation asset). Each job needs one of a few expensive worker sessions
//! on a shared resource. This library admits, queues, batches and runs
//! those jobs while keeping the sessions and the callers protected.
//!
//! # High-Level API
//!
//! For most use cases, the [`service`] module provides a simplified facade:
//!
//! ```ignore
//! use capframe::service::{RenderService, ServiceConfig};
//!
//! let service = RenderService::start(backend, renderer, encoder, ServiceConfig::default());
//! let submission = service.submit("alice", payload)?;
//! println!("{}", submission.admission);
//! let output = submission.handle.wait().await?;
//! ```
//!
//! The building blocks live in [`executor`].

pub mod assets;
pub mod config;
pub mod executor;
pub mod logging;
pub mod payload;
pub mod service;
pub mod simulate;

/// Version of the capframe library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
