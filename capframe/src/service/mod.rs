//! High-level service facade for capframe.
//!
//! This module provides a simplified API that encapsulates all component
//! wiring and lifecycle management, following the Facade pattern.
//!
//! # Example
//!
//! ```ignore
//! use capframe::config::ConfigFile;
//! use capframe::service::{RenderService, ServiceConfig};
//!
//! let config = ServiceConfig::from(&ConfigFile::load()?);
//! let service = RenderService::start(backend, renderer, encoder, config)
//!     .with_assets(AssetCatalog::load_dir(&assets_dir)?);
//!
//! let submission = service.submit_text("alice", "hello there", Some("wave"))?;
//! let output = submission.handle.wait().await?;
//!
//! service.shutdown().await;
//! ```

mod config;
mod error;
mod facade;

pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use error::ServiceError;
pub use facade::RenderService;
