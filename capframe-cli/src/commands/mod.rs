//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`config`] - Configuration management (path, show, init)
//! - [`simulate`] - Drive the scheduler with simulated collaborators

pub mod config;
pub mod simulate;
