//! Configuration for capframe components.
//!
//! The on-disk format is an INI file at `~/.capframe/config.ini`, one
//! `[section]` per component. [`ConfigFile`] is the parsed form; each
//! runtime component converts from it with `From<&ConfigFile>`.
//!
//! # Example
//!
//! ```ignore
//! use capframe::config::ConfigFile;
//! use capframe::executor::PoolConfig;
//!
//! let file = ConfigFile::load()?;
//! let pool_config = PoolConfig::from(&file);
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::{CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_LOG_FILE};
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    ConfigFile, LoggingSettings, PoolSettings, QueueSettings, RateLimitSettings,
    SchedulerSettings,
};
