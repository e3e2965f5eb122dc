//! Configuration management CLI commands.
//!
//! Provides `config path`, `config show` and `config init` for locating,
//! inspecting and creating the configuration file.

use clap::Subcommand;
use capframe::config::{config_file_path, ConfigFile};
use std::path::{Path, PathBuf};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Show the effective configuration (file values over defaults)
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
///
/// `path_override` replaces the default `~/.capframe/config.ini`.
pub fn run(command: ConfigCommands, path_override: Option<&Path>) -> Result<(), CliError> {
    let path = path_override
        .map(Path::to_path_buf)
        .unwrap_or_else(config_file_path);

    match command {
        ConfigCommands::Path => run_path(&path),
        ConfigCommands::Show => run_show(&path),
        ConfigCommands::Init { force } => run_init(&path, force).map(|_| ()),
    }
}

/// Show the configuration file path.
fn run_path(path: &Path) -> Result<(), CliError> {
    println!("{}", path.display());
    Ok(())
}

/// Show the effective configuration.
fn run_show(path: &Path) -> Result<(), CliError> {
    let config = ConfigFile::load_from(path)?;

    if path.exists() {
        println!("; Loaded from {}", path.display());
    } else {
        println!("; {} not found, showing defaults", path.display());
    }
    println!();
    print!("{}", config.to_ini_string());

    Ok(())
}

/// Write a default configuration file.
fn run_init(path: &Path, force: bool) -> Result<PathBuf, CliError> {
    if force {
        ConfigFile::default().save_to(path)?;
        println!("Wrote default configuration to {}", path.display());
    } else if ConfigFile::ensure_exists_at(path)? {
        println!("Created {}", path.display());
    } else {
        println!("{} already exists (use --force to overwrite)", path.display());
    }
    Ok(path.to_path_buf())
}
