//! capframe CLI - Command-line interface
//!
//! This binary drives the capframe library: it runs scheduler simulations
//! and manages the configuration file.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::config::ConfigCommands;
use commands::simulate::SimulateArgs;

#[derive(Parser)]
#[command(name = "capframe")]
#[command(version = capframe::VERSION)]
#[command(about = "Admission, batching and session pooling for caption render jobs", long_about = None)]
struct Cli {
    /// Use this configuration file instead of ~/.capframe/config.ini
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workload against simulated render sessions
    Simulate {
        /// Number of distinct callers
        #[arg(long, default_value = "4")]
        callers: usize,

        /// Jobs submitted per caller
        #[arg(long, default_value = "3")]
        jobs: usize,

        /// Simulated render time per job in milliseconds
        #[arg(long, default_value = "200")]
        latency_ms: u64,

        /// Probability (0.0 to 1.0) that a render fails
        #[arg(long, default_value = "0.0")]
        failure_rate: f64,

        /// Asset search query; anything but a unique match picks at random
        #[arg(long)]
        asset: Option<String>,

        /// Directory of .gif assets (defaults to a built-in demo list)
        #[arg(long)]
        assets_dir: Option<PathBuf>,

        /// Override [pool] size
        #[arg(long)]
        pool_size: Option<usize>,

        /// Override [scheduler] max_concurrent
        #[arg(long)]
        max_concurrent: Option<usize>,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Simulate {
            callers,
            jobs,
            latency_ms,
            failure_rate,
            asset,
            assets_dir,
            pool_size,
            max_concurrent,
        } => commands::simulate::run(SimulateArgs {
            config: cli.config,
            callers,
            jobs,
            latency_ms,
            failure_rate,
            asset,
            assets_dir,
            pool_size,
            max_concurrent,
        }),
        Commands::Config { command } => commands::config::run(command, cli.config.as_deref()),
    };

    if let Err(e) = result {
        e.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_simulate_with_overrides() {
        let cli = Cli::try_parse_from([
            "capframe",
            "simulate",
            "--callers",
            "10",
            "--failure-rate",
            "0.25",
            "--pool-size",
            "2",
            "--config",
            "/tmp/capframe.ini",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/capframe.ini")));
        match cli.command {
            Commands::Simulate {
                callers,
                jobs,
                failure_rate,
                pool_size,
                ..
            } => {
                assert_eq!(callers, 10);
                assert_eq!(jobs, 3);
                assert_eq!(failure_rate, 0.25);
                assert_eq!(pool_size, Some(2));
            }
            Commands::Config { .. } => panic!("expected simulate"),
        }
    }

    #[test]
    fn test_parse_config_init() {
        let cli = Cli::try_parse_from(["capframe", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                command: ConfigCommands::Init { force: true }
            }
        ));
    }
}
