//! Simulate command - drive the scheduler with simulated collaborators.
//!
//! Several callers submit jobs in rounds against an in-process backend,
//! renderer and encoder. Prints every admission decision, every outcome
//! and a statistics summary.

use capframe::assets::AssetCatalog;
use capframe::config::ConfigFile;
use capframe::executor::{JobId, JobOutcome};
use capframe::service::{RenderService, ServiceConfig};
use capframe::simulate::{SimulatedBackend, SimulatedEncoder, SimulatedRenderer};
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Assets used when no asset directory is given.
const DEMO_ASSETS: &[&str] = &["wave", "shrug", "dancing cat", "thumbs up", "facepalm"];

/// Arguments for the simulate command.
#[derive(Debug, Clone)]
pub struct SimulateArgs {
    pub config: Option<PathBuf>,
    pub callers: usize,
    pub jobs: usize,
    pub latency_ms: u64,
    pub failure_rate: f64,
    pub asset: Option<String>,
    pub assets_dir: Option<PathBuf>,
    pub pool_size: Option<usize>,
    pub max_concurrent: Option<usize>,
}

/// Run the simulate command.
pub fn run(args: SimulateArgs) -> Result<(), CliError> {
    validate(&args)?;

    let runner = CliRunner::new(args.config.as_deref())?;
    runner.log_startup("simulate");

    let file = apply_overrides(runner.config(), &args);
    let service_config = ServiceConfig::from(&file);
    let assets = match &args.assets_dir {
        Some(dir) => AssetCatalog::load_dir(dir)?,
        None => AssetCatalog::from_names(DEMO_ASSETS.iter().copied()),
    };
    if assets.is_empty() {
        return Err(capframe::assets::AssetError::Empty.into());
    }

    let runtime = runner.runtime()?;
    runtime.block_on(simulate(args, service_config, assets))
}

fn validate(args: &SimulateArgs) -> Result<(), CliError> {
    if args.callers == 0 || args.jobs == 0 {
        return Err(CliError::InvalidArgument(
            "--callers and --jobs must be at least 1".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&args.failure_rate) {
        return Err(CliError::InvalidArgument(format!(
            "--failure-rate must be between 0.0 and 1.0, got {}",
            args.failure_rate
        )));
    }
    if args.pool_size == Some(0) || args.max_concurrent == Some(0) {
        return Err(CliError::InvalidArgument(
            "--pool-size and --max-concurrent must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Applies command-line overrides on top of the loaded file settings.
fn apply_overrides(file: &ConfigFile, args: &SimulateArgs) -> ConfigFile {
    let mut file = file.clone();
    if let Some(size) = args.pool_size {
        file.pool.size = size;
    }
    if let Some(max) = args.max_concurrent {
        file.scheduler.max_concurrent = max;
    }
    file
}

async fn simulate(
    args: SimulateArgs,
    config: ServiceConfig,
    assets: AssetCatalog,
) -> Result<(), CliError> {
    let backend = Arc::new(SimulatedBackend::new());
    let renderer = Arc::new(
        SimulatedRenderer::new()
            .with_latency(Duration::from_millis(args.latency_ms))
            .with_failure_rate(args.failure_rate),
    );
    let encoder = Arc::new(SimulatedEncoder::new().with_latency(Duration::from_millis(
        args.latency_ms / 4,
    )));

    println!(
        "Simulating {} caller(s) x {} job(s), render latency {} ms, failure rate {:.0}%",
        args.callers,
        args.jobs,
        args.latency_ms,
        args.failure_rate * 100.0
    );
    println!(
        "Pool: {} sessions, max {} in flight, batches of {}",
        config.pool().size,
        config.scheduler().max_concurrent,
        config.scheduler().batch_size
    );
    println!();

    let service = RenderService::start(backend.clone(), renderer, encoder, config)
        .with_assets(assets);
    let started = Instant::now();

    let mut pending = Vec::new();
    for round in 0..args.jobs {
        for caller in 0..args.callers {
            let caller_id = format!("caller-{}", caller + 1);
            let text = format!("{} says hello (round {})", caller_id, round + 1);
            match service.submit_text(caller_id.as_str(), &text, args.asset.as_deref()) {
                Ok(submission) => {
                    let job_id = submission.handle.job_id();
                    println!(
                        "  {:<10} {:<8} {}",
                        caller_id,
                        job_id.to_string(),
                        submission.admission
                    );
                    pending.push((caller_id, job_id, submission.handle));
                }
                Err(e) => {
                    println!("  {:<10} {:<8} rejected: {}", caller_id, "-", e);
                }
            }
        }
    }
    println!();

    let accepted = pending.len();
    let waits = join_all(
        pending
            .into_iter()
            .map(|(caller, job_id, handle)| async move { (caller, job_id, handle.wait().await) }),
    );

    tokio::select! {
        results = waits => {
            for (caller, job_id, outcome) in results {
                print_outcome(&caller, job_id, &outcome);
            }
        }
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!("Interrupted, shutting down");
            println!("Interrupted, shutting down...");
        }
    }

    let report = service.shutdown().await;
    let elapsed = started.elapsed();
    let stats = service.stats();

    info!(%stats, elapsed_ms = elapsed.as_millis() as u64, "Simulation finished");

    println!();
    println!("Summary");
    println!("=======");
    println!("  Accepted:        {}", accepted);
    println!("  Rejected:        {}", stats.rejected());
    println!("  Succeeded:       {}", stats.succeeded);
    println!("  Failed:          {}", stats.failed);
    println!("  Timed out:       {}", stats.timed_out);
    println!("  Abandoned:       {}", report.abandoned);
    println!("  Peak in flight:  {}", stats.peak_in_flight);
    println!(
        "  Sessions:        {} opened, {} closed",
        backend.sessions_opened(),
        backend.sessions_closed()
    );
    println!("  Elapsed:         {:.2}s", elapsed.as_secs_f64());

    Ok(())
}

fn print_outcome(caller: &str, job_id: JobId, outcome: &JobOutcome) {
    match outcome {
        Ok(output) => println!(
            "  {:<10} {:<8} ok    {} ({} bytes)",
            caller,
            job_id.to_string(),
            output.file_name,
            output.data.len()
        ),
        Err(e) => println!("  {:<10} {:<8} error {}", caller, job_id.to_string(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> SimulateArgs {
        SimulateArgs {
            config: None,
            callers: 2,
            jobs: 2,
            latency_ms: 10,
            failure_rate: 0.0,
            asset: None,
            assets_dir: None,
            pool_size: None,
            max_concurrent: None,
        }
    }

    #[test]
    fn test_validate_rejects_bad_arguments() {
        assert!(validate(&args()).is_ok());
        assert!(validate(&SimulateArgs {
            callers: 0,
            ..args()
        })
        .is_err());
        assert!(validate(&SimulateArgs {
            failure_rate: 1.5,
            ..args()
        })
        .is_err());
        assert!(validate(&SimulateArgs {
            pool_size: Some(0),
            ..args()
        })
        .is_err());
    }

    #[test]
    fn test_overrides_apply_on_top_of_file() {
        let file = ConfigFile::default();
        let merged = apply_overrides(
            &file,
            &SimulateArgs {
                pool_size: Some(2),
                max_concurrent: Some(4),
                ..args()
            },
        );
        assert_eq!(merged.pool.size, 2);
        assert_eq!(merged.scheduler.max_concurrent, 4);
        assert_eq!(merged.queue, file.queue);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_runs_to_completion() {
        let assets = AssetCatalog::from_names(DEMO_ASSETS.iter().copied());
        simulate(args(), ServiceConfig::default(), assets)
            .await
            .unwrap();
    }
}
