//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! This module contains the `to_config_string()` function that produces
//! the commented INI representation written to `config.ini`.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    format!(
        r#"[pool]
; Worker sessions opened on the shared render resource
size = {}
; Jobs a session serves before it is replaced with a fresh one
max_reuse = {}
; Longest a job waits for a free session (milliseconds)
acquire_timeout_ms = {}
; Close the render resource after this long without activity (seconds)
idle_timeout_secs = {}
; How often the idle check runs (seconds)
sweep_interval_secs = {}

[queue]
; Jobs waiting for a batch slot, across all callers
max_size = {}
; Jobs a single caller may have waiting at once
max_per_caller = {}

[rate_limit]
; Requests a caller may make per window
max_requests = {}
; Sliding window length (seconds)
window_secs = {}
; How often stale windows are swept (seconds)
sweep_interval_secs = {}

[scheduler]
; Jobs executing at once, including fast-path jobs
max_concurrent = {}
; Jobs pulled from the queue per batch
batch_size = {}
; Pause between batches (milliseconds, 0 = none)
batch_delay_ms = {}
; Deadline for one job from start to encoded output (seconds)
job_timeout_secs = {}

[logging]
; Directory for the log file
directory = {}
; Log file name (cleared on every start)
file = {}
"#,
        config.pool.size,
        config.pool.max_reuse,
        config.pool.acquire_timeout_ms,
        config.pool.idle_timeout_secs,
        config.pool.sweep_interval_secs,
        config.queue.max_size,
        config.queue.max_per_caller,
        config.rate_limit.max_requests,
        config.rate_limit.window_secs,
        config.rate_limit.sweep_interval_secs,
        config.scheduler.max_concurrent,
        config.scheduler.batch_size,
        config.scheduler.batch_delay_ms,
        config.scheduler.job_timeout_secs,
        path_to_string(&config.logging.directory),
        config.logging.file,
    )
}

/// Convert a path to a string, using ~ for the home directory.
pub(crate) fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");

        let mut config = ConfigFile::default();
        config.pool.size = 2;
        config.pool.max_reuse = 10;
        config.queue.max_per_caller = 1;
        config.rate_limit.window_secs = 30;
        config.scheduler.batch_delay_ms = 0;
        config.logging.directory = temp_dir.path().join("logs");
        config.logging.file = "run.log".to_string();

        config.save_to(&config_path).unwrap();
        let loaded = ConfigFile::load_from(&config_path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_written_file_is_commented() {
        let content = to_config_string(&ConfigFile::default());
        assert!(content.contains("[pool]"));
        assert!(content.contains("[scheduler]"));
        assert!(content.contains("; Jobs pulled from the queue per batch"));
        assert!(content.contains("batch_size = 3"));
    }

    #[test]
    fn test_path_to_string_collapses_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(path_to_string(&home.join(".capframe")), "~/.capframe");
        }
        assert_eq!(path_to_string(Path::new("/tmp/x")), "/tmp/x");
    }
}
