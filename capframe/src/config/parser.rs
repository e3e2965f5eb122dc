//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This module contains the `parse_ini()` function and its helpers.
//! It is the single place where INI key names are mapped to struct fields.

use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;

use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [pool] section
    if let Some(section) = ini.section(Some("pool")) {
        let s = Section::new("pool", section);
        if let Some(v) = s.positive("size")? {
            config.pool.size = v;
        }
        if let Some(v) = s.positive("max_reuse")? {
            config.pool.max_reuse = v;
        }
        if let Some(v) = s.positive("acquire_timeout_ms")? {
            config.pool.acquire_timeout_ms = v;
        }
        if let Some(v) = s.positive("idle_timeout_secs")? {
            config.pool.idle_timeout_secs = v;
        }
        if let Some(v) = s.positive("sweep_interval_secs")? {
            config.pool.sweep_interval_secs = v;
        }
    }

    // [queue] section
    if let Some(section) = ini.section(Some("queue")) {
        let s = Section::new("queue", section);
        if let Some(v) = s.positive("max_size")? {
            config.queue.max_size = v;
        }
        if let Some(v) = s.positive("max_per_caller")? {
            config.queue.max_per_caller = v;
        }
    }

    // [rate_limit] section
    if let Some(section) = ini.section(Some("rate_limit")) {
        let s = Section::new("rate_limit", section);
        if let Some(v) = s.positive("max_requests")? {
            config.rate_limit.max_requests = v;
        }
        if let Some(v) = s.positive("window_secs")? {
            config.rate_limit.window_secs = v;
        }
        if let Some(v) = s.positive("sweep_interval_secs")? {
            config.rate_limit.sweep_interval_secs = v;
        }
    }

    // [scheduler] section
    if let Some(section) = ini.section(Some("scheduler")) {
        let s = Section::new("scheduler", section);
        if let Some(v) = s.positive("max_concurrent")? {
            config.scheduler.max_concurrent = v;
        }
        if let Some(v) = s.positive("batch_size")? {
            config.scheduler.batch_size = v;
        }
        // A zero delay is allowed: batches then run back to back.
        if let Some(v) = s.number("batch_delay_ms")? {
            config.scheduler.batch_delay_ms = v;
        }
        if let Some(v) = s.positive("job_timeout_secs")? {
            config.scheduler.job_timeout_secs = v;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if v.contains('/') || v.contains('\\') {
                return Err(ConfigFileError::InvalidValue {
                    section: "logging".to_string(),
                    key: "file".to_string(),
                    value: v.to_string(),
                    reason: "must be a file name, not a path".to_string(),
                });
            }
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
    }

    Ok(config)
}

/// One INI section with its name, for error reporting.
struct Section<'a> {
    name: &'static str,
    props: &'a Properties,
}

impl<'a> Section<'a> {
    fn new(name: &'static str, props: &'a Properties) -> Self {
        Self { name, props }
    }

    fn invalid(&self, key: &str, value: &str, reason: &str) -> ConfigFileError {
        ConfigFileError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Reads a non-negative integer; empty values are treated as unset.
    fn number<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigFileError> {
        let Some(raw) = self.props.get(key) else {
            return Ok(None);
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<T>()
            .map(Some)
            .map_err(|_| self.invalid(key, raw, "must be a non-negative integer"))
    }

    /// Reads an integer that must be at least 1.
    fn positive<T: FromStr + Default + PartialEq>(
        &self,
        key: &str,
    ) -> Result<Option<T>, ConfigFileError> {
        match self.number::<T>(key)? {
            Some(v) if v == T::default() => {
                let raw = self.props.get(key).unwrap_or_default().trim();
                Err(self.invalid(key, raw, "must be at least 1"))
            }
            other => Ok(other),
        }
    }
}

/// Expand `~/` to the user's home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn load(content: &str) -> Result<ConfigFile, ConfigFileError> {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");
        std::fs::write(&config_path, content).unwrap();
        ConfigFile::load_from(&config_path)
    }

    #[test]
    fn test_overlays_values_on_defaults() {
        let config = load(
            r#"
[pool]
size = 3
max_reuse = 50

[scheduler]
batch_size = 4
batch_delay_ms = 0
"#,
        )
        .unwrap();

        assert_eq!(config.pool.size, 3);
        assert_eq!(config.pool.max_reuse, 50);
        assert_eq!(config.pool.acquire_timeout_ms, 5000);
        assert_eq!(config.scheduler.batch_size, 4);
        assert_eq!(config.scheduler.batch_delay_ms, 0);
        assert_eq!(config.queue, ConfigFile::default().queue);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = load(
            r#"
[queue]
max_size = 0
"#,
        )
        .unwrap_err();

        match err {
            ConfigFileError::InvalidValue {
                section, key, value, ..
            } => {
                assert_eq!(section, "queue");
                assert_eq!(key, "max_size");
                assert_eq!(value, "0");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_numeric_rejected() {
        let err = load(
            r#"
[rate_limit]
window_secs = one minute
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("rate_limit.window_secs"));
        assert!(err.to_string().contains("non-negative integer"));
    }

    #[test]
    fn test_negative_rejected() {
        assert!(load("[scheduler]\nmax_concurrent = -2\n").is_err());
    }

    #[test]
    fn test_empty_value_keeps_default() {
        let config = load("[pool]\nsize =\n").unwrap();
        assert_eq!(config.pool.size, 5);
    }

    #[test]
    fn test_log_file_must_be_a_name() {
        let err = load("[logging]\nfile = logs/out.log\n").unwrap_err();
        assert!(err.to_string().contains("logging.file"));
    }

    #[test]
    fn test_log_directory_expands_tilde() {
        let config = load("[logging]\ndirectory = /var/log/capframe\nfile = run.log\n").unwrap();
        assert_eq!(config.logging.directory, PathBuf::from("/var/log/capframe"));
        assert_eq!(config.logging.file, "run.log");
    }

    #[test]
    fn test_expand_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/logs"), home.join("logs"));
        }
        assert_eq!(expand_tilde("/tmp/logs"), PathBuf::from("/tmp/logs"));
        assert_eq!(expand_tilde("relative"), PathBuf::from("relative"));
    }
}
