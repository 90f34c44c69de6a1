//! Tracing subscriber setup.
//!
//! Logs go to stderr by default so they never interleave with split output
//! on stdout. With `[log] file` set they go to a daily-rolling file instead.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::{LogConfig, paths};

/// Environment variable that overrides `[log] level`.
pub const LOG_ENV: &str = "SLUICE_LOG";

/// Installs the global subscriber.
///
/// Returns the file writer guard when logging to a file; keep it alive
/// until exit so buffered lines are flushed.
///
/// # Errors
/// Returns an error if the filter is invalid, the log directory cannot be
/// created, or a global subscriber is already installed.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(config)?;

    let Some(file) = &config.file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {e}"))?;
        return Ok(None);
    };

    let path = resolve_log_path(&paths::sluice_home(), file);
    let (dir, file_name) = split_log_path(&path)?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::daily(&dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {e}"))?;
    Ok(Some(guard))
}

fn build_filter(config: &LogConfig) -> Result<EnvFilter> {
    filter_from(std::env::var(LOG_ENV).ok().as_deref(), &config.level)
}

/// `env_directives` wins over the configured level when present.
fn filter_from(env_directives: Option<&str>, level: &str) -> Result<EnvFilter> {
    if let Some(directives) = env_directives {
        return EnvFilter::try_new(directives)
            .with_context(|| format!("Invalid {LOG_ENV} filter: {directives}"));
    }
    EnvFilter::try_new(level).with_context(|| format!("Invalid log level in config: {level}"))
}

/// Resolves a configured log path; relative paths land under `home`.
fn resolve_log_path(home: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        home.join(path)
    }
}

fn split_log_path(path: &Path) -> Result<(PathBuf, String)> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Log path has no file name: {}", path.display()))?
        .to_string();
    let dir = path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    Ok((dir, file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_log_path_resolves_under_home() {
        let home = Path::new("/tmp/sluice-home");
        assert_eq!(
            resolve_log_path(home, "logs/sluice.log"),
            PathBuf::from("/tmp/sluice-home/logs/sluice.log")
        );
    }

    #[test]
    fn test_absolute_log_path_is_kept() {
        let home = Path::new("/tmp/sluice-home");
        assert_eq!(
            resolve_log_path(home, "/var/log/sluice.log"),
            PathBuf::from("/var/log/sluice.log")
        );
    }

    #[test]
    fn test_split_log_path() {
        let (dir, name) = split_log_path(Path::new("/tmp/logs/sluice.log")).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/logs"));
        assert_eq!(name, "sluice.log");
        assert!(split_log_path(Path::new("/")).is_err());
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        let err = filter_from(None, "sluice_core=notalevel").unwrap_err();
        assert!(err.to_string().contains("Invalid log level in config"));
    }

    #[test]
    fn test_env_directives_override_level() {
        assert!(filter_from(Some("debug"), "sluice_core=notalevel").is_ok());

        let err = filter_from(Some("sluice_core=notalevel"), "warn").unwrap_err();
        assert!(err.to_string().contains(LOG_ENV));
    }
}
