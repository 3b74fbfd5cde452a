//! Logging setup with a reloadable filter and daily log files.
//!
//! - Runtime log level changes via `tracing_subscriber::reload`
//! - Daily rolling log file next to console output
//! - Retention cleanup of old log files
//! - Local timezone timestamps

use chrono::{Local, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "restreamer=info,sqlx=warn,tower_http=info";

/// Log file name prefix; the appender adds `.YYYY-MM-DD`.
const LOG_FILE_PREFIX: &str = "restreamer.log";

/// Default log retention period in days.
pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 7;

/// How and where logs are written. Read before the rest of the configuration so
/// that configuration errors are logged too.
#[derive(Debug, Clone)]
pub struct LogSettings {
    pub dir: PathBuf,
    /// Rotated files older than this are deleted. `0` keeps everything.
    pub retention_days: u32,
    /// Write the log file as JSON lines instead of plain text.
    pub json_file: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(crate::config::DEFAULT_LOG_DIR),
            retention_days: DEFAULT_LOG_RETENTION_DAYS,
            json_file: false,
        }
    }
}

impl LogSettings {
    /// `LOG_DIR`, `LOG_RETENTION_DAYS` and `LOG_JSON`; unparsable values fall back
    /// to the defaults.
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        Self {
            dir: var("LOG_DIR").map(PathBuf::from).unwrap_or(defaults.dir),
            retention_days: var("LOG_RETENTION_DAYS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.retention_days),
            json_file: var("LOG_JSON")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.json_file),
        }
    }
}

/// Timer that prints timestamps in the server's local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Type alias for the reload handle.
pub type FilterHandle = Handle<EnvFilter, tracing_subscriber::Registry>;

/// Handle to the live logging configuration.
pub struct LoggingConfig {
    handle: FilterHandle,
    log_dir: PathBuf,
    retention_days: u32,
}

impl LoggingConfig {
    fn new(handle: FilterHandle, settings: &LogSettings) -> Self {
        Self {
            handle,
            log_dir: settings.dir.clone(),
            retention_days: settings.retention_days,
        }
    }

    /// Get the current filter directive string.
    pub fn get_filter(&self) -> String {
        self.handle
            .with_current(|filter| filter.to_string())
            .unwrap_or_default()
    }

    /// Set a new filter directive (e.g. "restreamer=debug,sqlx=warn").
    pub fn set_filter(&self, directive: &str) -> crate::Result<()> {
        let new_filter = EnvFilter::try_new(directive)
            .map_err(|e| crate::Error::validation(format!("Invalid filter directive: {}", e)))?;

        self.handle
            .reload(new_filter)
            .map_err(|e| crate::Error::Other(format!("Failed to reload filter: {}", e)))?;

        info!(directive = %directive, "Log filter updated");
        Ok(())
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Prune old log files now and then once a day until cancelled.
    pub fn start_retention_cleanup(self: &Arc<Self>, cancel_token: CancellationToken) {
        if self.retention_days == 0 {
            debug!("Log retention disabled");
            return;
        }
        let log_dir = self.log_dir.clone();
        let retention_days = i64::from(self.retention_days);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = cleanup_old_logs(&log_dir, retention_days).await {
                            warn!(error = %e, dir = %log_dir.display(), "Log retention cleanup failed");
                        }
                    }
                }
            }
            debug!("Log retention cleanup stopped");
        });
    }
}

/// Delete rotated log files older than `retention_days`.
async fn cleanup_old_logs(log_dir: &Path, retention_days: i64) -> std::io::Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days)).date_naive();
    let prefix = format!("{LOG_FILE_PREFIX}.");

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut deleted_count = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(date_str) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(prefix.as_str()))
        else {
            continue;
        };

        let Ok(file_date) = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
            continue;
        };

        if file_date < cutoff {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to delete old log file");
            } else {
                deleted_count += 1;
                debug!(path = %path.display(), "Deleted old log file");
            }
        }
    }

    if deleted_count > 0 {
        info!(count = deleted_count, "Cleaned up old log files");
    }

    Ok(deleted_count)
}

/// Initialize logging.
///
/// Returns the live config and the file writer guard; keep the guard alive for
/// the lifetime of the process or buffered lines are lost.
pub fn init_logging(settings: &LogSettings) -> crate::Result<(Arc<LoggingConfig>, WorkerGuard)> {
    std::fs::create_dir_all(&settings.dir)?;

    let file_appender = tracing_appender::rolling::daily(&settings.dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let initial_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (filter_layer, filter_handle) = reload::Layer::new(initial_filter);

    // Exactly one of the two file layers is active.
    let (text_file, json_file) = if settings.json_file {
        let layer = fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_timer(LocalTimer);
        (None, Some(layer))
    } else {
        let layer = fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_timer(LocalTimer);
        (Some(layer), None)
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(text_file)
        .with(json_file)
        .try_init()
        .map_err(|e| crate::Error::Other(format!("Failed to install log subscriber: {}", e)))?;

    Ok((Arc::new(LoggingConfig::new(filter_handle, settings)), guard))
}

/// Log targets worth tuning, for the logging API.
pub fn available_modules() -> Vec<(&'static str, &'static str)> {
    vec![
        ("restreamer", "Main application"),
        ("restreamer::reconciler", "Start/stop decisions and batch outcomes"),
        ("restreamer::pipeline", "Encoding service calls"),
        ("restreamer::source", "Upstream source probing"),
        ("sqlx", "Database queries"),
        ("reqwest", "HTTP requests"),
        ("tower_http", "HTTP middleware"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("restreamer=info"));
        assert!(DEFAULT_LOG_FILTER.contains("sqlx=warn"));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = LogSettings::default();
        assert_eq!(settings.dir, PathBuf::from("logs"));
        assert_eq!(settings.retention_days, 7);
        assert!(!settings.json_file);
    }

    #[test]
    fn test_available_modules() {
        let modules = available_modules();
        assert!(modules.iter().any(|(name, _)| *name == "restreamer"));
    }

    #[tokio::test]
    async fn test_cleanup_old_logs() {
        let dir = tempfile::tempdir().unwrap();
        let old = (Utc::now() - chrono::Duration::days(30)).format("%Y-%m-%d");
        let fresh = Utc::now().format("%Y-%m-%d");

        let old_file = dir.path().join(format!("{LOG_FILE_PREFIX}.{old}"));
        let fresh_file = dir.path().join(format!("{LOG_FILE_PREFIX}.{fresh}"));
        let unrelated = dir.path().join("notes.txt");
        for path in [&old_file, &fresh_file, &unrelated] {
            std::fs::write(path, b"x").unwrap();
        }

        let deleted = cleanup_old_logs(dir.path(), i64::from(DEFAULT_LOG_RETENTION_DAYS))
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert!(!old_file.exists());
        assert!(fresh_file.exists());
        assert!(unrelated.exists());
    }
}
