use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE: &str = "game-presence.log";
const KEEP_LOG_DAYS: u64 = 7;
const DEFAULT_FILTER: &str = "info,hyper=warn,reqwest=warn";

/// Install console and daily-rolling file logging.
///
/// `RUST_LOG` wins over `filter`. Keep the returned guard alive for as long
/// as log lines should reach the file.
pub fn init_logging(log_dir: Option<PathBuf>, filter: Option<&str>) -> WorkerGuard {
    let log_dir = log_dir.unwrap_or_else(default_log_directory);
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory: {}", e);
    }

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter.unwrap_or(DEFAULT_FILTER)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::info!("Logging initialized, log directory: {}", log_dir.display());
    tracing::info!("game-presence version: {}", env!("CARGO_PKG_VERSION"));

    let cutoff = SystemTime::now() - Duration::from_secs(KEEP_LOG_DAYS * 24 * 60 * 60);
    let removed = cleanup_old_logs(&log_dir, cutoff);
    if removed > 0 {
        tracing::debug!("Removed {} old log file(s)", removed);
    }

    guard
}

fn default_log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("game-presence")
        .join("logs")
}

/// Delete rotated log files last modified before `cutoff`; the live file stays
fn cleanup_old_logs(log_dir: &Path, cutoff: SystemTime) -> usize {
    let entries = match std::fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Failed to read log directory for cleanup: {}", e);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();

        match path.file_name().and_then(|n| n.to_str()) {
            Some(name) if name.starts_with(LOG_FILE) && name != LOG_FILE => {}
            _ => continue,
        }

        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => continue,
        };

        if modified < cutoff {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!("Failed to remove old log file {:?}: {}", path, e);
            } else {
                removed += 1;
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_removes_only_rotated_logs() {
        let dir = std::env::temp_dir().join(format!("game-presence-logs-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in [LOG_FILE, "game-presence.log.2020-01-01", "notes.txt"] {
            std::fs::write(dir.join(name), "line").unwrap();
        }

        let later = SystemTime::now() + Duration::from_secs(60);
        assert_eq!(cleanup_old_logs(&dir, later), 1);
        assert!(dir.join(LOG_FILE).exists());
        assert!(dir.join("notes.txt").exists());
        assert!(!dir.join("game-presence.log.2020-01-01").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn cleanup_keeps_recent_logs() {
        let dir = std::env::temp_dir().join(format!("game-presence-recent-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("game-presence.log.2020-01-02"), "line").unwrap();

        let earlier = SystemTime::now() - Duration::from_secs(60);
        assert_eq!(cleanup_old_logs(&dir, earlier), 0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_directory_is_not_an_error() {
        let dir = std::env::temp_dir().join("game-presence-does-not-exist");
        assert_eq!(cleanup_old_logs(&dir, SystemTime::now()), 0);
    }
}
