use std::fs;
use std::time::{Duration, SystemTime};

use camino::{Utf8Path, Utf8PathBuf};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LOG_PREFIX: &str = "cachewarden";
const DEFAULT_FILTER: &str = "cachewarden=info,cw_content=info";

/// Install the stderr and daily rolling file layers.
///
/// `RUST_LOG` overrides the default filter. The returned guard must be held
/// until exit so buffered file output is flushed.
pub fn init_logging(log_dir: Option<Utf8PathBuf>) -> (Option<WorkerGuard>, Option<Utf8PathBuf>) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_guard, file_layer, log_path) = match log_dir {
        Some(log_dir) => match build_file_appender(&log_dir) {
            Ok(appender) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false);
                (Some(guard), Some(layer), Some(log_dir))
            }
            Err(e) => {
                eprintln!("Failed to set up file logging in {}: {}", log_dir, e);
                (None, None, None)
            }
        },
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    (file_guard, log_path)
}

fn build_file_appender(
    log_dir: &Utf8Path,
) -> Result<rolling::RollingFileAppender, Box<dyn std::error::Error>> {
    fs::create_dir_all(log_dir)?;
    let appender = rolling::RollingFileAppender::builder()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix("log")
        .build(log_dir)?;
    Ok(appender)
}

/// Delete dated log files older than `max_age_days` from the log directory.
pub fn cleanup_old_logs(log_dir: &Utf8Path, max_age_days: u64) {
    let max_age = Duration::from_secs(max_age_days * 24 * 60 * 60);

    let entries = match fs::read_dir(log_dir) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!("Failed to read log directory for cleanup: {}", e);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !is_rotated_log(file_name) {
            continue;
        }

        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        let Ok(age) = SystemTime::now().duration_since(modified) else {
            continue;
        };

        if age > max_age {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!("Failed to delete old log file {}: {}", path.display(), e);
            } else {
                tracing::debug!("Deleted old log file: {}", path.display());
            }
        }
    }
}

/// Matches `cachewarden.<date>.log`.
fn is_rotated_log(file_name: &str) -> bool {
    file_name.starts_with("cachewarden.") && file_name.ends_with(".log")
}
