//! Logging system configuration and initialization
//!
//! - Console output and an optional log file (plain text or JSON lines)
//! - `RUST_LOG` overrides the configured level
//! - A log file left over from the previous run is renamed with its
//!   timestamp, and only the newest `max_files` rotated files are kept

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the non-blocking file writer alive; dropping it flushes the file
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Level directive after applying `-v` flags on top of the configured level
pub fn effective_level(configured: &str, verbosity: u8) -> String {
    match verbosity {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

fn build_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(level)
        .with_context(|| format!("Invalid log level '{level}'"))?;

    // HTTP stack internals stay quiet unless tracing everything
    if !level.to_lowercase().contains("trace") {
        for directive in ["reqwest=info", "hyper=warn", "hyper_util=warn", "h2=warn", "html5ever=warn", "selectors=warn"] {
            filter = filter.add_directive(
                directive
                    .parse()
                    .with_context(|| format!("Invalid log directive '{directive}'"))?,
            );
        }
    }
    Ok(filter)
}

/// Install the global subscriber.
///
/// Call once at start-up and hold the returned guard until shutdown.
pub fn init_logging(config: &LoggingConfig, verbosity: u8) -> Result<LoggingGuard> {
    if !config.console_output && !config.file_output {
        return Err(anyhow!("No logging output configured"));
    }

    let level = effective_level(&config.level, verbosity);
    let filter = build_filter(&level)?;
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut file_guard = None;
    let mut log_file = None;

    if config.file_output {
        std::fs::create_dir_all(&config.log_dir).with_context(|| {
            format!("Failed to create log directory {}", config.log_dir.display())
        })?;
        rotate_existing_log_file(&config.log_dir, &config.file_name)?;
        cleanup_old_logs(&config.log_dir, &config.file_name, config.max_files)?;

        let (writer, guard) = non_blocking(rolling::never(&config.log_dir, &config.file_name));
        file_guard = Some(guard);
        log_file = Some(config.log_dir.join(&config.file_name));

        let file_layer = if config.json_format {
            fmt::Layer::new()
                .json()
                .with_writer(writer)
                .with_timer(LocalTimeFormatter)
                .with_target(true)
                .with_ansi(false)
                .boxed()
        } else {
            fmt::Layer::new()
                .with_writer(writer)
                .with_timer(LocalTimeFormatter)
                .with_target(false)
                .with_ansi(false)
                .boxed()
        };
        layers.push(file_layer);
    }

    if config.console_output {
        layers.push(
            fmt::Layer::new()
                .with_writer(std::io::stdout)
                .with_timer(LocalTimeFormatter)
                .with_target(false)
                .boxed(),
        );
    }

    Registry::default()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))?;

    info!(level = %level, json = config.json_format, log_file = ?log_file, "Logging system initialized");

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Rename an existing log file to `<stem>.<timestamp>.log`
fn rotate_existing_log_file(log_dir: &Path, file_name: &str) -> Result<Option<PathBuf>> {
    let current = log_dir.join(file_name);
    if !current.exists() {
        return Ok(None);
    }

    let metadata = std::fs::metadata(&current)
        .with_context(|| format!("Failed to read metadata of {}", current.display()))?;
    let file_time = metadata
        .modified()
        .or_else(|_| metadata.created())
        .unwrap_or_else(|_| std::time::SystemTime::now());
    let stamp = chrono::DateTime::<Local>::from(file_time).format("%Y%m%dT%H%M%S");

    let stem = file_name.trim_end_matches(".log");
    let rotated = log_dir.join(format!("{stem}.{stamp}.log"));
    std::fs::rename(&current, &rotated).with_context(|| {
        format!("Failed to rotate log file {} to {}", current.display(), rotated.display())
    })?;
    Ok(Some(rotated))
}

/// Delete rotated files of `file_name` beyond the newest `max_files`
fn cleanup_old_logs(log_dir: &Path, file_name: &str, max_files: u32) -> Result<usize> {
    let stem = file_name.trim_end_matches(".log");
    let prefix = format!("{stem}.");

    let mut rotated: Vec<PathBuf> = std::fs::read_dir(log_dir)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with(&prefix) && name.ends_with(".log") && name != file_name)
                .unwrap_or(false)
        })
        .collect();

    // timestamps sort lexically; newest first
    rotated.sort_by(|a, b| b.cmp(a));

    let mut removed = 0;
    for path in rotated.iter().skip(max_files as usize) {
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove old log file {:?}: {}", path, e),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_the_level() {
        assert_eq!(effective_level("warn", 0), "warn");
        assert_eq!(effective_level("warn", 1), "debug");
        assert_eq!(effective_level("warn", 3), "trace");
    }

    #[test]
    fn existing_log_is_rotated_aside() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scraping.log"), "previous run").unwrap();

        let rotated = rotate_existing_log_file(dir.path(), "scraping.log").unwrap().unwrap();

        assert!(!dir.path().join("scraping.log").exists());
        let name = rotated.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("scraping.") && name.ends_with(".log"));
        assert_eq!(std::fs::read_to_string(rotated).unwrap(), "previous run");
    }

    #[test]
    fn missing_log_is_not_rotated() {
        let dir = tempfile::tempdir().unwrap();
        assert!(rotate_existing_log_file(dir.path(), "scraping.log").unwrap().is_none());
    }

    #[test]
    fn cleanup_keeps_only_newest_rotated_files() {
        let dir = tempfile::tempdir().unwrap();
        for stamp in ["20240101T000000", "20240102T000000", "20240103T000000"] {
            std::fs::write(dir.path().join(format!("scraping.{stamp}.log")), stamp).unwrap();
        }
        std::fs::write(dir.path().join("unrelated.log"), "keep").unwrap();

        let removed = cleanup_old_logs(dir.path(), "scraping.log", 2).unwrap();

        assert_eq!(removed, 1);
        assert!(!dir.path().join("scraping.20240101T000000.log").exists());
        assert!(dir.path().join("scraping.20240103T000000.log").exists());
        assert!(dir.path().join("unrelated.log").exists());
    }
}
