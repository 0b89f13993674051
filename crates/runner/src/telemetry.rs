use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "deckmail_runner=info,deckmail_engine=info,deckmail_notifier=info";

/// Initialize JSON tracing to stdout, or appended to `log_file` when given.
///
/// File output goes through a background writer; keep the returned guard
/// alive until the process exits so buffered lines are flushed.
pub fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).json();

    let Some(path) = log_file else {
        builder.init();
        return Ok(None);
    };

    let (dir, file_name) = split_log_path(path)?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    // A scheduled job appends to one file; rotation is left to logrotate.
    let (writer, guard) = non_blocking(rolling::never(dir, file_name));
    builder.with_writer(writer).with_ansi(false).init();

    Ok(Some(guard))
}

/// Split `LOG_FILE` into the directory and file name the appender expects.
/// A bare file name logs into the working directory.
fn split_log_path(path: &Path) -> anyhow::Result<(&Path, &Path)> {
    let file_name = path
        .file_name()
        .map(Path::new)
        .with_context(|| format!("LOG_FILE has no file name: {}", path.display()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok((dir, file_name))
}
