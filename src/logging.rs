//! Log bootstrap
//!
//! Installs the global subscriber: level filter from `--log_level`, a
//! non-blocking rolling file appender rooted at `--log_path` (daily
//! rotation, 3 retained files), records carrying timestamp, level, target
//! with file:line, and thread id.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::EnvFilter;

/// How many rotated log files to keep.
const RETAINED_LOG_FILES: usize = 3;

/// Install the global subscriber writing to a rolling file under
/// `log_path`. The returned guard must stay alive for the process
/// lifetime or buffered records are lost.
pub fn init(log_path: &Path, log_level: &str) -> anyhow::Result<WorkerGuard> {
    let directory = match log_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = log_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "gridcast.log".to_string());

    let appender = rolling::Builder::new()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix(file_name)
        .max_log_files(RETAINED_LOG_FILES)
        .build(directory)
        .with_context(|| format!("creating log appender under {}", directory.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("invalid log level {log_level:?}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .init();

    Ok(guard)
}
