// SPDX-License-Identifier: MIT

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Initialize `tracing-subscriber` from the log-level input, optionally
/// adding a rolling file writer under `log_dir` via `tracing-appender`.
///
/// The returned [`WorkerGuard`] must be kept alive for the life of the
/// process; dropping it flushes and detaches the non-blocking file writer.
pub fn init(log_level: Option<&str>, log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = match log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "apsviz-supervisor.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(non_blocking)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}
