//! Tracing/logging initialization.

use crate::config::AppConfig;
use crate::error::Result;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Where log lines go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// stderr, or the configured file
    Console,
    /// Terminal is owned by the TUI: file only, nothing when no file is set
    FileOnly,
}

/// Initialize tracing for the process.
///
/// `RUST_LOG` wins over the configured filter. Safe to call multiple times;
/// later calls are no-ops.
pub fn init(config: &AppConfig, target: LogTarget) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    match (&config.log_file, target) {
        (Some(path), _) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        (None, LogTarget::Console) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
        (None, LogTarget::FileOnly) => {}
    }

    Ok(())
}
