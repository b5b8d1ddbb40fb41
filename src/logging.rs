//! Logging setup and phase timing.

use std::path::Path;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::error::{PreprocessError, Result};

/// Initialize structured logging.
///
/// `RUST_LOG` wins over `log_level`. When `log_file` is given, a daily
/// rolling file layer is added next to it; keep the returned guard alive
/// for as long as the file should receive events.
pub fn init_logging(log_level: Option<&str>, log_file: Option<&Path>, json: bool) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.unwrap_or("info")))
        .map_err(|e| PreprocessError::InvalidConfig(format!("Failed to create log filter: {e}")))?;

    let console_layer = if json {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .json()
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true)
            .with_thread_names(true)
            .boxed()
    };

    let registry = Registry::default().with(env_filter).with(console_layer);

    let guard = if let Some(log_path) = log_file {
        let directory = log_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let file_name = log_path
            .file_name()
            .map_or_else(|| "memoria-imessage.log".into(), |n| n.to_string_lossy().into_owned());
        let (writer, guard) = non_blocking(rolling::daily(directory, file_name));

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true);
        let file_layer = if json { file_layer.json().boxed() } else { file_layer.boxed() };

        registry
            .with(file_layer)
            .try_init()
            .map_err(|e| PreprocessError::Logging(format!("Failed to install subscriber: {e}")))?;
        Some(guard)
    } else {
        registry
            .try_init()
            .map_err(|e| PreprocessError::Logging(format!("Failed to install subscriber: {e}")))?;
        None
    };

    info!("Logging system initialized");
    Ok(guard)
}

/// Logs how long a pipeline phase took.
pub struct OperationTimer {
    operation: String,
    start: std::time::Instant,
    finished: bool,
}

impl OperationTimer {
    /// Start timing `operation`
    #[must_use]
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: std::time::Instant::now(),
            finished: false,
        }
    }

    /// Stop the timer and log the duration in milliseconds.
    pub fn finish(mut self) -> u128 {
        self.finished = true;
        let duration = self.start.elapsed().as_millis();
        info!(operation = %self.operation, duration_ms = duration, "Operation completed");
        duration
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        if !self.finished && !std::thread::panicking() {
            tracing::debug!(
                operation = %self.operation,
                duration_ms = self.start.elapsed().as_millis(),
                "Operation abandoned"
            );
        }
    }
}
