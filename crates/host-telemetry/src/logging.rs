//! Logging setup: env filter, console layer (pretty or JSON) and an
//! optional daily rolling file.

use std::fs;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

use crate::{TelemetryConfig, TelemetryError};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Keeps the file writer flushing. Hold it for the life of the process.
pub struct TelemetryGuard {
    _file: Option<WorkerGuard>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

/// Install the global subscriber.
///
/// Fails when a global subscriber is already installed.
pub fn init_logging(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let env_filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::Config(e.to_string()))?;

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.console_output {
        if config.json_logs {
            layers.push(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .boxed(),
            );
        } else {
            layers.push(
                fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_ansi(true)
                    .boxed(),
            );
        }
    }

    let file_guard = match &config.log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
            let appender =
                RollingFileAppender::new(Rotation::DAILY, dir, config.log_file_prefix());
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_names(true)
                    .with_file(true)
                    .with_line_number(true)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    tracing::info!(
        service = %config.service_name,
        level = %config.log_level,
        json = config.json_logs,
        log_dir = ?config.log_dir,
        "Logging initialized"
    );

    Ok(TelemetryGuard { _file: file_guard })
}
