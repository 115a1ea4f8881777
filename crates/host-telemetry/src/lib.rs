//! # Host Telemetry
//!
//! Structured logging and Prometheus metrics for the content host.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use host_telemetry::{init_logging, register_metrics, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&TelemetryConfig::from_env())?;
//!     register_metrics()?;
//!     // ...
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `CH_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `CH_JSON_LOGS` | `false` | JSON console output |
//! | `CH_LOG_DIR` | unset | Directory for a daily rolling log file |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, TelemetryGuard};
pub use metrics::{gather_text, register_metrics};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
