//! Telemetry configuration from environment variables.

use std::env;
use std::path::PathBuf;

/// Configuration for logging.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to file log names
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or a full
    /// `EnvFilter` directive
    pub log_level: String,

    /// Whether to enable console output
    pub console_output: bool,

    /// Whether console output is JSON
    pub json_logs: bool,

    /// Directory for a daily rolling log file, if any
    pub log_dir: Option<PathBuf>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "content-host".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            log_dir: None,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CH_SERVICE_NAME`: Service name (default: content-host)
    /// - `CH_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `CH_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `CH_JSON_LOGS`: Enable JSON logs (default: false)
    /// - `CH_LOG_DIR`: Rolling log file directory (default: none)
    pub fn from_env() -> Self {
        Self {
            service_name: env::var("CH_SERVICE_NAME")
                .unwrap_or_else(|_| "content-host".to_string()),

            log_level: env::var("CH_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("CH_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),

            json_logs: env::var("CH_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),

            log_dir: env::var_os("CH_LOG_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    /// File name prefix of the rolling log.
    pub fn log_file_prefix(&self) -> String {
        format!("{}.log", self.service_name)
    }
}
