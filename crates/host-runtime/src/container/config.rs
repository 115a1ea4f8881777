//! # Host Configuration
//!
//! Defaults match a phone install: both content servers on ephemeral
//! loopback ports, zero-config announcing on, two job workers.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `CH_PORT` | `server.port` |
//! | `CH_ZIP_PORT` | `server.zip_port` |
//! | `CH_BIND_HOST` | `server.bind_host` |
//! | `CH_ZEROCONF` | `server.zeroconf` |
//! | `CH_WORKERS` | `worker.workers` |
//! | `CH_DRAIN_DEADLINE_SECS` | `bus.drain_deadline` |
//! | `CH_STARTUP_TIMEOUT_SECS` | `bus.startup_timeout` |
//! | `CH_HOME` | `paths.home` |

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use ch_02_process_bus::BusConfig;
use thiserror::Error;

/// Complete host configuration.
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    pub server: ServerConfig,
    pub worker: WorkerConfig,
    pub bus: BusConfig,
    pub paths: PathsConfig,
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}={value:?} is not a valid value")]
    InvalidValue { var: &'static str, value: String },

    #[error("at least one job worker is required")]
    NoWorkers,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("content server and zip content server both configured for port {0}")]
    PortClash(u16),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 0 = ephemeral.
    pub port: u16,
    /// 0 = ephemeral.
    pub zip_port: u16,
    pub bind_host: IpAddr,
    /// Announce the server on the local network.
    pub zeroconf: bool,
    /// Page opened on first SERVING when no path was saved.
    pub initialize_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            zip_port: 0,
            bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            zeroconf: true,
            initialize_path: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub workers: usize,
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// Everything the host writes lives under here.
    pub home: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            home: PathBuf::from("./content-home"),
        }
    }
}

impl PathsConfig {
    #[must_use]
    pub fn content_root(&self) -> PathBuf {
        self.home.join("content")
    }

    #[must_use]
    pub fn zip_content_root(&self) -> PathBuf {
        self.home.join("content").join("zip")
    }

    #[must_use]
    pub fn store_file(&self) -> PathBuf {
        self.home.join("host_store.json")
    }

    #[must_use]
    pub fn jobs_file(&self) -> PathBuf {
        self.home.join("jobs.json")
    }

    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.home.join(".lock")
    }
}

impl HostConfig {
    /// Defaults overridden by `CH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(port) = parse(&lookup, "CH_PORT")? {
            config.server.port = port;
        }
        if let Some(port) = parse(&lookup, "CH_ZIP_PORT")? {
            config.server.zip_port = port;
        }
        if let Some(host) = parse(&lookup, "CH_BIND_HOST")? {
            config.server.bind_host = host;
        }
        if let Some(value) = lookup("CH_ZEROCONF") {
            config.server.zeroconf = parse_flag("CH_ZEROCONF", &value)?;
        }
        if let Some(workers) = parse(&lookup, "CH_WORKERS")? {
            config.worker.workers = workers;
        }
        if let Some(secs) = parse::<u64>(&lookup, "CH_DRAIN_DEADLINE_SECS")? {
            config.bus.drain_deadline = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(&lookup, "CH_STARTUP_TIMEOUT_SECS")? {
            config.bus.startup_timeout = Duration::from_secs(secs);
        }
        if let Some(home) = lookup("CH_HOME") {
            config.paths.home = PathBuf::from(home);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.bus.drain_deadline.is_zero() {
            return Err(ConfigError::ZeroDuration("drain deadline"));
        }
        if self.bus.startup_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration("startup timeout"));
        }
        if self.server.port != 0 && self.server.port == self.server.zip_port {
            return Err(ConfigError::PortClash(self.server.port));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { var, value })
        })
        .transpose()
}

fn parse_flag(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: value.to_string(),
        }),
    }
}
