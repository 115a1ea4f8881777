//! Prometheus metrics for the lifecycle bus and its plugins.
//!
//! All metrics follow the naming convention: `ch_<area>_<metric>[_total]`

use lazy_static::lazy_static;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // BUS METRICS
    // =========================================================================

    /// Applied transitions
    pub static ref TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("ch_bus_transitions_total", "Lifecycle transitions applied"),
        &["bus", "from", "to"]
    ).expect("metric creation failed");

    /// Rejected transition requests
    pub static ref ILLEGAL_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("ch_bus_illegal_transitions_total", "Transition requests outside the table"),
        &["bus"]
    ).expect("metric creation failed");

    /// Handlers that returned an error or panicked
    pub static ref SUBSCRIBER_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("ch_bus_subscriber_failures_total", "Isolated subscriber failures"),
        &["bus", "channel"]
    ).expect("metric creation failed");

    /// Failures that moved a bus to ERROR
    pub static ref STARTUP_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("ch_bus_startup_failures_total", "Failures promoted to ERROR"),
        &["bus", "kind"]
    ).expect("metric creation failed");

    /// 1 while a listener is bound
    pub static ref BOUND_LISTENERS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("ch_bus_bound_listeners", "Listeners currently bound"),
        &["bus", "role"]
    ).expect("metric creation failed");

    // =========================================================================
    // WORKER METRICS
    // =========================================================================

    /// Jobs finished, by outcome (ok, failed, unknown_kind)
    pub static ref JOBS_PROCESSED: IntCounterVec = IntCounterVec::new(
        Opts::new("ch_worker_jobs_processed_total", "Jobs run by the worker pool"),
        &["outcome"]
    ).expect("metric creation failed");

    /// Jobs currently executing
    pub static ref JOBS_IN_FLIGHT: IntGauge = IntGauge::new(
        "ch_worker_jobs_in_flight",
        "Jobs currently executing"
    ).expect("metric creation failed");

    /// Shutdowns that gave up waiting for in-flight jobs
    pub static ref DRAIN_TIMEOUTS: IntCounter = IntCounter::new(
        "ch_worker_drain_timeouts_total",
        "Drains that hit their deadline"
    ).expect("metric creation failed");

    // =========================================================================
    // DISCOVERY METRICS
    // =========================================================================

    /// Discovery datagrams sent
    pub static ref ANNOUNCEMENTS_SENT: IntCounter = IntCounter::new(
        "ch_discovery_announcements_sent_total",
        "Discovery announcements sent"
    ).expect("metric creation failed");
}

/// Register all metrics with [`REGISTRY`]. Call once at startup.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Bus
        Box::new(TRANSITIONS.clone()),
        Box::new(ILLEGAL_TRANSITIONS.clone()),
        Box::new(SUBSCRIBER_FAILURES.clone()),
        Box::new(STARTUP_FAILURES.clone()),
        Box::new(BOUND_LISTENERS.clone()),
        // Workers
        Box::new(JOBS_PROCESSED.clone()),
        Box::new(JOBS_IN_FLIGHT.clone()),
        Box::new(DRAIN_TIMEOUTS.clone()),
        // Discovery
        Box::new(ANNOUNCEMENTS_SENT.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }
    Ok(())
}

/// Encode all registered metrics as Prometheus text format.
pub fn gather_text() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
