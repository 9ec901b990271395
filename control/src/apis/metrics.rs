//! Controller metrics
//!
//! Recorded into a private registry; there is no scrape endpoint, the text
//! encoding is only gathered by tests and diagnostics.

use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    /// Controller metrics registry
    pub static ref CONTROLLER_METRICS_REGISTRY: Registry = Registry::new();

    /// Sync pass duration
    static ref SYNC_DURATION: HistogramVec = {
        let opts = HistogramOpts::new(
            "rauta_sync_duration_seconds",
            "Reconciliation pass duration in seconds",
        );
        let histogram = HistogramVec::new(opts, &["kind"])
            .expect("Failed to create histogram");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(histogram.clone()))
            .expect("Failed to register histogram");
        histogram
    };

    /// Sync passes total
    static ref SYNC_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "rauta_sync_total",
            "Total number of reconciliation passes",
        );
        let counter = IntCounterVec::new(opts, &["kind", "result"])
            .expect("Failed to create counter");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };

    /// Mutations issued against the backing store
    static ref APPLY_OPERATIONS_TOTAL: IntCounterVec = {
        let opts = Opts::new(
            "rauta_apply_operations_total",
            "Total number of create/update/delete calls issued by the driver",
        );
        let counter = IntCounterVec::new(opts, &["kind", "operation"])
            .expect("Failed to create counter");
        CONTROLLER_METRICS_REGISTRY
            .register(Box::new(counter.clone()))
            .expect("Failed to register counter");
        counter
    };
}

/// Record a finished sync pass (`kind` is `full` or `edges`)
pub fn record_sync(kind: &str, duration_secs: f64, result: &str) {
    SYNC_DURATION
        .with_label_values(&[kind])
        .observe(duration_secs);

    SYNC_TOTAL.with_label_values(&[kind, result]).inc();
}

/// Record one successful mutation
pub fn record_apply(kind: &str, operation: &str) {
    APPLY_OPERATIONS_TOTAL
        .with_label_values(&[kind, operation])
        .inc();
}

/// Gather controller metrics
pub fn gather_controller_metrics() -> Result<String, String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = CONTROLLER_METRICS_REGISTRY.gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Failed to convert to UTF-8: {}", e))
}
