//! Prometheus metrics for bytevault.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`
//! and defines metric name constants.  The core records operation counters,
//! latencies, and storage gauges; the surrounding API layer calls [`render`]
//! to expose them on whatever endpoint it serves.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total storage operations (counter). Labels: operation, status.
pub const OPERATIONS_TOTAL: &str = "bytevault_operations_total";

/// Storage operation duration in seconds (histogram). Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "bytevault_operation_duration_seconds";

/// Total objects across all buckets (gauge).
pub const OBJECTS_TOTAL: &str = "bytevault_objects_total";

/// Total buckets (gauge).
pub const BUCKETS_TOTAL: &str = "bytevault_buckets_total";

/// Total payload bytes currently stored (gauge).
pub const BYTES_STORED: &str = "bytevault_bytes_stored";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times (e.g. in tests). Returns a reference to the global handle.
pub fn init_metrics() -> &'static PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder")
    })
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(OPERATIONS_TOTAL, "Total storage operations by type");
    describe_histogram!(
        OPERATION_DURATION_SECONDS,
        "Storage operation duration in seconds"
    );
    describe_gauge!(OBJECTS_TOTAL, "Total objects across all buckets");
    describe_gauge!(BUCKETS_TOTAL, "Total buckets");
    describe_gauge!(BYTES_STORED, "Total payload bytes currently stored");
}

/// Render the Prometheus exposition format text, if the recorder is
/// installed.  Returns `None` when metrics were never initialized.
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

// -- Recording helpers --------------------------------------------------------

/// Record one completed operation: a counter by status and a latency sample.
pub(crate) fn record_operation(operation: &'static str, status: &'static str, started: Instant) {
    counter!(OPERATIONS_TOTAL, "operation" => operation, "status" => status).increment(1);
    histogram!(OPERATION_DURATION_SECONDS, "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}
