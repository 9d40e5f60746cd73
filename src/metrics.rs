//! Prometheus metrics for metasync.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, and records synchronization and query
//! outcomes.  With no recorder installed the `metrics` macros are no-ops.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

use crate::errors::SyncError;

// -- Metric name constants ----------------------------------------------------

/// Total synchronization cycles (counter). Labels: backend, status.
pub const SYNC_RUNS_TOTAL: &str = "metasync_sync_runs_total";

/// Synchronization cycle duration in seconds (histogram). Labels: backend.
pub const SYNC_DURATION_SECONDS: &str = "metasync_sync_duration_seconds";

/// Total buckets written by successful cycles (counter). Labels: backend.
pub const BUCKETS_SYNCED_TOTAL: &str = "metasync_buckets_synced_total";

/// Total objects written by successful cycles (counter). Labels: backend.
pub const OBJECTS_SYNCED_TOTAL: &str = "metasync_objects_synced_total";

/// Total metadata queries (counter). Labels: status.
pub const QUERIES_TOTAL: &str = "metasync_queries_total";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder and return its handle.
/// Later calls return the already-installed handle.
pub fn init_metrics() -> Result<&'static PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(SYNC_RUNS_TOTAL, "Total metadata synchronization cycles");
    describe_histogram!(
        SYNC_DURATION_SECONDS,
        "Metadata synchronization duration in seconds"
    );
    describe_counter!(BUCKETS_SYNCED_TOTAL, "Total buckets written to the store");
    describe_counter!(OBJECTS_SYNCED_TOTAL, "Total objects written to the store");
    describe_counter!(QUERIES_TOTAL, "Total metadata queries by outcome");
}

/// Render the current metrics in Prometheus exposition format, if the
/// recorder is installed.
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

// -- Recording helpers --------------------------------------------------------

/// Status label for an operation outcome: `ok` or the error's code.
pub fn status_label<T>(result: &Result<T, SyncError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    }
}

/// Record one finished synchronization cycle.
pub fn record_sync<T>(backend: &str, result: &Result<T, SyncError>, elapsed: Duration) {
    let backend = backend.to_string();
    counter!(SYNC_RUNS_TOTAL, "backend" => backend.clone(), "status" => status_label(result))
        .increment(1);
    histogram!(SYNC_DURATION_SECONDS, "backend" => backend).record(elapsed.as_secs_f64());
}

/// Record the size of a freshly stored aggregate.
pub fn record_aggregate(backend: &str, buckets: usize, objects: usize) {
    counter!(BUCKETS_SYNCED_TOTAL, "backend" => backend.to_string()).increment(buckets as u64);
    counter!(OBJECTS_SYNCED_TOTAL, "backend" => backend.to_string()).increment(objects as u64);
}

/// Record one metadata query.
pub fn record_query<T>(result: &Result<T, SyncError>) {
    counter!(QUERIES_TOTAL, "status" => status_label(result)).increment(1);
}

// -- Tests --------------------------------------------------------------------
