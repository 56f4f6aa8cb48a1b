//! Prometheus metrics for transaction-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, Encoder,
    HistogramVec, IntGauge, TextEncoder,
};

/// Histogram for database query duration by operation.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "transaction_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for snapshot refreshes by outcome.
pub static CACHE_REFRESHES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "transaction_cache_refreshes_total",
        "Total number of snapshot cache refreshes",
        &["trigger", "status"]
    )
    .expect("Failed to register CACHE_REFRESHES")
});

/// Gauge for the row count of the published snapshot.
pub static CACHE_ROWS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "transaction_cache_rows",
        "Row count of the currently published snapshot"
    )
    .expect("Failed to register CACHE_ROWS")
});

/// Counter for stale-snapshot reads (previous snapshot served after a
/// failed reload).
pub static CACHE_STALE_READS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "transaction_cache_stale_reads_total",
        "Reads served from a stale snapshot after a refresh failure",
        &["reason"]
    )
    .expect("Failed to register CACHE_STALE_READS")
});

/// Counter for duplicate checks by outcome.
pub static DUPLICATE_CHECKS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "transaction_duplicate_checks_total",
        "Total number of import duplicate checks",
        &["outcome"]
    )
    .expect("Failed to register DUPLICATE_CHECKS")
});

/// Counter for import decisions.
pub static IMPORT_DECISIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "transaction_import_decisions_total",
        "Total number of resolved duplicate-import decisions",
        &["decision"]
    )
    .expect("Failed to register IMPORT_DECISIONS")
});

/// Counter for artifact cleanup operations.
pub static CLEANUP_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "transaction_cleanup_operations_total",
        "Total number of artifact cleanup operations",
        &["outcome"]
    )
    .expect("Failed to register CLEANUP_OPERATIONS")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "transaction_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&CACHE_REFRESHES);
    Lazy::force(&CACHE_ROWS);
    Lazy::force(&CACHE_STALE_READS);
    Lazy::force(&DUPLICATE_CHECKS);
    Lazy::force(&IMPORT_DECISIONS);
    Lazy::force(&CLEANUP_OPERATIONS);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => String::from_utf8(buffer).unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode metrics");
            String::new()
        }
    }
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}

/// Record a cache refresh.
pub fn record_cache_refresh(trigger: &str, status: &str) {
    CACHE_REFRESHES.with_label_values(&[trigger, status]).inc();
}

/// Record a duplicate check outcome.
pub fn record_duplicate_check(outcome: &str) {
    DUPLICATE_CHECKS.with_label_values(&[outcome]).inc();
}

/// Record a resolved import decision.
pub fn record_import_decision(decision: &str) {
    IMPORT_DECISIONS.with_label_values(&[decision]).inc();
}

/// Record an artifact cleanup outcome.
pub fn record_cleanup(outcome: &str) {
    CLEANUP_OPERATIONS.with_label_values(&[outcome]).inc();
}
