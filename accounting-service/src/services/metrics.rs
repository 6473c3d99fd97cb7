//! Prometheus metrics for the accounting service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Journal entry posting counter.
pub static ENTRIES_POSTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "accounting_entries_posted_total",
        "Total number of journal entries posted",
        &["status"] // ok, rejected, error
    )
    .expect("Failed to register entries_posted_total")
});

/// Document counter by type.
pub static DOCUMENTS_CREATED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "accounting_documents_created_total",
        "Total number of documents created",
        &["doc_type"]
    )
    .expect("Failed to register documents_created_total")
});

/// Documents swept into the ledger.
pub static DOCUMENTS_POSTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "accounting_documents_posted_total",
        "Total number of documents posted to the ledger",
        &["doc_type"]
    )
    .expect("Failed to register documents_posted_total")
});

/// Report computation duration histogram.
pub static REPORT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "accounting_report_duration_seconds",
        "Report computation duration in seconds",
        &["report"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .expect("Failed to register report_duration")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "accounting_errors_total",
        "Total number of errors by kind",
        &["error_kind"]
    )
    .expect("Failed to register errors_total")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&ENTRIES_POSTED_TOTAL);
    Lazy::force(&DOCUMENTS_CREATED_TOTAL);
    Lazy::force(&DOCUMENTS_POSTED_TOTAL);
    Lazy::force(&REPORT_DURATION);
    Lazy::force(&ERRORS_TOTAL);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
