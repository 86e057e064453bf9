//! Prometheus metrics for fee-service.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

/// Recorder behind the `metrics` facade used by the HTTP middleware.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Payments appended, by mode and status.
pub static PAYMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fee_payments_total",
        "Total number of fee payments recorded",
        &["mode", "status"]
    )
    .expect("Failed to register fee_payments_total")
});

/// Settled amount in rupees, by mode.
pub static PAYMENT_AMOUNT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fee_payment_amount_total",
        "Total settled fee amount",
        &["mode"]
    )
    .expect("Failed to register fee_payment_amount_total")
});

/// Gateway calls by operation and outcome.
pub static GATEWAY_REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fee_gateway_requests_total",
        "Total number of payment gateway operations",
        &["operation", "status"]
    )
    .expect("Failed to register fee_gateway_requests_total")
});

/// Receipt downloads by requested and served format.
pub static RECEIPTS_RENDERED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fee_receipts_rendered_total",
        "Total number of receipts rendered",
        &["requested", "served"]
    )
    .expect("Failed to register fee_receipts_rendered_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "fee_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register fee_errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "fee_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register fee_db_query_duration")
});

/// Install the HTTP recorder and force the service metrics. Safe to call
/// more than once in a process.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_none() {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(e) => tracing::debug!(error = %e, "Prometheus recorder already installed"),
        }
    }

    Lazy::force(&PAYMENTS_TOTAL);
    Lazy::force(&PAYMENT_AMOUNT_TOTAL);
    Lazy::force(&GATEWAY_REQUESTS_TOTAL);
    Lazy::force(&RECEIPTS_RENDERED_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    output.push_str(&encoder.encode_to_string(&metric_families).unwrap_or_default());
    output
}

pub fn record_payment(mode: &str, status: &str, amount: f64) {
    PAYMENTS_TOTAL.with_label_values(&[mode, status]).inc();
    if status == "success" {
        PAYMENT_AMOUNT_TOTAL.with_label_values(&[mode]).inc_by(amount);
    }
}

pub fn record_gateway(operation: &str, ok: bool) {
    GATEWAY_REQUESTS_TOTAL
        .with_label_values(&[operation, if ok { "ok" } else { "error" }])
        .inc();
}

pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}
