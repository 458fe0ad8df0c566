use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus exporter
///
/// Fails if a recorder is already installed (e.g. twice in one process).
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    init_metric_descriptions();

    Ok(handle)
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!("power_samples_total", "Samples offered to the write queue");
    describe_gauge!("power_queue_depth", "Records waiting for the next flush");
    describe_counter!("power_rows_flushed_total", "Rows appended to the log file");
    describe_histogram!("power_flush_duration_seconds", "Flush duration in seconds");
    describe_counter!("power_flush_errors_total", "Failed flush attempts");
    describe_counter!("power_queries_total", "History queries by outcome");
    describe_histogram!("power_lock_wait_seconds", "Time spent waiting for the store lock");
    describe_gauge!("power_live_subscribers", "Connected live event subscribers");
    describe_gauge!("power_logger_info", "Logger version information");

    gauge!("power_logger_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record a sample offered to the queue
pub fn record_sample(accepted: bool) {
    let outcome = if accepted { "queued" } else { "dropped" };
    counter!("power_samples_total", "outcome" => outcome).increment(1);
}

pub fn set_queue_depth(depth: usize) {
    gauge!("power_queue_depth").set(depth as f64);
}

/// Record a completed flush
pub fn record_flush(rows: u64, duration: Duration) {
    counter!("power_rows_flushed_total").increment(rows);
    histogram!("power_flush_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_flush_error(kind: &'static str) {
    counter!("power_flush_errors_total", "kind" => kind).increment(1);
}

pub fn record_query(outcome: &'static str) {
    counter!("power_queries_total", "outcome" => outcome).increment(1);
}

/// Record how long an operation waited for a lock
pub fn record_lock_wait(resource: &'static str, operation: &'static str, waited: Duration) {
    histogram!(
        "power_lock_wait_seconds",
        "resource" => resource,
        "operation" => operation,
    )
    .record(waited.as_secs_f64());
}

pub fn set_live_subscribers(count: usize) {
    gauge!("power_live_subscribers").set(count as f64);
}
