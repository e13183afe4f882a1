//! Metrics recorder for stress runs
//!
//! Thin wrappers over the `metrics` facade. Without an installed recorder
//! every call is a no-op, so the engine can record unconditionally.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    describe_counter!(
        "flowstorm_bytes_total",
        "Bytes moved by workers, labelled by direction"
    );
    describe_counter!(
        "flowstorm_transfers_completed_total",
        "Transfers that ran to completion without hitting the budget"
    );
    describe_counter!(
        "flowstorm_transfer_failures_total",
        "Transfer attempts that failed with a transport error"
    );
    describe_counter!("flowstorm_runs_started_total", "Runs started");
    describe_counter!(
        "flowstorm_runs_stopped_total",
        "Runs stopped, labelled by stop cause"
    );

    describe_gauge!("flowstorm_active_workers", "Workers currently looping");
    describe_gauge!(
        "flowstorm_throughput_bytes_per_second",
        "Throughput measured at the last sampling tick"
    );

    describe_histogram!(
        "flowstorm_backoff_seconds",
        "Backoff delays inserted after failed attempts"
    );
    describe_histogram!("flowstorm_run_duration_seconds", "Wall time of finished runs");
    describe_histogram!("flowstorm_run_bytes", "Bytes moved by finished runs");
}

// ============== Worker Operations ==============

/// Record bytes counted by a worker
pub fn record_bytes(direction: &'static str, bytes: u64) {
    counter!("flowstorm_bytes_total", "direction" => direction).increment(bytes);
}

pub fn record_transfer_completed(direction: &'static str) {
    counter!("flowstorm_transfers_completed_total", "direction" => direction).increment(1);
}

pub fn record_transfer_failed(direction: &'static str) {
    counter!("flowstorm_transfer_failures_total", "direction" => direction).increment(1);
}

pub fn record_backoff(delay: Duration) {
    histogram!("flowstorm_backoff_seconds").record(delay.as_secs_f64());
}

pub fn worker_started() {
    gauge!("flowstorm_active_workers").increment(1.0);
}

pub fn worker_exited() {
    gauge!("flowstorm_active_workers").decrement(1.0);
}

// ============== Run Operations ==============

pub fn record_run_started(mode: &'static str) {
    counter!("flowstorm_runs_started_total", "mode" => mode).increment(1);
}

pub fn record_run_stopped(cause: &'static str, duration: Duration, total_bytes: u64) {
    counter!("flowstorm_runs_stopped_total", "cause" => cause).increment(1);
    histogram!("flowstorm_run_duration_seconds").record(duration.as_secs_f64());
    histogram!("flowstorm_run_bytes").record(total_bytes as f64);
    gauge!("flowstorm_throughput_bytes_per_second").set(0.0);
}

pub fn record_throughput(bytes_per_second: f64) {
    gauge!("flowstorm_throughput_bytes_per_second").set(bytes_per_second);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics() {
        // Should not panic when called multiple times
        init_metrics();
        init_metrics();
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_bytes("download", 1024);
        record_transfer_failed("upload");
        record_backoff(Duration::from_millis(500));
        worker_started();
        worker_exited();
        record_run_stopped("user", Duration::from_secs(1), 0);
    }
}
