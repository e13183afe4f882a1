//! Metrics and observability module
//!
//! Prometheus-compatible metrics for stress runs:
//! - Bytes moved per direction
//! - Transfer completions, failures and backoff delays
//! - Active workers and sampled throughput
//! - Run starts/stops with duration and volume

pub mod exporter;
pub mod recorder;

pub use exporter::{metrics_route, render_metrics, start_metrics_server, MetricsConfig, MetricsError};
pub use recorder::init_metrics;
