//! Prometheus exporter for stress-run metrics

use crate::metrics::recorder::init_metrics;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

#[derive(Debug, Clone, Default)]
pub struct MetricsConfig {
    /// Standalone scrape listener. `None` installs the recorder only; serve it via [`metrics_route`].
    pub listen_addr: Option<SocketAddr>,
}

impl MetricsConfig {
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            listen_addr: Some(addr),
        }
    }
}

/// Install the Prometheus recorder (once per process).
///
/// Subsequent calls return the existing handle.
pub fn start_metrics_server(config: MetricsConfig) -> Result<&'static PrometheusHandle, MetricsError> {
    init_metrics();

    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }

    let handle = match config.listen_addr {
        Some(addr) => {
            let (recorder, exporter) = PrometheusBuilder::new()
                .with_http_listener(addr)
                .build()
                .map_err(|e| MetricsError::SetupFailed(e.to_string()))?;
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder)
                .map_err(|_| MetricsError::AlreadyInitialized)?;
            tokio::spawn(async move {
                if exporter.await.is_err() {
                    tracing::warn!("Prometheus listener on {} stopped", addr);
                }
            });
            tracing::info!("Prometheus metrics listening on {}", addr);
            handle
        }
        None => PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| MetricsError::SetupFailed(e.to_string()))?,
    };

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Render metrics as text (for the API's `/metrics` route)
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to setup metrics: {0}")]
    SetupFailed(String),

    #[error("Metrics already initialized")]
    AlreadyInitialized,
}

/// Axum route serving the installed recorder's output
pub fn metrics_route<S: Clone + Send + Sync + 'static>() -> axum::routing::MethodRouter<S> {
    use axum::response::IntoResponse;

    axum::routing::get(|| async {
        match render_metrics() {
            Some(metrics) => (
                [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                metrics,
            )
                .into_response(),
            None => (
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                "Metrics not initialized",
            )
                .into_response(),
        }
    })
}
