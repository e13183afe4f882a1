use anyhow::Context;
use flowstorm::api::create_api_server;
use flowstorm::config::AppConfig;
use flowstorm::engine::StressEngine;
use flowstorm::metrics::{start_metrics_server, MetricsConfig};
use flowstorm::transport::HttpChannel;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowstorm=info,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::from_env()?;

    start_metrics_server(MetricsConfig {
        listen_addr: config.metrics_addr,
    })?;

    tracing::info!(
        "Download sources: {:?}, upload endpoint: {:?}",
        config.http.download_urls,
        config.http.upload_url
    );
    let channel = HttpChannel::new(config.http.clone()).context("failed to build HTTP channel")?;
    let engine = Arc::new(
        StressEngine::new(Arc::new(channel)).with_sample_interval(config.sample_interval),
    );

    let app = create_api_server(engine.clone());
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("flowstorm server listening on http://{}", config.bind_addr);
    tracing::info!("  POST /api/v1/run       start a run");
    tracing::info!("  POST /api/v1/run/stop  stop the active run");
    tracing::info!("  GET  /api/v1/run       engine status");
    tracing::info!("  GET  /ws               live stats stream");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;

    engine.shutdown(Duration::from_secs(3)).await;
    Ok(())
}
