use anyhow::Context;
use clap::Parser;
use flowstorm::config::{parse_size, validate_worker_count, AppConfig};
use flowstorm::engine::{EngineConfig, StressEngine, TransferMode};
use flowstorm::stats::{group_thousands, human_bytes, to_mbps, EngineEvent};
use flowstorm::transport::{
    HttpChannel, SimulatedChannel, SimulatedChannelConfig, TransferChannel,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// Generate sustained download/upload traffic and report live throughput
#[derive(Parser, Debug)]
#[command(name = "flowstorm", version)]
struct Cli {
    /// download, upload or both
    #[arg(short, long, default_value = "download")]
    mode: TransferMode,

    /// Concurrent workers (1-16)
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Stop after this many bytes, e.g. 500MB or 2GiB
    #[arg(short, long, value_parser = parse_size)]
    budget: Option<u64>,

    /// Stop after this many seconds
    #[arg(short, long)]
    duration: Option<u64>,

    /// Cap aggregate throughput, e.g. 10MB (per second)
    #[arg(long, value_parser = parse_size)]
    throttle: Option<u64>,

    /// Download source (repeatable); overrides FLOWSTORM_DOWNLOAD_URLS
    #[arg(long = "url")]
    download_urls: Vec<String>,

    /// Upload endpoint; overrides FLOWSTORM_UPLOAD_URL
    #[arg(long)]
    upload_url: Option<String>,

    /// Run against an in-process channel instead of the network
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowstorm=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut app = AppConfig::from_env()?;
    if !cli.download_urls.is_empty() {
        app.http.download_urls = cli.download_urls.clone();
    }
    if let Some(url) = &cli.upload_url {
        app.http.upload_url = Some(url.clone());
    }

    let config = EngineConfig {
        mode: cli.mode,
        worker_count: validate_worker_count(cli.workers)?,
        budget_bytes: cli.budget,
        budget_enabled: cli.budget.is_some(),
        throttle_bytes_per_sec: cli
            .throttle
            .map(|bps| u32::try_from(bps).unwrap_or(u32::MAX)),
    };

    let channel: Arc<dyn TransferChannel> = if cli.simulate {
        Arc::new(SimulatedChannel::new(SimulatedChannelConfig::default()))
    } else {
        Arc::new(HttpChannel::new(app.http.clone()).context("failed to build HTTP channel")?)
    };

    let engine = StressEngine::new(channel).with_sample_interval(app.sample_interval);
    let mut events = engine.subscribe();

    println!(
        "flowstorm: {} with {} workers{}",
        config.mode,
        config.worker_count,
        config
            .active_budget()
            .map(|b| format!(", budget {} bytes ({})", group_thousands(b), human_bytes(b)))
            .unwrap_or_default()
    );
    engine.start(config)?;

    let deadline = async {
        match cli.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let mut deadline_hit = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                engine.stop();
            }
            _ = &mut deadline, if !deadline_hit => {
                deadline_hit = true;
                engine.stop();
            }
            event = events.recv() => match event {
                Ok(EngineEvent::Snapshot(s)) => {
                    println!(
                        "[{:>6.1}s] {:>9.2} Mbit/s  total {:>12}  {:?}",
                        s.elapsed_seconds,
                        to_mbps(s.speed_bytes_per_second),
                        human_bytes(s.total_bytes),
                        s.connection_status
                    );
                }
                Ok(EngineEvent::ConnectionStatusChanged { status, .. }) => {
                    println!("connection: {status:?}");
                }
                Ok(EngineEvent::RunStopped { reason, total_bytes, elapsed_seconds, connection_status, .. }) => {
                    let avg = if elapsed_seconds > 0.0 { total_bytes as f64 / elapsed_seconds } else { 0.0 };
                    println!(
                        "done: {reason}; {} bytes in {:.1}s (avg {:.2} Mbit/s, last status {:?})",
                        group_thousands(total_bytes),
                        elapsed_seconds,
                        to_mbps(avg),
                        connection_status
                    );
                    break;
                }
                Ok(EngineEvent::RunStarted { .. }) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }

    engine.shutdown(Duration::from_secs(3)).await;
    Ok(())
}
