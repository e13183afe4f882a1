use crate::config::error::{ConfigError, ConfigResult};
use crate::config::size::parse_size;
use crate::stats::DEFAULT_SAMPLE_INTERVAL;
use crate::transport::HttpChannelConfig;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 16;

/// Reject worker counts outside 1..=16. The engine itself does not check.
pub fn validate_worker_count(workers: usize) -> ConfigResult<usize> {
    if (MIN_WORKERS..=MAX_WORKERS).contains(&workers) {
        Ok(workers)
    } else {
        Err(ConfigError::InvalidValue {
            key: "workers".into(),
            reason: format!("{workers} is outside {MIN_WORKERS}..={MAX_WORKERS}"),
        })
    }
}

/// Process-level settings for the binaries, read from `FLOWSTORM_*` variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Standalone Prometheus listener; metrics are also served on `/metrics`
    pub metrics_addr: Option<SocketAddr>,
    pub sample_interval: Duration,
    pub http: HttpChannelConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            metrics_addr: None,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            http: HttpChannelConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(addr) = lookup("FLOWSTORM_BIND_ADDR") {
            config.bind_addr = parse_value("FLOWSTORM_BIND_ADDR", &addr)?;
        }
        if let Some(addr) = lookup("FLOWSTORM_METRICS_ADDR") {
            config.metrics_addr = Some(parse_value("FLOWSTORM_METRICS_ADDR", &addr)?);
        }
        if let Some(ms) = lookup("FLOWSTORM_SAMPLE_INTERVAL_MS") {
            let ms: u64 = parse_value("FLOWSTORM_SAMPLE_INTERVAL_MS", &ms)?;
            if ms == 0 {
                return Err(positive_required("FLOWSTORM_SAMPLE_INTERVAL_MS"));
            }
            config.sample_interval = Duration::from_millis(ms);
        }
        if let Some(urls) = lookup("FLOWSTORM_DOWNLOAD_URLS") {
            config.http.download_urls = urls
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(url) = lookup("FLOWSTORM_UPLOAD_URL") {
            let url = url.trim();
            config.http.upload_url = (!url.is_empty()).then(|| url.to_string());
        }
        if let Some(size) = lookup("FLOWSTORM_UPLOAD_CHUNK") {
            let bytes = parse_size(&size)?;
            if bytes == 0 {
                return Err(positive_required("FLOWSTORM_UPLOAD_CHUNK"));
            }
            config.http.upload_chunk_size =
                usize::try_from(bytes).map_err(|_| ConfigError::InvalidSize(size.clone()))?;
        }
        if let Some(secs) = lookup("FLOWSTORM_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = parse_value("FLOWSTORM_REQUEST_TIMEOUT_SECS", &secs)?;
            if secs == 0 {
                return Err(positive_required("FLOWSTORM_REQUEST_TIMEOUT_SECS"));
            }
            config.http.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn positive_required(key: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: "must be positive".into(),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
