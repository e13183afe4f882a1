//! In-process transfer channel for dry runs and tests
//!
//! Serves zero-filled chunks after a configurable per-chunk latency and can be
//! scripted to fail the first N attempts or to fail until switched back on.

use crate::transport::channel::{ChunkStream, TransferChannel};
use crate::transport::error::{TransportError, TransportResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedChannelConfig {
    /// Size of every download chunk
    pub chunk_size: usize,
    /// Chunks served per download before the stream ends normally
    pub chunks_per_transfer: u32,
    /// Delay before each chunk is delivered
    pub chunk_latency: Duration,
    /// Bytes acknowledged per upload
    pub upload_size: u64,
    /// Delay before an upload is acknowledged
    pub upload_latency: Duration,
    /// Number of initial attempts (download or upload) that fail
    pub fail_first: u64,
}

impl Default for SimulatedChannelConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024 * 1024,
            chunks_per_transfer: 16,
            chunk_latency: Duration::from_millis(10),
            upload_size: 1024 * 1024,
            upload_latency: Duration::from_millis(10),
            fail_first: 0,
        }
    }
}

impl SimulatedChannelConfig {
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            upload_size: chunk_size as u64,
            ..Default::default()
        }
    }

    pub fn fail_first(mut self, attempts: u64) -> Self {
        self.fail_first = attempts;
        self
    }
}

#[derive(Debug, Default)]
pub struct SimulatedStats {
    pub attempts: AtomicU64,
    pub failures: AtomicU64,
    pub chunks_served: AtomicU64,
    pub uploads_acked: AtomicU64,
    pub cancellations: AtomicU64,
}

pub struct SimulatedChannel {
    config: SimulatedChannelConfig,
    chunk: Bytes,
    failing: AtomicBool,
    stats: Arc<SimulatedStats>,
}

impl SimulatedChannel {
    pub fn new(config: SimulatedChannelConfig) -> Self {
        let chunk = Bytes::from(vec![0u8; config.chunk_size]);
        Self {
            config,
            chunk,
            failing: AtomicBool::new(false),
            stats: Arc::new(SimulatedStats::default()),
        }
    }

    /// Force every subsequent attempt to fail (or stop forcing it)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn stats(&self) -> Arc<SimulatedStats> {
        self.stats.clone()
    }

    /// Register an attempt and decide whether it fails
    fn begin_attempt(&self) -> TransportResult<()> {
        let attempt = self.stats.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.config.fail_first || self.failing.load(Ordering::SeqCst) {
            self.stats.failures.fetch_add(1, Ordering::SeqCst);
            return Err(TransportError::Simulated(attempt));
        }
        Ok(())
    }
}

#[async_trait]
impl TransferChannel for SimulatedChannel {
    async fn download(&self, cancel: &CancellationToken) -> TransportResult<ChunkStream> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        self.begin_attempt()?;

        let chunk = self.chunk.clone();
        let latency = self.config.chunk_latency;
        let stats = self.stats.clone();
        let cancel = cancel.clone();
        let remaining = self.config.chunks_per_transfer;

        let stream = futures::stream::unfold(remaining, move |remaining| {
            let chunk = chunk.clone();
            let stats = stats.clone();
            let cancel = cancel.clone();
            async move {
                if remaining == 0 {
                    return None;
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        stats.cancellations.fetch_add(1, Ordering::SeqCst);
                        Some((Err(TransportError::Cancelled), 0))
                    }
                    _ = tokio::time::sleep(latency) => {
                        stats.chunks_served.fetch_add(1, Ordering::SeqCst);
                        Some((Ok(chunk), remaining - 1))
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn upload(&self, cancel: &CancellationToken) -> TransportResult<u64> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        self.begin_attempt()?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.stats.cancellations.fetch_add(1, Ordering::SeqCst);
                Err(TransportError::Cancelled)
            }
            _ = tokio::time::sleep(self.config.upload_latency) => {
                self.stats.uploads_acked.fetch_add(1, Ordering::SeqCst);
                Ok(self.config.upload_size)
            }
        }
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
