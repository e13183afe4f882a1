use crate::engine::budget::BudgetMonitor;
use crate::engine::run::RunContext;
use crate::engine::types::WorkerRole;
use crate::metrics::recorder;
use crate::transport::{TransferChannel, TransferRateLimiter, TransportError};
use backoff::{backoff::Backoff, ExponentialBackoff};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

/// Consecutive failures on one worker before the run is flagged as degraded
pub const FAILURES_BEFORE_ERROR: u32 = 3;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Retry delays for one worker: 500ms, 1s, 2s, 2s, ... with no jitter and no give-up.
pub fn retry_policy() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: INITIAL_BACKOFF,
        current_interval: INITIAL_BACKOFF,
        randomization_factor: 0.0,
        multiplier: 2.0,
        max_interval: MAX_BACKOFF,
        max_elapsed_time: None,
        ..Default::default()
    }
}

/// How a single transfer attempt ended
#[derive(Debug)]
enum Attempt {
    /// Channel closed normally, budget not reached
    Completed,
    /// This worker observed the budget being met
    BudgetReached,
    /// The run token fired; not a failure
    Cancelled,
    Failed(TransportError),
}

/// One concurrent transfer loop with a fixed direction.
pub struct Worker {
    slot: usize,
    role: WorkerRole,
    run: Arc<RunContext>,
    channel: Arc<dyn TransferChannel>,
    limiter: TransferRateLimiter,
    consecutive_failures: u32,
    backoff: ExponentialBackoff,
}

impl Worker {
    pub fn new(
        slot: usize,
        role: WorkerRole,
        run: Arc<RunContext>,
        channel: Arc<dyn TransferChannel>,
        limiter: TransferRateLimiter,
    ) -> Self {
        Self {
            slot,
            role,
            run,
            channel,
            limiter,
            consecutive_failures: 0,
            backoff: retry_policy(),
        }
    }

    pub fn role(&self) -> WorkerRole {
        self.role
    }

    /// Loop until the run is cancelled or its budget is met.
    pub async fn run(mut self) {
        recorder::worker_started();
        tracing::debug!(
            "Worker {} ({}) started on {} channel",
            self.slot,
            self.role.as_str(),
            self.channel.name()
        );

        loop {
            if self.run.is_cancelled() || BudgetMonitor::enforce(&self.run) {
                break;
            }

            let attempt = match self.role {
                WorkerRole::Download => self.download_once().await,
                WorkerRole::Upload => self.upload_once().await,
            };

            match attempt {
                Attempt::Completed => {
                    recorder::record_transfer_completed(self.role.as_str());
                    self.consecutive_failures = 0;
                    self.backoff.reset();
                }
                Attempt::BudgetReached | Attempt::Cancelled => break,
                Attempt::Failed(err) => {
                    // A transport error racing a stop is still a stop
                    if self.run.is_cancelled() {
                        break;
                    }
                    self.on_failure(&err);

                    let delay = self.backoff.next_backoff().unwrap_or(MAX_BACKOFF);
                    recorder::record_backoff(delay);
                    tokio::select! {
                        biased;
                        _ = self.run.cancel_token().cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        recorder::worker_exited();
        tracing::debug!("Worker {} ({}) exited", self.slot, self.role.as_str());
    }

    fn on_failure(&mut self, err: &TransportError) {
        self.consecutive_failures += 1;
        recorder::record_transfer_failed(self.role.as_str());
        tracing::warn!(
            "Worker {} ({}) attempt failed ({} in a row): {}",
            self.slot,
            self.role.as_str(),
            self.consecutive_failures,
            err
        );

        if self.consecutive_failures >= FAILURES_BEFORE_ERROR {
            self.run.mark_error();
        }
    }

    async fn download_once(&mut self) -> Attempt {
        let cancel = self.run.cancel_token().clone();

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Attempt::Cancelled,
            opened = self.channel.download(&cancel) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(err) if err.is_cancelled() => return Attempt::Cancelled,
            Err(err) => return Attempt::Failed(err),
        };

        // Returning drops the stream, which aborts the in-flight request
        let mut received = 0u64;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Attempt::Cancelled,
                next = stream.next() => next,
            };

            match next {
                // An empty body must not skip the backoff
                None if received == 0 => return Attempt::Failed(TransportError::EmptyTransfer),
                None => return Attempt::Completed,
                Some(Err(err)) if err.is_cancelled() => return Attempt::Cancelled,
                Some(Err(err)) => return Attempt::Failed(err),
                Some(Ok(chunk)) if chunk.is_empty() => {}
                Some(Ok(chunk)) => {
                    received += chunk.len() as u64;
                    if let Some(end) = self.record_chunk(chunk.len() as u64).await {
                        return end;
                    }
                }
            }
        }
    }

    async fn upload_once(&mut self) -> Attempt {
        let cancel = self.run.cancel_token().clone();

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Attempt::Cancelled,
            sent = self.channel.upload(&cancel) => sent,
        };

        match sent {
            Ok(0) => Attempt::Failed(TransportError::EmptyTransfer),
            Ok(bytes) => self
                .record_chunk(bytes)
                .await
                .unwrap_or(Attempt::Completed),
            Err(err) if err.is_cancelled() => Attempt::Cancelled,
            Err(err) => Attempt::Failed(err),
        }
    }

    /// Count a chunk, then re-check the budget. `Some` ends the attempt.
    async fn record_chunk(&mut self, bytes: u64) -> Option<Attempt> {
        self.run.add_bytes(bytes);
        recorder::record_bytes(self.role.as_str(), bytes);
        self.run.mark_connected();

        if BudgetMonitor::enforce(&self.run) {
            return Some(Attempt::BudgetReached);
        }

        if self.limiter.is_enabled() {
            tokio::select! {
                biased;
                _ = self.run.cancel_token().cancelled() => return Some(Attempt::Cancelled),
                _ = self.limiter.wait_for_bytes(bytes as usize) => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{ConnectionStatus, EngineConfig, StopReason, TransferMode};
    use crate::stats::EngineEvent;
    use crate::transport::{SimulatedChannel, SimulatedChannelConfig};
    use std::sync::atomic::Ordering;
    use tokio::sync::broadcast;
    use tokio::time::Instant;

    fn run_with(config: EngineConfig) -> (Arc<RunContext>, broadcast::Receiver<EngineEvent>) {
        let (tx, rx) = broadcast::channel(256);
        (Arc::new(RunContext::new(config, tx)), rx)
    }

    fn spawn_worker(
        role: WorkerRole,
        run: &Arc<RunContext>,
        channel: &Arc<SimulatedChannel>,
    ) -> tokio::task::JoinHandle<()> {
        let channel: Arc<dyn TransferChannel> = channel.clone();
        let worker = Worker::new(0, role, run.clone(), channel, TransferRateLimiter::unlimited());
        tokio::spawn(worker.run())
    }

    #[test]
    fn test_backoff_sequence_is_capped() {
        let mut policy = retry_policy();
        let delays: Vec<u128> = (0..6)
            .map(|_| policy.next_backoff().unwrap().as_millis())
            .collect();

        assert_eq!(delays, vec![500, 1000, 2000, 2000, 2000, 2000]);

        policy.reset();
        assert_eq!(policy.next_backoff().unwrap().as_millis(), 500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_worker_stops_at_budget() {
        let config = EngineConfig::new(TransferMode::Download, 1).with_budget(5_000);
        let (run, _rx) = run_with(config);
        let channel = Arc::new(SimulatedChannel::new(SimulatedChannelConfig {
            chunk_size: 1_000,
            chunks_per_transfer: 2,
            ..Default::default()
        }));

        spawn_worker(WorkerRole::Download, &run, &channel).await.unwrap();

        assert_eq!(run.total_bytes(), 5_000);
        assert!(run.is_cancelled());
        assert!(run.stop_reason().unwrap().contains("5,000"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_worker_counts_acknowledged_bodies() {
        let config = EngineConfig::new(TransferMode::Upload, 1).with_budget(3 * 4096);
        let (run, _rx) = run_with(config);
        let channel = Arc::new(SimulatedChannel::new(
            SimulatedChannelConfig::with_chunk_size(4096),
        ));

        spawn_worker(WorkerRole::Upload, &run, &channel).await.unwrap();

        assert_eq!(run.total_bytes(), 3 * 4096);
        assert_eq!(channel.stats().uploads_acked.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_flag_error_then_recover() {
        let config = EngineConfig::new(TransferMode::Download, 1);
        let (run, mut rx) = run_with(config);
        let channel = Arc::new(SimulatedChannel::new(SimulatedChannelConfig {
            chunk_size: 100,
            chunks_per_transfer: 1,
            ..SimulatedChannelConfig::default().fail_first(3)
        }));

        let started = Instant::now();
        let handle = spawn_worker(WorkerRole::Download, &run, &channel);

        let mut statuses = Vec::new();
        while statuses.len() < 2 {
            if let EngineEvent::ConnectionStatusChanged { status, .. } = rx.recv().await.unwrap() {
                statuses.push((status, run.total_bytes()));
            }
        }
        run.request_stop(StopReason::User);
        handle.await.unwrap();

        // Error is raised by the third failure, before any byte was counted;
        // Connected comes back with the first chunk of the fourth attempt.
        assert_eq!(statuses[0], (ConnectionStatus::Error, 0));
        assert_eq!(statuses[1].0, ConnectionStatus::Connected);
        assert!(statuses[1].1 > 0);

        // Two sleeps (500ms + 1s) separate attempts 1-3; the third failure
        // schedules a 2s sleep before attempt four.
        assert!(started.elapsed() >= Duration::from_millis(3500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_exits_promptly() {
        let config = EngineConfig::new(TransferMode::Download, 1);
        let (run, _rx) = run_with(config);
        let channel = Arc::new(SimulatedChannel::new(SimulatedChannelConfig::default()));
        channel.set_failing(true);

        let handle = spawn_worker(WorkerRole::Download, &run, &channel);
        // Let it fail a few times and park in a 2s backoff
        tokio::time::sleep(Duration::from_millis(3600)).await;

        let stopped_at = Instant::now();
        run.request_stop(StopReason::User);
        handle.await.unwrap();

        assert!(stopped_at.elapsed() < Duration::from_millis(10));
        assert!(channel.stats().failures.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_stream_is_not_a_failure() {
        let config = EngineConfig::new(TransferMode::Download, 1);
        let (run, _rx) = run_with(config);
        let channel = Arc::new(SimulatedChannel::new(SimulatedChannelConfig {
            chunk_latency: Duration::from_secs(30),
            ..Default::default()
        }));

        let handle = spawn_worker(WorkerRole::Download, &run, &channel);
        tokio::time::sleep(Duration::from_secs(1)).await;

        run.request_stop(StopReason::User);
        handle.await.unwrap();

        assert_eq!(channel.stats().failures.load(Ordering::SeqCst), 0);
        assert_eq!(channel.stats().attempts.load(Ordering::SeqCst), 1);
        assert_eq!(run.connection_status(), ConnectionStatus::Idle);
        assert_eq!(run.total_bytes(), 0);
    }

    async fn attempts_after_empty_transfers(role: WorkerRole, channel_config: SimulatedChannelConfig) -> u64 {
        let (run, _rx) = run_with(EngineConfig::new(TransferMode::Both, 1));
        let channel = Arc::new(SimulatedChannel::new(channel_config));

        let handle = spawn_worker(role, &run, &channel);
        tokio::time::sleep(Duration::from_millis(3600)).await;

        assert_eq!(run.total_bytes(), 0);
        assert_eq!(run.connection_status(), ConnectionStatus::Error);

        run.request_stop(StopReason::User);
        handle.await.unwrap();
        channel.stats().attempts.load(Ordering::SeqCst)
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_download_body_backs_off() {
        let attempts = attempts_after_empty_transfers(
            WorkerRole::Download,
            SimulatedChannelConfig {
                chunks_per_transfer: 0,
                ..Default::default()
            },
        )
        .await;

        // Attempts at 0, 0.5s, 1.5s and 3.5s
        assert_eq!(attempts, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_byte_upload_backs_off() {
        let attempts = attempts_after_empty_transfers(
            WorkerRole::Upload,
            SimulatedChannelConfig {
                upload_size: 0,
                upload_latency: Duration::ZERO,
                ..Default::default()
            },
        )
        .await;

        assert_eq!(attempts, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_exits_immediately_when_budget_already_met() {
        let config = EngineConfig::new(TransferMode::Download, 1).with_budget(10);
        let (run, _rx) = run_with(config);
        run.add_bytes(10);
        let channel = Arc::new(SimulatedChannel::new(SimulatedChannelConfig::default()));

        spawn_worker(WorkerRole::Download, &run, &channel).await.unwrap();

        assert_eq!(channel.stats().attempts.load(Ordering::SeqCst), 0);
        assert!(run.is_cancelled());
    }
}
