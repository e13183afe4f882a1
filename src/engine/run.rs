use crate::engine::types::{ConnectionStatus, EngineConfig, StopReason};
use crate::metrics::recorder;
use crate::stats::EngineEvent;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Shared state of one run.
///
/// Workers only touch the byte counter and the connection status; the
/// sampler only reads. Stopping is single-shot: the first `request_stop`
/// wins, records its reason and cancels the token every worker observes.
pub struct RunContext {
    id: Uuid,
    config: EngineConfig,
    started_at: Instant,
    started_wall: DateTime<Utc>,
    total_bytes: AtomicU64,
    status: AtomicU8,
    cancel: CancellationToken,
    stop_fired: AtomicBool,
    // Write-locked only while stopping; readers use it as a "still live" gate
    stop_reason: RwLock<Option<String>>,
    events: broadcast::Sender<EngineEvent>,
}

impl RunContext {
    pub fn new(config: EngineConfig, events: broadcast::Sender<EngineEvent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            started_at: Instant::now(),
            started_wall: Utc::now(),
            total_bytes: AtomicU64::new(0),
            status: AtomicU8::new(ConnectionStatus::Idle as u8),
            cancel: CancellationToken::new(),
            stop_fired: AtomicBool::new(false),
            stop_reason: RwLock::new(None),
            events,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn started_wall(&self) -> DateTime<Utc> {
        self.started_wall
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Acquire)
    }

    /// Count `bytes` and return the new total
    pub fn add_bytes(&self, bytes: u64) -> u64 {
        self.total_bytes.fetch_add(bytes, Ordering::AcqRel) + bytes
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_active(&self) -> bool {
        !self.stop_fired.load(Ordering::Acquire)
    }

    pub fn stop_reason(&self) -> Option<String> {
        self.stop_reason.read().clone()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn mark_connected(&self) {
        self.transition_status(ConnectionStatus::Connected);
    }

    pub fn mark_error(&self) {
        self.transition_status(ConnectionStatus::Error);
    }

    fn transition_status(&self, next: ConnectionStatus) {
        // Hot path: nothing to do
        if self.connection_status() == next {
            return;
        }

        let gate = self.stop_reason.read();
        if gate.is_some() {
            return;
        }

        let previous = ConnectionStatus::from_u8(self.status.swap(next as u8, Ordering::AcqRel));
        if previous != next {
            if next == ConnectionStatus::Error {
                tracing::warn!("Run {}: connection degraded, workers keep retrying", self.id);
            } else {
                tracing::info!("Run {}: connection status {:?} -> {:?}", self.id, previous, next);
            }
            let _ = self.events.send(EngineEvent::ConnectionStatusChanged {
                run_id: self.id,
                status: next,
            });
        }
    }

    /// Run `f` only while the run has not stopped. Stopping waits for `f` to finish.
    pub fn while_live<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let gate = self.stop_reason.read();
        if gate.is_some() {
            return None;
        }
        Some(f())
    }

    /// Stop the run. Returns `true` only for the caller that actually stopped it.
    pub fn request_stop(&self, reason: StopReason) -> bool {
        if self
            .stop_fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let final_status = {
            let mut gate = self.stop_reason.write();
            *gate = Some(reason.to_string());
            ConnectionStatus::from_u8(
                self.status
                    .swap(ConnectionStatus::Idle as u8, Ordering::AcqRel),
            )
        };
        self.cancel.cancel();

        let total_bytes = self.total_bytes();
        let elapsed = self.elapsed();
        tracing::info!(
            "Run {} stopped after {:.1}s with {} bytes: {}",
            self.id,
            elapsed.as_secs_f64(),
            total_bytes,
            reason
        );
        recorder::record_run_stopped(reason.cause(), elapsed, total_bytes);

        let _ = self.events.send(EngineEvent::RunStopped {
            run_id: self.id,
            reason: reason.to_string(),
            connection_status: final_status,
            total_bytes,
            elapsed_seconds: elapsed.as_secs_f64(),
        });

        true
    }
}
