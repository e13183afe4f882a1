use crate::engine::error::{EngineError, EngineResult};
use crate::engine::run::RunContext;
use crate::engine::types::{
    plan_roles, ConnectionStatus, EngineConfig, EngineStatus, StopReason,
};
use crate::engine::worker::Worker;
use crate::metrics::recorder;
use crate::stats::{EngineEvent, Sampler, StatsSnapshot, DEFAULT_SAMPLE_INTERVAL};
use crate::transport::{TransferChannel, TransferRateLimiter};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

const EVENT_CHANNEL_SIZE: usize = 1024;

/// Owns the worker pool of at most one run at a time.
///
/// `start` and `stop` return immediately; workers and the sampler run as
/// detached tokio tasks that exit on their own once the run token fires.
pub struct StressEngine {
    channel: Arc<dyn TransferChannel>,
    sample_interval: Duration,
    current: RwLock<Option<Arc<RunContext>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    events: broadcast::Sender<EngineEvent>,
    latest: Arc<watch::Sender<Option<StatsSnapshot>>>,
}

impl StressEngine {
    pub fn new(channel: Arc<dyn TransferChannel>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (latest, _) = watch::channel(None);

        Self {
            channel,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            current: RwLock::new(None),
            tasks: Mutex::new(Vec::new()),
            events,
            latest: Arc::new(latest),
        }
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Start a run.
    ///
    /// Fails with [`EngineError::AlreadyRunning`] while a run is active, leaving
    /// it untouched. A config with zero workers is a no-op and returns `Ok(None)`.
    /// Must be called from within a tokio runtime.
    pub fn start(&self, config: EngineConfig) -> EngineResult<Option<Uuid>> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;

        let mut current = self.current.write();
        if let Some(run) = current.as_ref().filter(|run| run.is_active()) {
            return Err(EngineError::AlreadyRunning(run.id()));
        }

        if config.worker_count == 0 {
            tracing::warn!("Start requested with zero workers, ignoring");
            return Ok(None);
        }

        let roles = plan_roles(config.mode, config.worker_count);
        let run = Arc::new(RunContext::new(config, self.events.clone()));
        *current = Some(run.clone());
        drop(current);

        self.latest.send_replace(None);
        let limiter = TransferRateLimiter::from_option(config.throttle_bytes_per_sec);

        let mut tasks = self.tasks.lock();
        // Handles of a previous run are detached; those tasks already saw their token
        tasks.clear();
        for (slot, role) in roles.into_iter().enumerate() {
            let worker = Worker::new(
                slot,
                role,
                run.clone(),
                self.channel.clone(),
                limiter.clone(),
            );
            tasks.push(runtime.spawn(worker.run()));
        }

        let sampler = Sampler::new(
            run.clone(),
            self.sample_interval,
            self.events.clone(),
            self.latest.clone(),
        );
        tasks.push(runtime.spawn(sampler.run()));
        drop(tasks);

        recorder::record_run_started(config.mode.as_str());
        tracing::info!(
            "Run {} started: mode={} workers={} budget={:?}",
            run.id(),
            config.mode,
            config.worker_count,
            config.active_budget()
        );
        let _ = self.events.send(EngineEvent::RunStarted {
            run_id: run.id(),
            mode: config.mode,
            workers: config.worker_count,
            budget_bytes: config.active_budget(),
        });

        Ok(Some(run.id()))
    }

    /// Stop the active run, if any. Idempotent and non-blocking.
    ///
    /// Returns `true` if this call stopped a run.
    pub fn stop(&self) -> bool {
        let run = self.current.read().clone();
        match run {
            Some(run) => run.request_stop(StopReason::User),
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.current
            .read()
            .as_ref()
            .is_some_and(|run| run.is_active())
    }

    /// Subscribe to snapshots and run lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Latest snapshot of the current run (`None` before its first tick)
    pub fn latest_snapshot(&self) -> Option<StatsSnapshot> {
        self.latest.borrow().clone()
    }

    pub fn watch_snapshots(&self) -> watch::Receiver<Option<StatsSnapshot>> {
        self.latest.subscribe()
    }

    pub fn status(&self) -> EngineStatus {
        let run = self.current.read().clone();
        match run {
            Some(run) => EngineStatus {
                running: run.is_active(),
                run_id: Some(run.id()),
                config: Some(*run.config()),
                connection_status: run.connection_status(),
                stop_reason: run.stop_reason(),
                latest: self.latest_snapshot(),
            },
            None => EngineStatus {
                running: false,
                run_id: None,
                config: None,
                connection_status: ConnectionStatus::Idle,
                stop_reason: None,
                latest: None,
            },
        }
    }

    /// Stop and wait up to `timeout` for every worker and the sampler to exit.
    ///
    /// Returns `true` if all tasks finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.stop();
        let handles: Vec<_> = self.tasks.lock().drain(..).collect();
        let joined = tokio::time::timeout(timeout, futures::future::join_all(handles)).await;
        if joined.is_err() {
            tracing::warn!("Some workers did not exit within {:?}", timeout);
        }
        joined.is_ok()
    }
}
