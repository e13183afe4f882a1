use crate::engine::RunContext;
use crate::metrics::recorder;
use crate::stats::types::{EngineEvent, StatsSnapshot};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, MissedTickBehavior};

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Periodically turns the run's byte counter into published snapshots.
///
/// One sampler per run. It exits when the run stops and never publishes
/// after that point: publication and stopping are serialized on the run's
/// live gate.
pub struct Sampler {
    run: Arc<RunContext>,
    period: Duration,
    last_sampled_bytes: u64,
    tick: u64,
    events: broadcast::Sender<EngineEvent>,
    latest: Arc<watch::Sender<Option<StatsSnapshot>>>,
}

impl Sampler {
    pub fn new(
        run: Arc<RunContext>,
        period: Duration,
        events: broadcast::Sender<EngineEvent>,
        latest: Arc<watch::Sender<Option<StatsSnapshot>>>,
    ) -> Self {
        Self {
            run,
            period,
            last_sampled_bytes: 0,
            tick: 0,
            events,
            latest,
        }
    }

    /// Advance the sampling cursor and build the snapshot for this tick
    pub fn sample(&mut self) -> StatsSnapshot {
        let total_bytes = self.run.total_bytes();
        // Monotonic counter; saturate anyway so a snapshot can never go negative
        let delta_bytes = total_bytes.saturating_sub(self.last_sampled_bytes);
        self.last_sampled_bytes = total_bytes;
        self.tick += 1;

        StatsSnapshot {
            run_id: self.run.id(),
            tick: self.tick,
            speed_bytes_per_second: delta_bytes as f64 / self.period.as_secs_f64(),
            delta_bytes,
            total_bytes,
            elapsed_seconds: self.run.elapsed().as_secs_f64(),
            connection_status: self.run.connection_status(),
            taken_at: Utc::now(),
        }
    }

    pub async fn run(mut self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = self.run.cancel_token().cancelled() => break,
                _ = ticker.tick() => {
                    if !self.publish() {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Sampler for run {} stopped after {} ticks", self.run.id(), self.tick);
    }

    /// Publish one snapshot unless the run has stopped. Returns whether it did.
    fn publish(&mut self) -> bool {
        let run = self.run.clone();
        run.while_live(|| {
            let snapshot = self.sample();
            recorder::record_throughput(snapshot.speed_bytes_per_second);
            self.latest.send_replace(Some(snapshot.clone()));
            let _ = self.events.send(EngineEvent::Snapshot(snapshot));
        })
        .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineConfig, StopReason, TransferMode};

    fn setup(
        period: Duration,
    ) -> (
        Arc<RunContext>,
        Sampler,
        broadcast::Receiver<EngineEvent>,
    ) {
        let (tx, rx) = broadcast::channel(64);
        let (latest, _) = watch::channel(None);
        let run = Arc::new(RunContext::new(
            EngineConfig::new(TransferMode::Download, 1),
            tx.clone(),
        ));
        let sampler = Sampler::new(run.clone(), period, tx, Arc::new(latest));
        (run, sampler, rx)
    }

    #[test]
    fn test_speed_is_delta_between_ticks() {
        let (run, mut sampler, _rx) = setup(Duration::from_secs(1));

        run.add_bytes(1000);
        let first = sampler.sample();
        run.add_bytes(250);
        let second = sampler.sample();
        let third = sampler.sample();

        assert_eq!((first.delta_bytes, first.total_bytes), (1000, 1000));
        assert_eq!((second.delta_bytes, second.total_bytes), (250, 1250));
        assert_eq!(third.delta_bytes, 0);
        assert_eq!(second.speed_bytes_per_second, 250.0);
        assert_eq!(third.tick, 3);
    }

    #[test]
    fn test_speed_normalized_to_period() {
        let (run, mut sampler, _rx) = setup(Duration::from_millis(500));
        run.add_bytes(1000);
        assert_eq!(sampler.sample().speed_bytes_per_second, 2000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_each_tick_until_stop() {
        let (run, sampler, mut rx) = setup(Duration::from_secs(1));
        let handle = tokio::spawn(sampler.run());

        run.add_bytes(100);
        tokio::time::sleep(Duration::from_millis(3500)).await;
        run.request_stop(StopReason::User);
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        let ticks: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Snapshot(s) => Some(s.tick),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![1, 2, 3]);
        assert!(matches!(events.last(), Some(EngineEvent::RunStopped { .. })));
    }

    #[test]
    fn test_no_publish_after_stop() {
        let (run, mut sampler, mut rx) = setup(Duration::from_secs(1));
        run.request_stop(StopReason::User);
        let _ = rx.try_recv();

        assert!(!sampler.publish());
        assert!(rx.try_recv().is_err());
    }
}
