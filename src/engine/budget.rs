use crate::engine::run::RunContext;
use crate::engine::types::{EngineConfig, StopReason};

/// Decides when a run has moved its byte budget.
///
/// Workers add a chunk to the counter before asking, so a run can end up to
/// one in-flight chunk per active worker past the budget.
pub struct BudgetMonitor;

impl BudgetMonitor {
    /// `true` when the budget is enabled and `total_bytes` has reached it
    pub fn is_satisfied(total_bytes: u64, config: &EngineConfig) -> bool {
        config
            .active_budget()
            .is_some_and(|budget| total_bytes >= budget)
    }

    /// Check the run and stop it if its budget is met.
    ///
    /// Returns `true` whenever the budget is met, so every observing worker
    /// exits; only one of them actually triggers the stop.
    pub fn enforce(run: &RunContext) -> bool {
        if !Self::is_satisfied(run.total_bytes(), run.config()) {
            return false;
        }

        if let Some(budget) = run.config().active_budget() {
            if run.request_stop(StopReason::BudgetReached { budget }) {
                tracing::info!("Run {}: budget of {} bytes reached", run.id(), budget);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::TransferMode;
    use crate::stats::EngineEvent;
    use std::sync::Arc;
    use tokio::sync::broadcast;

    #[test]
    fn test_disabled_budget_never_satisfied() {
        let config = EngineConfig {
            budget_bytes: Some(10),
            budget_enabled: false,
            ..Default::default()
        };
        assert!(!BudgetMonitor::is_satisfied(u64::MAX, &config));
        assert!(!BudgetMonitor::is_satisfied(100, &EngineConfig::default()));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let config = EngineConfig::new(TransferMode::Download, 1).with_budget(1000);
        assert!(!BudgetMonitor::is_satisfied(999, &config));
        assert!(BudgetMonitor::is_satisfied(1000, &config));
        assert!(BudgetMonitor::is_satisfied(1001, &config));
    }

    #[test]
    fn test_enforce_stops_exactly_once_across_threads() {
        let (tx, mut rx) = broadcast::channel(64);
        let config = EngineConfig::new(TransferMode::Download, 8).with_budget(10_000_000);
        let run = Arc::new(RunContext::new(config, tx));
        run.add_bytes(10_485_760);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let run = run.clone();
                std::thread::spawn(move || BudgetMonitor::enforce(&run))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }

        let stops = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| matches!(e, EngineEvent::RunStopped { .. }))
            .count();
        assert_eq!(stops, 1);
        assert!(run.stop_reason().unwrap().contains("10,000,000"));
    }
}
