use crate::engine::{ConnectionStatus, TransferMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Statistics published once per sampling tick. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub run_id: Uuid,
    /// 1-based tick number within the run
    pub tick: u64,
    /// Bytes counted since the previous tick, normalized to one second
    pub speed_bytes_per_second: f64,
    /// Raw bytes counted since the previous tick
    pub delta_bytes: u64,
    pub total_bytes: u64,
    pub elapsed_seconds: f64,
    pub connection_status: ConnectionStatus,
    pub taken_at: DateTime<Utc>,
}

/// Everything an observer hears from the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EngineEvent {
    RunStarted {
        run_id: Uuid,
        mode: TransferMode,
        workers: usize,
        budget_bytes: Option<u64>,
    },
    Snapshot(StatsSnapshot),
    ConnectionStatusChanged {
        run_id: Uuid,
        status: ConnectionStatus,
    },
    RunStopped {
        run_id: Uuid,
        reason: String,
        /// Status at the moment of stopping, before the reset to idle
        connection_status: ConnectionStatus,
        total_bytes: u64,
        elapsed_seconds: f64,
    },
}

impl EngineEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            EngineEvent::RunStarted { run_id, .. }
            | EngineEvent::ConnectionStatusChanged { run_id, .. }
            | EngineEvent::RunStopped { run_id, .. } => *run_id,
            EngineEvent::Snapshot(snapshot) => snapshot.run_id,
        }
    }
}
