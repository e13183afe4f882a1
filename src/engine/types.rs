use crate::stats::{group_thousands, human_bytes, StatsSnapshot};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Which directions a run exercises.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    #[default]
    Download,
    Upload,
    Both,
}

impl TransferMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferMode::Download => "download",
            TransferMode::Upload => "upload",
            TransferMode::Both => "both",
        }
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "download" | "down" => Ok(TransferMode::Download),
            "upload" | "up" => Ok(TransferMode::Upload),
            "both" => Ok(TransferMode::Both),
            other => Err(format!("unknown mode '{other}' (expected download, upload or both)")),
        }
    }
}

/// Direction a single worker is fixed to for its whole life.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkerRole {
    Download,
    Upload,
}

impl WorkerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerRole::Download => "download",
            WorkerRole::Upload => "upload",
        }
    }
}

/// Compute the role of every worker slot.
///
/// In `Both` mode uploads get `count / 2` slots and downloads take the rest,
/// so an odd remainder goes to download. Download slots come first.
pub fn plan_roles(mode: TransferMode, count: usize) -> Vec<WorkerRole> {
    let uploads = match mode {
        TransferMode::Download => 0,
        TransferMode::Upload => count,
        TransferMode::Both => count / 2,
    };
    let downloads = count - uploads;

    std::iter::repeat(WorkerRole::Download)
        .take(downloads)
        .chain(std::iter::repeat(WorkerRole::Upload).take(uploads))
        .collect()
}

/// Best-effort connectivity flag shared by all workers of a run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ConnectionStatus {
    #[default]
    Idle = 0,
    Connected = 1,
    Error = 2,
}

impl ConnectionStatus {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionStatus::Connected,
            2 => ConnectionStatus::Error,
            _ => ConnectionStatus::Idle,
        }
    }
}

/// Parameters of one run. Fixed from `start` until the run stops.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    pub mode: TransferMode,
    /// Callers keep this within 1..=16; 0 makes `start` a no-op
    pub worker_count: usize,
    pub budget_bytes: Option<u64>,
    /// Budget toggle; `budget_bytes` is ignored while false
    pub budget_enabled: bool,
    /// Optional cap on aggregate throughput
    pub throttle_bytes_per_sec: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: TransferMode::Download,
            worker_count: 4,
            budget_bytes: None,
            budget_enabled: false,
            throttle_bytes_per_sec: None,
        }
    }
}

impl EngineConfig {
    pub fn new(mode: TransferMode, worker_count: usize) -> Self {
        Self {
            mode,
            worker_count,
            ..Default::default()
        }
    }

    /// Set and enable a byte budget
    pub fn with_budget(mut self, bytes: u64) -> Self {
        self.budget_bytes = Some(bytes);
        self.budget_enabled = true;
        self
    }

    pub fn with_throttle(mut self, bytes_per_sec: u32) -> Self {
        self.throttle_bytes_per_sec = Some(bytes_per_sec);
        self
    }

    /// The budget in force, if any
    pub fn active_budget(&self) -> Option<u64> {
        if self.budget_enabled {
            self.budget_bytes
        } else {
            None
        }
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    User,
    BudgetReached { budget: u64 },
}

impl StopReason {
    /// Short label for metrics
    pub fn cause(&self) -> &'static str {
        match self {
            StopReason::User => "user",
            StopReason::BudgetReached { .. } => "budget",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::User => f.write_str("stopped by user"),
            StopReason::BudgetReached { budget } => write!(
                f,
                "target reached: {} bytes ({})",
                group_thousands(*budget),
                human_bytes(*budget)
            ),
        }
    }
}

/// Read-only view of the engine for control surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub running: bool,
    pub run_id: Option<Uuid>,
    pub config: Option<EngineConfig>,
    pub connection_status: ConnectionStatus,
    pub stop_reason: Option<String>,
    pub latest: Option<StatsSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(roles: &[WorkerRole], role: WorkerRole) -> usize {
        roles.iter().filter(|r| **r == role).count()
    }

    #[test]
    fn test_plan_single_direction() {
        let roles = plan_roles(TransferMode::Download, 4);
        assert_eq!(roles, vec![WorkerRole::Download; 4]);

        let roles = plan_roles(TransferMode::Upload, 3);
        assert_eq!(roles, vec![WorkerRole::Upload; 3]);
    }

    #[test]
    fn test_plan_both_splits_evenly() {
        let roles = plan_roles(TransferMode::Both, 8);
        assert_eq!(count(&roles, WorkerRole::Download), 4);
        assert_eq!(count(&roles, WorkerRole::Upload), 4);
    }

    #[test]
    fn test_plan_both_remainder_goes_to_download() {
        let roles = plan_roles(TransferMode::Both, 5);
        assert_eq!(count(&roles, WorkerRole::Download), 3);
        assert_eq!(count(&roles, WorkerRole::Upload), 2);

        let roles = plan_roles(TransferMode::Both, 1);
        assert_eq!(roles, vec![WorkerRole::Download]);
    }

    #[test]
    fn test_plan_zero_workers() {
        assert!(plan_roles(TransferMode::Both, 0).is_empty());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Both".parse::<TransferMode>(), Ok(TransferMode::Both));
        assert_eq!("up".parse::<TransferMode>(), Ok(TransferMode::Upload));
        assert!("sideways".parse::<TransferMode>().is_err());
    }

    #[test]
    fn test_budget_toggle() {
        let config = EngineConfig::new(TransferMode::Download, 2).with_budget(1000);
        assert_eq!(config.active_budget(), Some(1000));

        let disabled = EngineConfig {
            budget_enabled: false,
            ..config
        };
        assert_eq!(disabled.active_budget(), None);
    }

    #[test]
    fn test_stop_reason_text() {
        let reason = StopReason::BudgetReached { budget: 10_000_000 };
        assert_eq!(reason.to_string(), "target reached: 10,000,000 bytes (9.54 MiB)");
        assert_eq!(StopReason::User.to_string(), "stopped by user");
    }

    #[test]
    fn test_connection_status_roundtrip_u8() {
        for status in [
            ConnectionStatus::Idle,
            ConnectionStatus::Connected,
            ConnectionStatus::Error,
        ] {
            assert_eq!(ConnectionStatus::from_u8(status as u8), status);
        }
    }
}
