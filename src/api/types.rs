use crate::config::{parse_size, validate_worker_count, ConfigResult};
use crate::engine::{EngineConfig, TransferMode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Budget given either as a byte count or a size string ("500MB")
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeValue {
    Bytes(u64),
    Text(String),
}

impl SizeValue {
    pub fn to_bytes(&self) -> ConfigResult<u64> {
        match self {
            SizeValue::Bytes(bytes) => Ok(*bytes),
            SizeValue::Text(text) => parse_size(text),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRunRequest {
    #[serde(default)]
    pub mode: TransferMode,
    pub workers: usize,
    #[serde(default)]
    pub budget: Option<SizeValue>,
    /// Defaults to on whenever a budget is given
    #[serde(default)]
    pub budget_enabled: Option<bool>,
    #[serde(default)]
    pub throttle_bytes_per_sec: Option<u32>,
}

impl StartRunRequest {
    /// Validate caller-side ranges and build the engine config
    pub fn into_config(self) -> ConfigResult<EngineConfig> {
        let worker_count = validate_worker_count(self.workers)?;
        let budget_bytes = self.budget.as_ref().map(SizeValue::to_bytes).transpose()?;

        Ok(EngineConfig {
            mode: self.mode,
            worker_count,
            budget_bytes,
            budget_enabled: self.budget_enabled.unwrap_or(budget_bytes.is_some()),
            throttle_bytes_per_sec: self.throttle_bytes_per_sec,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRunResponse {
    pub run_id: Uuid,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopRunResponse {
    pub stopped: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_accepts_number_or_text() {
        let req: StartRunRequest =
            serde_json::from_str(r#"{"mode":"both","workers":4,"budget":"10MB"}"#).unwrap();
        let config = req.into_config().unwrap();
        assert_eq!(config.mode, TransferMode::Both);
        assert_eq!(config.active_budget(), Some(10_000_000));

        let req: StartRunRequest =
            serde_json::from_str(r#"{"workers":2,"budget":1234,"budget_enabled":false}"#).unwrap();
        let config = req.into_config().unwrap();
        assert_eq!(config.mode, TransferMode::Download);
        assert_eq!(config.budget_bytes, Some(1234));
        assert_eq!(config.active_budget(), None);
    }

    #[test]
    fn test_out_of_range_workers_rejected() {
        let req: StartRunRequest = serde_json::from_str(r#"{"workers":32}"#).unwrap();
        assert!(req.into_config().is_err());
    }
}
