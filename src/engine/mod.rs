//! The bandwidth stress engine: a pool of transfer workers sharing one byte
//! counter, one cancellation token and an optional byte budget.

mod budget;
mod engine;
mod error;
mod run;
mod types;
mod worker;

pub use budget::BudgetMonitor;
pub use engine::StressEngine;
pub use error::{EngineError, EngineResult};
pub use run::RunContext;
pub use types::{
    plan_roles, ConnectionStatus, EngineConfig, EngineStatus, StopReason, TransferMode, WorkerRole,
};
pub use worker::{retry_policy, Worker, FAILURES_BEFORE_ERROR};
