//! flowstorm: sustained download/upload traffic for bandwidth and stress testing.
//!
//! A [`StressEngine`](engine::StressEngine) drives a pool of workers over a
//! [`TransferChannel`](transport::TransferChannel), counts every byte in one
//! shared atomic counter, stops at an optional byte budget and publishes one
//! [`StatsSnapshot`](stats::StatsSnapshot) per sampling tick.

pub mod api;
pub mod config;
pub mod engine;
pub mod metrics;
pub mod stats;
pub mod transport;

pub use engine::{EngineConfig, EngineError, StressEngine, TransferMode};
pub use stats::{EngineEvent, StatsSnapshot};
