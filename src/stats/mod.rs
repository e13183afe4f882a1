//! Run statistics: the sampler and the values it publishes.

pub mod format;
mod sampler;
mod types;

pub use format::{group_thousands, human_bytes, to_mbps};
pub use sampler::{Sampler, DEFAULT_SAMPLE_INTERVAL};
pub use types::{EngineEvent, StatsSnapshot};
