//! Settings for the binaries and the size syntax shared by CLI and API.

mod error;
mod settings;
mod size;

pub use error::{ConfigError, ConfigResult};
pub use settings::{validate_worker_count, AppConfig, MAX_WORKERS, MIN_WORKERS};
pub use size::parse_size;
