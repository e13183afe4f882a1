use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EngineError {
    /// `start` called while a run is active. The active run is left untouched.
    #[error("A run is already active: {0}")]
    AlreadyRunning(Uuid),

    #[error("No async runtime available to spawn workers")]
    NoRuntime,
}

pub type EngineResult<T> = Result<T, EngineError>;
