use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Invalid size '{0}' (expected e.g. 500MB, 1GiB or a byte count)")]
    InvalidSize(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
