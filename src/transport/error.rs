use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    /// The run was cancelled while the transfer was in flight. Never counted as a failure.
    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    /// The remote side closed the transfer without moving a single byte
    #[error("Transfer finished without moving any bytes")]
    EmptyTransfer,

    #[error("No endpoint configured for {0}")]
    NoEndpoint(&'static str),

    #[error("Simulated failure on attempt {0}")]
    Simulated(u64),
}

impl TransportError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::ConnectionFailed(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::Status {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else if err.is_body() || err.is_decode() {
            TransportError::ReceiveFailed(err.to_string())
        } else {
            TransportError::SendFailed(err.to_string())
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
