//! Transfer channels: the byte-stream plumbing the stress engine drives.
//!
//! The engine only decides *when* to transfer; a [`TransferChannel`] decides
//! *how*. [`HttpChannel`] talks to real endpoints, [`SimulatedChannel`] runs
//! entirely in-process.

pub mod channel;
pub mod error;
pub mod http;
pub mod rate_limiter;
pub mod simulated;

pub use channel::{ChunkStream, TransferChannel};
pub use error::{TransportError, TransportResult};
pub use http::{HttpChannel, HttpChannelConfig};
pub use rate_limiter::TransferRateLimiter;
pub use simulated::{SimulatedChannel, SimulatedChannelConfig};
