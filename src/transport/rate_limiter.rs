//! Throughput cap for stress runs using the governor crate

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Granularity of the limiter: one permit per KiB
const UNIT_BYTES: usize = 1024;

/// Shared bytes-per-second limiter. Every worker of a run holds a clone.
#[derive(Clone)]
pub struct TransferRateLimiter {
    limiter: Option<Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
}

impl TransferRateLimiter {
    /// Create a limiter capped at `bytes_per_second` (0 = unlimited)
    pub fn new(bytes_per_second: u32) -> Self {
        let units = match bytes_per_second {
            0 => None,
            bps => NonZeroU32::new((bps / UNIT_BYTES as u32).max(1)),
        };
        let limiter = units.map(|units| Arc::new(RateLimiter::direct(Quota::per_second(units))));

        Self { limiter }
    }

    pub fn unlimited() -> Self {
        Self { limiter: None }
    }

    pub fn from_option(bytes_per_second: Option<u32>) -> Self {
        bytes_per_second.map(Self::new).unwrap_or_else(Self::unlimited)
    }

    /// Wait until `bytes` may pass. Not cancellable on its own; race it against the run token.
    pub async fn wait_for_bytes(&self, bytes: usize) {
        let Some(limiter) = &self.limiter else {
            return;
        };

        let units = bytes.div_ceil(UNIT_BYTES).max(1);
        for _ in 0..units {
            limiter.until_ready().await;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }
}

impl Default for TransferRateLimiter {
    fn default() -> Self {
        Self::unlimited()
    }
}
