use crate::transport::error::TransportResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

/// Incoming chunks of a single download. Dropping the stream aborts the transfer.
pub type ChunkStream = BoxStream<'static, TransportResult<Bytes>>;

/// A directional byte stream against a remote endpoint.
///
/// Implementations must race their network I/O against `cancel` and return
/// [`TransportError::Cancelled`](crate::transport::TransportError::Cancelled)
/// as soon as it fires, so a stopped run never waits on a slow server.
#[async_trait]
pub trait TransferChannel: Send + Sync + 'static {
    /// Open a streamed download. Chunks are consumed (and discarded) by the caller.
    async fn download(&self, cancel: &CancellationToken) -> TransportResult<ChunkStream>;

    /// Send one fixed-size filler body and wait for the acknowledgment.
    ///
    /// Returns the number of bytes the remote side accepted.
    async fn upload(&self, cancel: &CancellationToken) -> TransportResult<u64>;

    /// Short label used in logs.
    fn name(&self) -> &str;
}
