use crate::transport::channel::{ChunkStream, TransferChannel};
use crate::transport::error::{TransportError, TransportResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use rand::RngCore;
use reqwest::{header, Client, Url};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Size of the filler body sent by each upload attempt.
pub const DEFAULT_UPLOAD_CHUNK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct HttpChannelConfig {
    /// Download sources, used round-robin
    pub download_urls: Vec<String>,
    /// Endpoint accepting POSTed filler bodies
    pub upload_url: Option<String>,
    pub upload_chunk_size: usize,
    pub connect_timeout: Duration,
    /// Upload request timeout, and max idle gap between download chunks
    pub request_timeout: Duration,
}

impl Default for HttpChannelConfig {
    fn default() -> Self {
        Self {
            download_urls: vec!["https://speed.cloudflare.com/__down?bytes=104857600".into()],
            upload_url: Some("https://speed.cloudflare.com/__up".into()),
            upload_chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP transfer channel backed by a shared reqwest client.
pub struct HttpChannel {
    client: Client,
    download_urls: Vec<Url>,
    upload_url: Option<Url>,
    filler: Bytes,
    request_timeout: Duration,
    cursor: AtomicUsize,
}

impl HttpChannel {
    pub fn new(config: HttpChannelConfig) -> TransportResult<Self> {
        let download_urls = config
            .download_urls
            .iter()
            .map(|raw| parse_url(raw))
            .collect::<TransportResult<Vec<_>>>()?;
        let upload_url = config.upload_url.as_deref().map(parse_url).transpose()?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        // Random bytes so compressing proxies can't shrink the payload
        let mut filler = vec![0u8; config.upload_chunk_size];
        rand::thread_rng().fill_bytes(&mut filler);

        Ok(Self {
            client,
            download_urls,
            upload_url,
            filler: Bytes::from(filler),
            request_timeout: config.request_timeout,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Size of each upload body in bytes
    pub fn upload_chunk_size(&self) -> usize {
        self.filler.len()
    }

    fn next_download_url(&self) -> TransportResult<Url> {
        if self.download_urls.is_empty() {
            return Err(TransportError::NoEndpoint("download"));
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.download_urls.len();
        let mut url = self.download_urls[idx].clone();
        url.query_pairs_mut()
            .append_pair("nocache", &rand::random::<u64>().to_string());
        Ok(url)
    }
}

fn parse_url(raw: &str) -> TransportResult<Url> {
    Url::parse(raw).map_err(|e| TransportError::ConnectionFailed(format!("invalid url {raw}: {e}")))
}

fn check_status(response: &reqwest::Response) -> TransportResult<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(TransportError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }
}

#[async_trait]
impl TransferChannel for HttpChannel {
    async fn download(&self, cancel: &CancellationToken) -> TransportResult<ChunkStream> {
        let url = self.next_download_url()?;
        tracing::debug!("GET {}", url);

        // The timeout covers the wait for headers; the body stream has its own idle timeout
        let idle = self.request_timeout;
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            result = tokio::time::timeout(idle, self.client.get(url).send()) => match result {
                Ok(sent) => sent?,
                Err(_) => {
                    return Err(TransportError::Timeout(format!("no response headers within {idle:?}")))
                }
            },
        };
        check_status(&response)?;

        let body = Box::pin(response.bytes_stream());
        let stream = futures::stream::unfold(body, move |mut body| async move {
            match tokio::time::timeout(idle, body.next()).await {
                Ok(Some(Ok(chunk))) => Some((Ok(chunk), body)),
                Ok(Some(Err(e))) => Some((Err(TransportError::from(e)), body)),
                Ok(None) => None,
                Err(_) => Some((
                    Err(TransportError::Timeout(format!("no data for {idle:?}"))),
                    body,
                )),
            }
        });

        Ok(stream.boxed())
    }

    async fn upload(&self, cancel: &CancellationToken) -> TransportResult<u64> {
        let url = self
            .upload_url
            .clone()
            .ok_or(TransportError::NoEndpoint("upload"))?;

        let request = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .timeout(self.request_timeout)
            .body(self.filler.clone());

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            result = request.send() => result?,
        };
        check_status(&response)?;

        Ok(self.filler.len() as u64)
    }

    fn name(&self) -> &str {
        "http"
    }
}
