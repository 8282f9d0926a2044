// Streaming transport layer
//
// `StreamTransport` abstracts how the persistent server-push connection is
// opened so tests can inject scripted streams without a network. The
// production implementation speaks the dashboard's SSE endpoint over a
// long-lived HTTP GET. `ReconnectPolicy` holds the backoff schedule shared by
// the session loop.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header;

use crate::models::AgentId;
use crate::streaming::types::{StreamError, StreamResult};

/// One open response body, consumed chunk by chunk.
#[async_trait]
pub trait ChunkStream: Send {
    /// Next chunk of the body. `Ok(None)` is a clean end-of-stream; errors
    /// are transport faults that route into the reconnect path.
    async fn next_chunk(&mut self) -> StreamResult<Option<Bytes>>;
}

impl std::fmt::Debug for dyn ChunkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChunkStream")
    }
}

/// Opens one persistent push connection, optionally scoped to a single agent.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn open(&self, scope: Option<AgentId>) -> StreamResult<Box<dyn ChunkStream>>;
}

/// Exponential backoff schedule: `delay = min(base * 2^failures, cap)`,
/// bounded in attempt count.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the next attempt, given the number of consecutive
    /// failures so far.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn exhausted(&self, failures: u32) -> bool {
        failures >= self.max_attempts
    }
}

/// Production transport: `GET {base_url}/metrics/stream[/{agentId}]` with a
/// bearer token, expecting a `text/event-stream` body.
pub struct HttpStreamTransport {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl HttpStreamTransport {
    pub fn new(base_url: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            // No overall request timeout: the response body is a long-lived
            // stream. Only the connect phase is bounded.
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.into(),
            access_token,
        }
    }

    fn stream_url(&self, scope: Option<AgentId>) -> String {
        let base = self.base_url.trim_end_matches('/');
        match scope {
            Some(id) => format!("{}/metrics/stream/{}", base, id),
            None => format!("{}/metrics/stream", base),
        }
    }
}

#[async_trait]
impl StreamTransport for HttpStreamTransport {
    async fn open(&self, scope: Option<AgentId>) -> StreamResult<Box<dyn ChunkStream>> {
        let url = self.stream_url(scope);
        log::debug!("Opening metrics stream: {}", url);

        let mut request = self
            .client
            .get(&url)
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache");
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(StreamError::Connect {
                status: response.status().as_u16(),
            });
        }

        Ok(Box::new(HttpChunkStream {
            inner: response.bytes_stream().boxed(),
        }))
    }
}

struct HttpChunkStream {
    inner: BoxStream<'static, reqwest::Result<Bytes>>,
}

#[async_trait]
impl ChunkStream for HttpChunkStream {
    async fn next_chunk(&mut self) -> StreamResult<Option<Bytes>> {
        match self.inner.next().await {
            Some(Ok(bytes)) => Ok(Some(bytes)),
            Some(Err(e)) => Err(StreamError::Transport(e.to_string())),
            None => Ok(None),
        }
    }
}
