// Common types for the streaming module

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for streaming operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors that can occur during streaming operations
#[derive(Debug, Error)]
pub enum StreamError {
    /// The initial handshake returned a non-2xx status. No body is processed.
    #[error("Connect failed: HTTP status {status}")]
    Connect { status: u16 },

    /// The stream dropped mid-read. Routed into the reconnect path.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Intentional teardown. Never retried, never surfaced as a failure.
    #[error("Stream cancelled")]
    Cancelled,

    /// A record's JSON payload failed to parse. Absorbed at the dispatch
    /// boundary; one bad record never terminates the loop.
    #[error("Decode error: {0}")]
    Decode(String),

    /// All reconnect attempts were consumed. Terminal.
    #[error("Gave up after {attempts} reconnect attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Connection state of a streaming session. Exactly one is active at a time;
/// there are never two live connections for the same session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum ConnectionState {
    /// No connection and none pending.
    Disconnected,

    /// A connect attempt is in flight.
    Connecting,

    /// The read loop is live.
    Connected,

    /// A backoff timer is pending before the next attempt.
    Reconnecting { attempt: u32, delay_ms: u64 },

    /// Retries exhausted. Persistent until a manual reconnect or teardown.
    Failed { attempts: u32 },
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// Counters for one streaming session
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SessionStats {
    pub frames_received: u64,
    pub samples_received: u64,
    pub dropped_frames: u64,
    pub points_committed: u64,
    pub reconnects: u64,
}
