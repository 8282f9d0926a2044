// Real-time metrics streaming module
//
// Infrastructure for holding one persistent server-push connection, decoding
// its frames, and turning the unbounded-rate update stream into bounded,
// render-friendly structures.
//
// Architecture:
// - `parser`: incremental SSE frame decoder, tolerant of arbitrary chunk splits
// - `connection`: transport trait + HTTP implementation + reconnect policy
// - `cache`: latest-value map, one snapshot per agent
// - `history`: pending map + fixed-size per-agent history series
// - `client`: session lifecycle, dispatch, timers, teardown
// - `types`: error taxonomy, connection states, session statistics

pub mod cache;
pub mod client;
pub mod connection;
pub mod history;
pub mod parser;
pub mod types;

pub use cache::MetricsCache;
pub use client::{ClientEvent, MetricsStreamClient, StreamClientConfig};
pub use connection::{ChunkStream, HttpStreamTransport, ReconnectPolicy, StreamTransport};
pub use history::{HistoryAggregator, HistoryPoint, InterfaceRates};
pub use parser::{SseFrame, SseParser};
pub use types::{ConnectionState, SessionStats, StreamError, StreamResult};
