// Streaming client core for the Horizon agent-monitoring dashboard
//
// Converts the server's irregular, high-frequency metrics push stream into
// two bounded, UI-consumable structures per monitored agent: a latest-value
// cache and a fixed-size history series. The surrounding dashboard (CRUD
// forms, auth, rendering) is an external collaborator; it supplies agent ids
// and consumes what this crate produces.

pub mod models;
pub mod streaming;

pub use models::{AgentId, AgentMetrics, DiskMetrics, InterfaceMetrics, MetricsPayload, StreamEvent};
pub use streaming::{
    ClientEvent, ConnectionState, HistoryAggregator, HistoryPoint, HttpStreamTransport,
    InterfaceRates, MetricsCache, MetricsStreamClient, ReconnectPolicy, SessionStats,
    SseFrame, SseParser, StreamClientConfig, StreamError, StreamResult, StreamTransport,
};
