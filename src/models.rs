// Wire data model for the metrics stream
//
// Shapes mirror the dashboard's SSE payloads: one `AgentMetrics` snapshot per
// monitored agent, with every scalar independently nullable (absence is not
// zero) and sub-metrics keyed by device/interface name rather than position.

use serde::{Deserialize, Serialize};

use crate::streaming::types::{StreamError, StreamResult};

/// Stable identifier of one monitored agent for the lifetime of a session.
pub type AgentId = i64;

/// Per-mount disk usage reported by an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiskMetrics {
    pub device: String,
    pub mountpoint: String,
    #[serde(default)]
    pub total_bytes: u64,
    #[serde(default)]
    pub used_bytes: u64,
    #[serde(default)]
    pub usage: f64,
}

/// Per-interface traffic counters and rates, keyed by interface name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceMetrics {
    pub name: String,
    #[serde(default)]
    pub ips: Vec<String>,
    #[serde(default)]
    pub sent_bytes: u64,
    #[serde(default)]
    pub recv_bytes: u64,
    #[serde(default)]
    pub sent_rate: Option<f64>,
    #[serde(default)]
    pub recv_rate: Option<f64>,
}

/// One full metrics snapshot for an agent as received over the wire.
///
/// Every scalar is independently nullable; a `null` (or missing) field means
/// "not reported", which is distinct from a reported zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentMetrics {
    pub agent_id: AgentId,
    pub agent_name: Option<String>,
    pub agent_ip: Option<String>,
    pub online: bool,
    pub cpu_usage: Option<f64>,
    pub memory_used: Option<f64>,
    pub memory_total: Option<f64>,
    pub memory_usage: Option<f64>,
    pub disk_used: Option<f64>,
    pub disk_total: Option<f64>,
    pub disk_usage: Option<f64>,
    pub network_rx_bytes: Option<f64>,
    pub network_tx_bytes: Option<f64>,
    pub network_rx_rate: Option<f64>,
    pub network_tx_rate: Option<f64>,
    pub load_average_1m: Option<f64>,
    pub load_average_5m: Option<f64>,
    pub load_average_15m: Option<f64>,
    pub process_count: Option<i64>,
    pub uptime_seconds: Option<f64>,
    pub temperature: Option<f64>,
    pub disks: Option<Vec<DiskMetrics>>,
    pub interfaces: Option<Vec<InterfaceMetrics>>,
    pub node_id: Option<String>,
    pub os: Option<String>,
    pub platform: Option<String>,
    pub timestamp: Option<String>,
    pub last_heartbeat: Option<String>,
}

/// Payload of an `init` record: the server sends either a single snapshot or
/// an array of them. Normalized to a `Vec` before entering the dispatcher so
/// downstream code never branches on runtime shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MetricsPayload {
    One(AgentMetrics),
    Many(Vec<AgentMetrics>),
}

impl MetricsPayload {
    pub fn into_vec(self) -> Vec<AgentMetrics> {
        match self {
            MetricsPayload::One(m) => vec![m],
            MetricsPayload::Many(v) => v,
        }
    }
}

/// A decoded stream record, ready for dispatch.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Keep-alive only, carries no data.
    Heartbeat,
    /// Full (re)seed of the latest-value cache.
    Init(Vec<AgentMetrics>),
    /// Single-agent update.
    Metrics(AgentMetrics),
    /// Batch update for several agents.
    MetricsAll(Vec<AgentMetrics>),
    /// Unrecognized event name; ignored for forward compatibility.
    Other,
}

impl StreamEvent {
    /// Decode an (event name, data) pair into a typed event.
    ///
    /// Unknown event names are not an error. Malformed JSON is a
    /// `StreamError::Decode`, absorbed by the dispatcher.
    pub fn decode(event: &str, data: &str) -> StreamResult<StreamEvent> {
        let decode_err = |e: serde_json::Error| StreamError::Decode(e.to_string());

        match event {
            "heartbeat" => Ok(StreamEvent::Heartbeat),
            "init" => {
                let payload: MetricsPayload = serde_json::from_str(data).map_err(decode_err)?;
                Ok(StreamEvent::Init(payload.into_vec()))
            }
            "metrics" => {
                let sample: AgentMetrics = serde_json::from_str(data).map_err(decode_err)?;
                Ok(StreamEvent::Metrics(sample))
            }
            "metrics-all" => {
                let samples: Vec<AgentMetrics> = serde_json::from_str(data).map_err(decode_err)?;
                Ok(StreamEvent::MetricsAll(samples))
            }
            _ => Ok(StreamEvent::Other),
        }
    }
}
