// History aggregation
//
// Two-stage buffering that decouples the unbounded-rate push stream from the
// fixed-rate chart series. Stage one is a pending map holding the latest
// projected point per agent; stage two is a periodic commit that appends one
// point per pending agent into that agent's bounded history, stamped with the
// commit time so the series forms a regular grid. Burst updates within one
// interval collapse into a single committed point.
//
// The pending map is not drained by a commit and not cleared on disconnect:
// history keeps reflecting the last known values across reconnects until the
// agent reports again or the consumer clears it explicitly.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::models::{AgentId, AgentMetrics};

pub const DEFAULT_MAX_POINTS: usize = 60;

/// Per-interface rate breakdown carried in a history point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceRates {
    pub rx_rate: Option<f64>,
    pub tx_rate: Option<f64>,
}

/// Reduced, fixed-shape projection of a sample, taken at a sampling tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    /// Commit time, not the original sample time.
    pub timestamp: DateTime<Utc>,
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
    pub disk_usage: Option<f64>,
    pub network_rx_rate: Option<f64>,
    pub network_tx_rate: Option<f64>,
    pub temperature: Option<f64>,
    pub interface_rates: Option<HashMap<String, InterfaceRates>>,
}

/// Owns the pending map and one bounded series per agent.
#[derive(Debug)]
pub struct HistoryAggregator {
    max_points: usize,
    pending: RwLock<HashMap<AgentId, HistoryPoint>>,
    histories: RwLock<HashMap<AgentId, VecDeque<HistoryPoint>>>,
}

impl HistoryAggregator {
    pub fn new(max_points: usize) -> Self {
        Self {
            max_points,
            pending: RwLock::new(HashMap::new()),
            histories: RwLock::new(HashMap::new()),
        }
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    /// Queue a sample as the agent's pending point for the next tick.
    ///
    /// Offline samples are skipped: an offline agent contributes no chart
    /// points. Rate fields reported as null fall back to the previous pending
    /// value; a reported zero is a present value and is kept as-is.
    pub fn record(&self, sample: &AgentMetrics) {
        if !sample.online {
            return;
        }
        let mut pending = self.pending.write();
        let point = Self::project(sample, pending.get(&sample.agent_id), Utc::now());
        pending.insert(sample.agent_id, point);
    }

    pub fn record_all(&self, samples: &[AgentMetrics]) {
        for sample in samples {
            self.record(sample);
        }
    }

    /// Commit one point per pending agent, evicting the oldest point of any
    /// series that exceeds `max_points`. Returns the number of points
    /// committed. The pending snapshot is taken under one lock, so a commit
    /// never observes a half-applied update.
    pub fn commit(&self, now: DateTime<Utc>) -> usize {
        let snapshot: Vec<(AgentId, HistoryPoint)> = {
            let pending = self.pending.read();
            if pending.is_empty() {
                return 0;
            }
            pending.iter().map(|(id, p)| (*id, p.clone())).collect()
        };

        let committed = snapshot.len();
        let mut histories = self.histories.write();
        for (id, mut point) in snapshot {
            point.timestamp = now;
            let series = histories
                .entry(id)
                .or_insert_with(|| VecDeque::with_capacity(self.max_points + 1));
            series.push_back(point);
            if series.len() > self.max_points {
                series.pop_front();
            }
        }
        committed
    }

    /// Ordered points for one agent, oldest first.
    pub fn history(&self, id: AgentId) -> Vec<HistoryPoint> {
        self.histories
            .read()
            .get(&id)
            .map(|series| series.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_pending(&self, id: AgentId) -> bool {
        self.pending.read().contains_key(&id)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.read().len()
    }

    /// Drop one agent's series and pending value.
    pub fn clear(&self, id: AgentId) {
        self.histories.write().remove(&id);
        self.pending.write().remove(&id);
    }

    /// Reset everything.
    pub fn clear_all(&self) {
        self.histories.write().clear();
        self.pending.write().clear();
    }

    fn project(
        sample: &AgentMetrics,
        prev: Option<&HistoryPoint>,
        now: DateTime<Utc>,
    ) -> HistoryPoint {
        let interface_rates = match sample.interfaces.as_ref() {
            Some(interfaces) => Some(
                interfaces
                    .iter()
                    .map(|nic| {
                        let carried = prev
                            .and_then(|p| p.interface_rates.as_ref())
                            .and_then(|rates| rates.get(&nic.name));
                        (
                            nic.name.clone(),
                            InterfaceRates {
                                rx_rate: nic.recv_rate.or_else(|| carried.and_then(|c| c.rx_rate)),
                                tx_rate: nic.sent_rate.or_else(|| carried.and_then(|c| c.tx_rate)),
                            },
                        )
                    })
                    .collect(),
            ),
            None => prev.and_then(|p| p.interface_rates.clone()),
        };

        HistoryPoint {
            timestamp: now,
            cpu_usage: sample.cpu_usage,
            memory_usage: sample.memory_usage,
            disk_usage: sample.disk_usage,
            network_rx_rate: sample
                .network_rx_rate
                .or_else(|| prev.and_then(|p| p.network_rx_rate)),
            network_tx_rate: sample
                .network_tx_rate
                .or_else(|| prev.and_then(|p| p.network_tx_rate)),
            temperature: sample.temperature,
            interface_rates,
        }
    }
}

impl Default for HistoryAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POINTS)
    }
}
