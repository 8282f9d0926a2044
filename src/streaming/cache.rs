// Latest-value cache
//
// Maps agent id to its most recently observed snapshot so consumers always
// have an immediate value between sampling ticks. No history; every update
// for an agent replaces its entry wholesale. Reads never block on the stream.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::models::{AgentId, AgentMetrics};

#[derive(Debug, Default)]
pub struct MetricsCache {
    inner: RwLock<HashMap<AgentId, AgentMetrics>>,
}

impl MetricsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace one agent's snapshot.
    pub fn insert(&self, sample: AgentMetrics) {
        self.inner.write().insert(sample.agent_id, sample);
    }

    /// Reseed the whole cache from an `init` record. Agents absent from the
    /// new set disappear, matching a fresh session bootstrap.
    pub fn reset(&self, samples: Vec<AgentMetrics>) {
        let mut map = HashMap::with_capacity(samples.len());
        for sample in samples {
            map.insert(sample.agent_id, sample);
        }
        *self.inner.write() = map;
    }

    /// Most recent snapshot for an agent, if any was observed.
    pub fn get(&self, id: AgentId) -> Option<AgentMetrics> {
        self.inner.read().get(&id).cloned()
    }

    /// Copy of the full map, for consumers rendering every agent at once.
    pub fn snapshot(&self) -> HashMap<AgentId, AgentMetrics> {
        self.inner.read().clone()
    }

    pub fn remove(&self, id: AgentId) -> Option<AgentMetrics> {
        self.inner.write().remove(&id)
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: AgentId, cpu: f64) -> AgentMetrics {
        AgentMetrics {
            agent_id: id,
            online: true,
            cpu_usage: Some(cpu),
            ..Default::default()
        }
    }

    #[test]
    fn insert_replaces_wholesale() {
        let cache = MetricsCache::new();
        cache.insert(sample(1, 10.0));
        cache.insert(sample(1, 20.0));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(1).unwrap().cpu_usage, Some(20.0));
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn reset_drops_absent_agents() {
        let cache = MetricsCache::new();
        cache.insert(sample(1, 10.0));
        cache.insert(sample(2, 20.0));

        cache.reset(vec![sample(2, 25.0), sample(3, 30.0)]);

        assert!(cache.get(1).is_none());
        assert_eq!(cache.get(2).unwrap().cpu_usage, Some(25.0));
        assert_eq!(cache.get(3).unwrap().cpu_usage, Some(30.0));
    }

    #[test]
    fn clear_empties_the_map() {
        let cache = MetricsCache::new();
        cache.insert(sample(1, 10.0));
        cache.clear();
        assert!(cache.is_empty());
    }
}
