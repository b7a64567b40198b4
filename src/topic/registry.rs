use std::collections::HashMap;
use std::sync::Mutex;

/// Tracks disconnected producers and the timestamp of their last activity.
///
/// Connected producers have no entry; an entry appears on disconnect and is
/// removed on reconnect or purge.
#[derive(Debug, Default)]
pub struct ProducerRegistry {
    inactive: Mutex<HashMap<String, u64>>,
}

impl ProducerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a producer connect: the producer is no longer inactive.
    pub fn producer_added(&self, producer_name: &str) {
        self.inactive.lock().unwrap().remove(producer_name);
    }

    /// Records a producer disconnect at the given timestamp.
    pub fn producer_removed(&self, producer_name: &str, now_ms: u64) {
        self.inactive
            .lock()
            .unwrap()
            .insert(producer_name.to_string(), now_ms);
    }

    /// Removes and returns every producer whose last activity predates the
    /// cutoff.
    pub fn drain_expired(&self, cutoff_ms: u64) -> Vec<String> {
        let mut inactive = self.inactive.lock().unwrap();
        let expired: Vec<String> = inactive
            .iter()
            .filter(|(_, last_active)| **last_active < cutoff_ms)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &expired {
            inactive.remove(name);
        }
        expired
    }

    /// Drops all inactive-producer records.
    pub fn clear(&self) {
        self.inactive.lock().unwrap().clear();
    }

    /// True when the producer is currently tracked as inactive.
    pub fn is_inactive(&self, producer_name: &str) -> bool {
        self.inactive.lock().unwrap().contains_key(producer_name)
    }

    /// Number of tracked inactive producers.
    pub fn inactive_count(&self) -> usize {
        self.inactive.lock().unwrap().len()
    }
}
