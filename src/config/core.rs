use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the recovery cursor owned by the deduplication engine.
pub const DEDUPLICATION_CURSOR_NAME: &str = "pelago.dedup";

/// Broker-level deduplication defaults, overridable per topic via
/// [`crate::config::policy::TopicPolicies`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Whether deduplication is enabled for topics with no per-topic override.
    pub enabled: bool,
    /// Persisted entries between count-based snapshots.
    pub snapshot_entry_interval: u64,
    /// Cap on the number of producers retained in one snapshot.
    pub max_producers_per_snapshot: usize,
    /// Inactivity window after which a disconnected producer is purged.
    pub producer_inactivity_timeout_minutes: u64,
    /// Default period of time-based snapshots; 0 disables them.
    pub snapshot_interval_seconds: u64,
    /// Producer-name prefix identifying remote (replicated) producers.
    pub replicator_prefix: String,
    /// Cap on concurrently in-flight appends per topic.
    pub max_in_flight_appends: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            snapshot_entry_interval: 1_000,
            max_producers_per_snapshot: 10_000,
            producer_inactivity_timeout_minutes: 360,
            snapshot_interval_seconds: 120,
            replicator_prefix: "pelago.repl".to_string(),
            max_in_flight_appends: 1_000,
        }
    }
}

impl DedupConfig {
    /// Validates knob values, returning the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.snapshot_entry_interval == 0 {
            return Err(ConfigError::InvalidKnob {
                knob: "snapshot_entry_interval",
                reason: "must be at least 1".into(),
            });
        }
        if self.max_producers_per_snapshot == 0 {
            return Err(ConfigError::InvalidKnob {
                knob: "max_producers_per_snapshot",
                reason: "must be at least 1".into(),
            });
        }
        if self.replicator_prefix.is_empty() {
            return Err(ConfigError::InvalidKnob {
                knob: "replicator_prefix",
                reason: "must not be empty".into(),
            });
        }
        if self.max_in_flight_appends == 0 {
            return Err(ConfigError::InvalidKnob {
                knob: "max_in_flight_appends",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Inactivity cutoff window in milliseconds.
    pub fn inactivity_timeout_ms(&self) -> u64 {
        self.producer_inactivity_timeout_minutes
            .saturating_mul(60_000)
    }
}

/// Errors surfaced by configuration validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {knob}: {reason}")]
    InvalidKnob {
        knob: &'static str,
        reason: String,
    },
}
