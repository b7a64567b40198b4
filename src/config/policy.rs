use super::core::DedupConfig;
use serde::{Deserialize, Serialize};

/// Per-topic policy overrides layered over the broker defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicPolicies {
    /// Per-topic deduplication toggle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deduplication_enabled: Option<bool>,
    /// Per-topic time-based snapshot period; 0 disables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_interval_seconds: Option<u64>,
}

impl TopicPolicies {
    /// Overrides the deduplication toggle.
    pub fn with_deduplication(mut self, enabled: bool) -> Self {
        self.deduplication_enabled = Some(enabled);
        self
    }

    /// Overrides the time-based snapshot period.
    pub fn with_snapshot_interval_seconds(mut self, seconds: u64) -> Self {
        self.snapshot_interval_seconds = Some(seconds);
        self
    }

    /// Resolves the effective toggle against broker defaults.
    pub fn effective_enabled(&self, config: &DedupConfig) -> bool {
        self.deduplication_enabled.unwrap_or(config.enabled)
    }

    /// Resolves the effective time-based snapshot period against broker
    /// defaults. 0 means disabled.
    pub fn effective_snapshot_interval_seconds(&self, config: &DedupConfig) -> u64 {
        self.snapshot_interval_seconds
            .unwrap_or(config.snapshot_interval_seconds)
    }
}
