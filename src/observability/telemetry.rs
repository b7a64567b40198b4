use std::sync::atomic::{AtomicU64, Ordering};

/// Counters tracked along the publish and maintenance paths.
///
/// Shared by reference between the engine, the pipeline, and the scheduler;
/// all updates are relaxed atomics.
#[derive(Debug, Default)]
pub struct DedupTelemetry {
    accepted_total: AtomicU64,
    duplicate_total: AtomicU64,
    indeterminate_total: AtomicU64,
    rejected_total: AtomicU64,
    snapshot_total: AtomicU64,
    snapshot_failure_total: AtomicU64,
    purged_producer_total: AtomicU64,
    replayed_entry_total: AtomicU64,
}

impl DedupTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_accepted(&self) {
        self.accepted_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_duplicate(&self) {
        self.duplicate_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_indeterminate(&self) {
        self.indeterminate_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_snapshot(&self) {
        self.snapshot_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_snapshot_failure(&self) {
        self.snapshot_failure_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_purged_producers(&self, count: u64) {
        self.purged_producer_total
            .fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_replayed_entries(&self, count: u64) {
        self.replayed_entry_total
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn accepted_total(&self) -> u64 {
        self.accepted_total.load(Ordering::Relaxed)
    }

    pub fn duplicate_total(&self) -> u64 {
        self.duplicate_total.load(Ordering::Relaxed)
    }

    pub fn indeterminate_total(&self) -> u64 {
        self.indeterminate_total.load(Ordering::Relaxed)
    }

    pub fn rejected_total(&self) -> u64 {
        self.rejected_total.load(Ordering::Relaxed)
    }

    pub fn snapshot_total(&self) -> u64 {
        self.snapshot_total.load(Ordering::Relaxed)
    }

    pub fn snapshot_failure_total(&self) -> u64 {
        self.snapshot_failure_total.load(Ordering::Relaxed)
    }

    pub fn purged_producer_total(&self) -> u64 {
        self.purged_producer_total.load(Ordering::Relaxed)
    }

    pub fn replayed_entry_total(&self) -> u64 {
        self.replayed_entry_total.load(Ordering::Relaxed)
    }

    /// Renders counters as Prometheus exposition text.
    pub fn render_metrics(&self) -> String {
        format!(
            "pelago_publish_accepted_total {}\n\
             pelago_publish_duplicate_total {}\n\
             pelago_publish_indeterminate_total {}\n\
             pelago_publish_rejected_total {}\n\
             pelago_dedup_snapshot_total {}\n\
             pelago_dedup_snapshot_failure_total {}\n\
             pelago_dedup_purged_producer_total {}\n\
             pelago_dedup_replayed_entry_total {}\n",
            self.accepted_total(),
            self.duplicate_total(),
            self.indeterminate_total(),
            self.rejected_total(),
            self.snapshot_total(),
            self.snapshot_failure_total(),
            self.purged_producer_total(),
            self.replayed_entry_total(),
        )
    }
}
