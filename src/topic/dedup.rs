use crate::config::core::{DedupConfig, DEDUPLICATION_CURSOR_NAME};
use crate::config::policy::TopicPolicies;
use crate::observability::logging::TopicLog;
use crate::observability::telemetry::DedupTelemetry;
use crate::runtime::clock::WallClock;
use crate::storage::log::{AppendLog, LogError, Position};
use crate::topic::context::{DedupVerdict, PublishContext};
use crate::topic::registry::ProducerRegistry;
use crate::wire::frame::{self, FrameError, MessageMetadata};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

const MODULE: &str = "topic::dedup";

/// Lifecycle of deduplication for one topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Initialized,
    Disabled,
    Recovering,
    Enabled,
    Removing,
    Failed,
}

/// Result of reconciling configuration against the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCheck {
    /// Status already matched the configuration.
    Unchanged,
    /// Deduplication was enabled (recovery completed).
    Enabled,
    /// Deduplication was disabled and its cursor removed.
    Disabled,
    /// A transition is already in flight; retry on a later tick.
    Deferred,
}

/// Consistency-threatening faults: the topic is not opened for publishing
/// until a later `check_status` succeeds.
#[derive(Debug, Error)]
pub enum DedupError {
    #[error("recovery cursor operation failed: {0}")]
    Cursor(LogError),
    #[error("recovery replay failed: {0}")]
    Replay(LogError),
    #[error("undecodable entry at {position} during replay: {source}")]
    Frame {
        position: Position,
        source: FrameError,
    },
}

struct StatusCell(AtomicU8);

impl StatusCell {
    fn new(status: Status) -> Self {
        Self(AtomicU8::new(Self::encode(status)))
    }

    fn get(&self) -> Status {
        Self::decode(self.0.load(Ordering::Acquire))
    }

    fn set(&self, status: Status) {
        self.0.store(Self::encode(status), Ordering::Release);
    }

    fn encode(status: Status) -> u8 {
        match status {
            Status::Initialized => 0,
            Status::Disabled => 1,
            Status::Recovering => 2,
            Status::Enabled => 3,
            Status::Removing => 4,
            Status::Failed => 5,
        }
    }

    fn decode(raw: u8) -> Status {
        match raw {
            0 => Status::Initialized,
            1 => Status::Disabled,
            2 => Status::Recovering,
            3 => Status::Enabled,
            4 => Status::Removing,
            _ => Status::Failed,
        }
    }
}

/// Per-topic deduplication engine.
///
/// Owns the `pushed`/`persisted` sequence maps, the recovery cursor, the
/// snapshot cadence, and the inactive-producer registry. Thread-safe: the
/// publish pipeline drives it serially per topic, while status checks,
/// purges, and time-based snapshots arrive from the maintenance thread.
pub struct DedupEngine {
    topic: String,
    log: Arc<dyn AppendLog>,
    config: DedupConfig,
    policies: Mutex<TopicPolicies>,
    status: StatusCell,
    /// Serializes status transitions and purges.
    transition: Mutex<()>,
    /// Highest sequence id accepted for append, per producer. Updated before
    /// any append is initiated.
    pushed: Mutex<HashMap<String, u64>>,
    /// Highest sequence id confirmed appended, per producer.
    persisted: Mutex<HashMap<String, u64>>,
    registry: ProducerRegistry,
    snapshot_counter: AtomicU64,
    last_snapshot_at_ms: AtomicU64,
    snapshot_taking: AtomicBool,
    clock: Arc<dyn WallClock>,
    events: TopicLog,
    telemetry: Arc<DedupTelemetry>,
}

impl DedupEngine {
    /// Creates the engine in `Initialized` state; call
    /// [`DedupEngine::check_status`] to reconcile it with configuration.
    pub fn new(
        topic: impl Into<String>,
        log: Arc<dyn AppendLog>,
        config: DedupConfig,
        policies: TopicPolicies,
        clock: Arc<dyn WallClock>,
        events: TopicLog,
        telemetry: Arc<DedupTelemetry>,
    ) -> Self {
        Self {
            topic: topic.into(),
            log,
            config,
            policies: Mutex::new(policies),
            status: StatusCell::new(Status::Initialized),
            transition: Mutex::new(()),
            pushed: Mutex::new(HashMap::new()),
            persisted: Mutex::new(HashMap::new()),
            registry: ProducerRegistry::new(),
            snapshot_counter: AtomicU64::new(0),
            last_snapshot_at_ms: AtomicU64::new(0),
            snapshot_taking: AtomicBool::new(false),
            clock,
            events,
            telemetry,
        }
    }

    /// The topic this engine belongs to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn status(&self) -> Status {
        self.status.get()
    }

    pub fn is_enabled(&self) -> bool {
        self.status.get() == Status::Enabled
    }

    /// True when the topic may accept publishes. Deduplication must be
    /// either active or deliberately off; a topic whose engine is still
    /// recovering, transitioning, or failed cannot classify safely and is
    /// not open for publishing.
    pub fn accepts_publishes(&self) -> bool {
        match self.status.get() {
            Status::Enabled | Status::Disabled => true,
            Status::Initialized => !self.should_be_enabled(),
            Status::Recovering | Status::Removing | Status::Failed => false,
        }
    }

    /// Broker-level configuration in effect.
    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Replaces the per-topic policy overrides. Takes effect on the next
    /// `check_status`.
    pub fn update_policies(&self, policies: TopicPolicies) {
        *self.policies.lock().unwrap() = policies;
    }

    fn should_be_enabled(&self) -> bool {
        self.policies.lock().unwrap().effective_enabled(&self.config)
    }

    fn is_remote_producer(&self, producer_name: &str) -> bool {
        producer_name.starts_with(&self.config.replicator_prefix)
    }

    /// Reconciles the status state machine with the configured toggle.
    ///
    /// Overlapping callers observe the in-flight transition and defer; the
    /// maintenance scheduler retries deferred checks on later ticks.
    pub fn check_status(&self) -> Result<StatusCheck, DedupError> {
        let Ok(_guard) = self.transition.try_lock() else {
            return Ok(StatusCheck::Deferred);
        };
        let should_be_enabled = self.should_be_enabled();
        match (self.status.get(), should_be_enabled) {
            (Status::Enabled, true) | (Status::Disabled, false) => Ok(StatusCheck::Unchanged),
            (Status::Initialized | Status::Disabled | Status::Failed, true) => self.enable(),
            (Status::Initialized | Status::Enabled | Status::Failed, false) => self.disable(),
            (Status::Recovering | Status::Removing, _) => Ok(StatusCheck::Deferred),
        }
    }

    fn enable(&self) -> Result<StatusCheck, DedupError> {
        self.status.set(Status::Recovering);
        match self.recover() {
            Ok(()) => {
                self.status.set(Status::Enabled);
                self.events.info(MODULE, "enabled deduplication");
                Ok(StatusCheck::Enabled)
            }
            Err(err) => {
                self.status.set(Status::Failed);
                self.events
                    .error(MODULE, &format!("failed to enable deduplication: {err}"));
                Err(err)
            }
        }
    }

    fn disable(&self) -> Result<StatusCheck, DedupError> {
        self.status.set(Status::Removing);
        match self.log.delete_cursor(DEDUPLICATION_CURSOR_NAME) {
            Ok(()) | Err(LogError::CursorNotFound(_)) => {
                self.pushed.lock().unwrap().clear();
                self.persisted.lock().unwrap().clear();
                self.status.set(Status::Disabled);
                self.events.info(MODULE, "disabled deduplication");
                Ok(StatusCheck::Disabled)
            }
            Err(err) => {
                self.status.set(Status::Failed);
                self.events
                    .warn(MODULE, &format!("failed to disable deduplication: {err}"));
                Err(DedupError::Cursor(err))
            }
        }
    }

    /// Rebuilds the sequence maps from the last snapshot plus a replay of
    /// every entry after the cursor watermark.
    fn recover(&self) -> Result<(), DedupError> {
        let cursor = self
            .log
            .open_cursor(DEDUPLICATION_CURSOR_NAME)
            .map_err(DedupError::Cursor)?;
        let now_ms = self.clock.now_ms();
        {
            let mut pushed = self.pushed.lock().unwrap();
            let mut persisted = self.persisted.lock().unwrap();
            for (name, &sequence_id) in &cursor.properties {
                let sequence_id = sequence_id.max(0) as u64;
                pushed.insert(name.clone(), sequence_id);
                persisted.insert(name.clone(), sequence_id);
                // Assume snapshotted producers are not connected; a later
                // connect clears the inactive record.
                self.registry.producer_removed(name, now_ms);
            }
        }

        let mut replayed = 0u64;
        let mut decode_failure: Option<(Position, FrameError)> = None;
        let last_position = self
            .log
            .replay_range(DEDUPLICATION_CURSOR_NAME, &mut |position, entry| {
                if decode_failure.is_some() {
                    return;
                }
                match frame::peek_metadata(entry) {
                    Ok(metadata) => {
                        let sequence_id = metadata.effective_highest_sequence_id();
                        let mut pushed = self.pushed.lock().unwrap();
                        let mut persisted = self.persisted.lock().unwrap();
                        merge_max(&mut pushed, &metadata.producer_name, sequence_id);
                        merge_max(&mut persisted, &metadata.producer_name, sequence_id);
                        drop(persisted);
                        drop(pushed);
                        self.registry.producer_removed(&metadata.producer_name, now_ms);
                        replayed += 1;
                    }
                    Err(err) => decode_failure = Some((position, err)),
                }
            })
            .map_err(DedupError::Replay)?;
        if let Some((position, source)) = decode_failure {
            return Err(DedupError::Frame { position, source });
        }

        self.telemetry.record_replayed_entries(replayed);
        self.events.info(
            MODULE,
            &format!("replayed {replayed} entries for deduplication"),
        );
        self.snapshot_counter.store(replayed, Ordering::SeqCst);
        if replayed >= self.config.snapshot_entry_interval {
            if let Some(position) = last_position {
                self.snapshot_counter.store(0, Ordering::SeqCst);
                self.take_snapshot(position);
            }
        }
        Ok(())
    }

    /// Classifies one publish. The context must already be annotated by the
    /// pipeline (replication marker flag, stashed source position).
    pub fn is_duplicate(
        &self,
        ctx: &mut PublishContext,
        metadata: &MessageMetadata,
    ) -> DedupVerdict {
        if !self.is_enabled() || ctx.is_marker() {
            return DedupVerdict::Fresh;
        }
        if self.is_remote_producer(ctx.producer_name()) {
            if ctx.supports_repl_dedup_by_lid_and_eid() && ctx.repl_source_position().is_some() {
                return self.is_duplicate_repl_v2(ctx);
            }
            return self.is_duplicate_repl_v1(ctx, metadata);
        }
        self.is_duplicate_normal(ctx, metadata, false)
    }

    /// Replicated message without source-position support: deduplicate on the
    /// source cluster's producer name and sequence id carried in the
    /// metadata, not the replicator's own session identity.
    fn is_duplicate_repl_v1(
        &self,
        ctx: &mut PublishContext,
        metadata: &MessageMetadata,
    ) -> DedupVerdict {
        ctx.set_original(
            metadata.producer_name.clone(),
            metadata.sequence_id,
            metadata.effective_highest_sequence_id(),
        );
        self.is_duplicate_normal(ctx, metadata, true)
    }

    fn is_duplicate_normal(
        &self,
        ctx: &mut PublishContext,
        metadata: &MessageMetadata,
        use_original: bool,
    ) -> DedupVerdict {
        let (producer_name, sequence_id, highest_sequence_id) = if use_original {
            (
                ctx.original_producer_name()
                    .unwrap_or_else(|| ctx.producer_name())
                    .to_string(),
                ctx.original_sequence_id().unwrap_or_else(|| ctx.sequence_id()),
                ctx.original_highest_sequence_id()
                    .unwrap_or_else(|| ctx.highest_sequence_id()),
            )
        } else {
            (
                ctx.producer_name().to_string(),
                ctx.sequence_id(),
                ctx.highest_sequence_id(),
            )
        };

        let chunk = if ctx.is_chunked() {
            metadata.chunk_id.zip(metadata.num_chunks)
        } else {
            None
        };
        // All chunks of a message share one sequence id, so only the last
        // chunk consults or updates the maps.
        if let Some((chunk_id, num_chunks)) = chunk {
            if chunk_id != num_chunks.saturating_sub(1) {
                ctx.set_last_chunk(false);
                return DedupVerdict::Fresh;
            }
        }

        {
            let mut pushed = self.pushed.lock().unwrap();
            if let Some(&last_pushed) = pushed.get(&producer_name) {
                if sequence_id <= last_pushed {
                    let persisted = self.persisted.lock().unwrap();
                    return match persisted.get(&producer_name) {
                        Some(&last_persisted) if sequence_id <= last_persisted => {
                            DedupVerdict::Duplicate
                        }
                        _ => DedupVerdict::Indeterminate,
                    };
                }
            }
            pushed.insert(producer_name, highest_sequence_id);
        }
        if chunk.is_some() {
            ctx.set_last_chunk(true);
        }
        DedupVerdict::Fresh
    }

    /// Replicated message carrying its source ledger position: deduplicate on
    /// the `(ledger id, entry id)` pair, tracked as two synthetic map keys.
    fn is_duplicate_repl_v2(&self, ctx: &PublishContext) -> DedupVerdict {
        let Some((new_lid, new_eid)) = ctx.repl_source_position() else {
            self.events.error(
                MODULE,
                &format!(
                    "missing source position for replicated message from {}",
                    ctx.producer_name()
                ),
            );
            return DedupVerdict::Indeterminate;
        };
        let lid_key = lid_key(ctx.producer_name());
        let eid_key = eid_key(ctx.producer_name());

        let mut pushed = self.pushed.lock().unwrap();
        if let (Some(&last_lid), Some(&last_eid)) = (pushed.get(&lid_key), pushed.get(&eid_key)) {
            if (new_lid, new_eid) <= (last_lid, last_eid) {
                let persisted = self.persisted.lock().unwrap();
                return match (persisted.get(&lid_key), persisted.get(&eid_key)) {
                    (Some(&lid), Some(&eid)) if (new_lid, new_eid) <= (lid, eid) => {
                        DedupVerdict::Duplicate
                    }
                    _ => DedupVerdict::Indeterminate,
                };
            }
        }
        pushed.insert(lid_key, new_lid);
        pushed.insert(eid_key, new_eid);
        DedupVerdict::Fresh
    }

    /// Records a successful append, updating `persisted` and driving the
    /// count-based snapshot trigger.
    pub fn record_persisted(&self, ctx: &PublishContext, position: Position) {
        if !self.is_enabled() || ctx.is_marker() {
            return;
        }
        if self.is_remote_producer(ctx.producer_name())
            && ctx.supports_repl_dedup_by_lid_and_eid()
        {
            self.record_persisted_repl(ctx, position);
        } else {
            self.record_persisted_normal(ctx, position);
        }
    }

    fn record_persisted_repl(&self, ctx: &PublishContext, position: Position) {
        let Some((lid, eid)) = ctx.repl_source_position() else {
            self.events.error(
                MODULE,
                &format!(
                    "missing source position while persisting replicated message from {}",
                    ctx.producer_name()
                ),
            );
            self.record_persisted_normal(ctx, position);
            return;
        };
        {
            let mut persisted = self.persisted.lock().unwrap();
            persisted.insert(lid_key(ctx.producer_name()), lid);
            persisted.insert(eid_key(ctx.producer_name()), eid);
        }
        self.bump_snapshot_counter(position);
    }

    fn record_persisted_normal(&self, ctx: &PublishContext, position: Position) {
        let (producer_name, highest_sequence_id) = match ctx.original_producer_name() {
            Some(original) => (
                original.to_string(),
                ctx.original_highest_sequence_id()
                    .unwrap_or_else(|| ctx.highest_sequence_id()),
            ),
            None => (ctx.producer_name().to_string(), ctx.highest_sequence_id()),
        };
        if ctx.is_last_chunk() != Some(false) {
            let mut persisted = self.persisted.lock().unwrap();
            merge_max(&mut persisted, &producer_name, highest_sequence_id);
        }
        self.bump_snapshot_counter(position);
    }

    fn bump_snapshot_counter(&self, position: Position) {
        let count = self.snapshot_counter.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= self.config.snapshot_entry_interval {
            self.snapshot_counter.store(0, Ordering::SeqCst);
            self.take_snapshot(position);
        }
    }

    /// Stores a bounded snapshot of `persisted` as the cursor properties and
    /// advances the watermark to `position`. Single-flight: a concurrent
    /// snapshot causes this one to be dropped, not queued.
    fn take_snapshot(&self, position: Position) {
        if self
            .snapshot_taking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.events.warn(
                MODULE,
                &format!("pending snapshot in progress, dropping snapshot at {position}"),
            );
            return;
        }
        let snapshot = self.build_snapshot();
        match self
            .log
            .mark_delete(DEDUPLICATION_CURSOR_NAME, position, snapshot)
        {
            Ok(()) => {
                self.last_snapshot_at_ms
                    .store(self.clock.now_ms(), Ordering::SeqCst);
                self.telemetry.record_snapshot();
            }
            Err(err) => {
                self.telemetry.record_snapshot_failure();
                self.events.warn(
                    MODULE,
                    &format!("failed to store deduplication snapshot at {position}: {err}"),
                );
            }
        }
        self.snapshot_taking.store(false, Ordering::Release);
    }

    fn build_snapshot(&self) -> BTreeMap<String, i64> {
        let persisted = self.persisted.lock().unwrap();
        let mut names: Vec<&String> = persisted.keys().collect();
        names.sort();
        names.truncate(self.config.max_producers_per_snapshot);
        names
            .into_iter()
            .map(|name| (name.clone(), persisted[name].min(i64::MAX as u64) as i64))
            .collect()
    }

    /// Time-based snapshot trigger, driven by the maintenance scheduler.
    /// Skips when disabled by policy, when the period has not elapsed, or
    /// when the log has not advanced past the cursor watermark.
    pub fn take_periodic_snapshot(&self) {
        if !self.is_enabled() {
            return;
        }
        let interval_seconds = self
            .policies
            .lock()
            .unwrap()
            .effective_snapshot_interval_seconds(&self.config);
        if interval_seconds == 0 {
            return;
        }
        let now_ms = self.clock.now_ms();
        let last_ms = self.last_snapshot_at_ms.load(Ordering::SeqCst);
        if now_ms.saturating_sub(last_ms) < interval_seconds.saturating_mul(1_000) {
            return;
        }
        let Some(position) = self.log.last_confirmed_position() else {
            return;
        };
        match self.log.mark_delete_position(DEDUPLICATION_CURSOR_NAME) {
            Ok(Some(watermark)) if position <= watermark => return,
            Ok(_) => {}
            Err(err) => {
                self.events.warn(
                    MODULE,
                    &format!("failed to read cursor watermark for snapshot: {err}"),
                );
                return;
            }
        }
        self.take_snapshot(position);
    }

    /// Removes producers inactive beyond the configured timeout from all
    /// maps, then persists the removals with a snapshot at the current
    /// watermark.
    pub fn purge_inactive_producers(&self) {
        let _guard = self.transition.lock().unwrap();
        if !self.is_enabled() {
            self.registry.clear();
            return;
        }
        let cutoff_ms = self
            .clock
            .now_ms()
            .saturating_sub(self.config.inactivity_timeout_ms());
        let expired = self.registry.drain_expired(cutoff_ms);
        if expired.is_empty() {
            return;
        }
        {
            let mut pushed = self.pushed.lock().unwrap();
            let mut persisted = self.persisted.lock().unwrap();
            for name in &expired {
                pushed.remove(name);
                persisted.remove(name);
                pushed.remove(&lid_key(name));
                persisted.remove(&lid_key(name));
                pushed.remove(&eid_key(name));
                persisted.remove(&eid_key(name));
            }
        }
        for name in &expired {
            self.events.info(
                MODULE,
                &format!("purged deduplication state for inactive producer {name}"),
            );
        }
        self.telemetry.record_purged_producers(expired.len() as u64);
        match self.log.mark_delete_position(DEDUPLICATION_CURSOR_NAME) {
            Ok(Some(position)) => self.take_snapshot(position),
            Ok(None) => {}
            Err(err) => self.events.warn(
                MODULE,
                &format!("failed to read cursor watermark for purge snapshot: {err}"),
            ),
        }
    }

    /// Records a producer connect.
    pub fn producer_added(&self, producer_name: &str) {
        if !self.is_enabled() {
            return;
        }
        self.registry.producer_added(producer_name);
    }

    /// Records a producer disconnect.
    pub fn producer_removed(&self, producer_name: &str) {
        if !self.is_enabled() {
            return;
        }
        self.registry
            .producer_removed(producer_name, self.clock.now_ms());
    }

    /// Highest sequence id accepted for append from the named producer, used
    /// to seed reconnecting producers and duplicate acks.
    pub fn last_published_sequence_id(&self, producer_name: &str) -> Option<u64> {
        self.pushed.lock().unwrap().get(producer_name).copied()
    }

    /// Highest sequence id confirmed appended for the named producer.
    pub fn persisted_sequence_id(&self, producer_name: &str) -> Option<u64> {
        self.persisted.lock().unwrap().get(producer_name).copied()
    }

    /// Discards the optimistic `pushed` overlay and re-seeds it from
    /// `persisted`. Called when topic ownership is fenced or handed off.
    pub fn reset_pushed_to_persisted(&self) {
        if !self.is_enabled() {
            return;
        }
        let mut pushed = self.pushed.lock().unwrap();
        let persisted = self.persisted.lock().unwrap();
        pushed.clear();
        for (name, &sequence_id) in persisted.iter() {
            pushed.insert(name.clone(), sequence_id);
        }
    }

    /// Inactive-producer registry, shared with the pipeline.
    pub fn registry(&self) -> &ProducerRegistry {
        &self.registry
    }

    /// Telemetry counters shared with the pipeline and scheduler.
    pub fn telemetry(&self) -> &Arc<DedupTelemetry> {
        &self.telemetry
    }
}

fn merge_max(map: &mut HashMap<String, u64>, key: &str, value: u64) {
    map.entry(key.to_string())
        .and_modify(|current| *current = (*current).max(value))
        .or_insert(value);
}

fn lid_key(producer_name: &str) -> String {
    format!("{producer_name}_LID")
}

fn eid_key(producer_name: &str) -> String {
    format!("{producer_name}_EID")
}
