use pelago::{
    DedupConfig, InMemoryLog, JsonLineLogger, ManualClock, MessageMetadata,
    PublishContext, PublishOutcome, PublishPipeline, TopicPolicies, REPL_SOURCE_POSITION_KEY,
};
use std::sync::{Arc, Mutex};

struct Harness {
    clock: Arc<ManualClock>,
    pipeline: PublishPipeline,
}

fn harness() -> Harness {
    // Interval of 1 snapshots every append, so the cursor watermark exists
    // before any purge runs.
    let config = DedupConfig {
        enabled: true,
        snapshot_entry_interval: 1,
        ..DedupConfig::default()
    };
    let clock = Arc::new(ManualClock::starting_at(1_000));
    let logger = Arc::new(Mutex::new(JsonLineLogger::default()));
    let pipeline = PublishPipeline::new(
        "tenant/ns/orders",
        Arc::new(InMemoryLog::new()),
        config,
        TopicPolicies::default(),
        clock.clone(),
        logger,
    );
    pipeline.engine().check_status().expect("enable dedup");
    Harness { clock, pipeline }
}

fn publish(pipeline: &PublishPipeline, producer: &str, sequence_id: u64) -> PublishOutcome {
    let metadata = MessageMetadata::new(producer, sequence_id);
    let mut ctx = PublishContext::new(producer, sequence_id);
    pipeline.publish(&mut ctx, &metadata, b"payload")
}

#[test]
fn expired_producers_are_removed_and_snapshotted() {
    let sim = harness();
    let engine = sim.pipeline.engine();
    assert!(matches!(
        publish(&sim.pipeline, "beta", 0),
        PublishOutcome::Accepted { .. }
    ));
    sim.pipeline.on_producer_disconnect("beta");

    sim.clock.advance(engine.config().inactivity_timeout_ms() + 1);
    let snapshots_before = sim.pipeline.telemetry().snapshot_total();
    engine.purge_inactive_producers();

    assert_eq!(engine.last_published_sequence_id("beta"), None);
    assert_eq!(engine.persisted_sequence_id("beta"), None);
    assert!(!engine.registry().is_inactive("beta"));
    assert_eq!(
        sim.pipeline.telemetry().snapshot_total(),
        snapshots_before + 1
    );
    assert_eq!(sim.pipeline.telemetry().purged_producer_total(), 1);
}

#[test]
fn recently_active_producers_survive_the_purge() {
    let sim = harness();
    let engine = sim.pipeline.engine();
    publish(&sim.pipeline, "beta", 0);
    sim.pipeline.on_producer_disconnect("beta");

    sim.clock.advance(engine.config().inactivity_timeout_ms() / 2);
    engine.purge_inactive_producers();

    assert_eq!(engine.last_published_sequence_id("beta"), Some(0));
    assert!(engine.registry().is_inactive("beta"));
}

#[test]
fn reconnect_cancels_the_pending_purge() {
    let sim = harness();
    let engine = sim.pipeline.engine();
    publish(&sim.pipeline, "beta", 0);
    sim.pipeline.on_producer_disconnect("beta");
    sim.clock.advance(engine.config().inactivity_timeout_ms() + 1);

    sim.pipeline.on_producer_connect("beta");
    engine.purge_inactive_producers();

    // The reconnected producer keeps its sequence history.
    assert_eq!(engine.last_published_sequence_id("beta"), Some(0));
    assert_eq!(sim.pipeline.telemetry().purged_producer_total(), 0);
}

#[test]
fn purge_when_disabled_only_clears_the_registry() {
    let sim = harness();
    let engine = sim.pipeline.engine();
    publish(&sim.pipeline, "beta", 0);
    sim.pipeline.on_producer_disconnect("beta");

    sim.pipeline
        .update_policies(TopicPolicies::default().with_deduplication(false))
        .expect("disable");
    assert!(engine.registry().is_inactive("beta"));

    sim.clock.advance(engine.config().inactivity_timeout_ms() + 1);
    engine.purge_inactive_producers();
    assert!(!engine.registry().is_inactive("beta"));
    assert_eq!(sim.pipeline.telemetry().purged_producer_total(), 0);
}

#[test]
fn purging_a_remote_producer_drops_its_synthetic_keys() {
    let sim = harness();
    let engine = sim.pipeline.engine();
    let remote = "pelago.repl.west";
    let metadata =
        MessageMetadata::new(remote, 5).with_property(REPL_SOURCE_POSITION_KEY, "10:5");
    let mut ctx = PublishContext::new(remote, 5).with_repl_v2_support();
    assert!(matches!(
        sim.pipeline.publish(&mut ctx, &metadata, b"replicated"),
        PublishOutcome::Accepted { .. }
    ));
    assert_eq!(
        engine.persisted_sequence_id(&format!("{remote}_LID")),
        Some(10)
    );

    sim.pipeline.on_producer_disconnect(remote);
    sim.clock.advance(engine.config().inactivity_timeout_ms() + 1);
    engine.purge_inactive_producers();

    assert_eq!(engine.persisted_sequence_id(&format!("{remote}_LID")), None);
    assert_eq!(engine.persisted_sequence_id(&format!("{remote}_EID")), None);
    assert_eq!(engine.last_published_sequence_id(&format!("{remote}_LID")), None);
}
