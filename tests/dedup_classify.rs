use pelago::{
    Admission, DedupConfig, InMemoryLog, JsonLineLogger, ManualClock,
    MessageMetadata, PublishContext, PublishOutcome, PublishPipeline, TopicPolicies,
};
use std::sync::{Arc, Mutex};

fn enabled_pipeline(log: Arc<InMemoryLog>) -> PublishPipeline {
    let config = DedupConfig {
        enabled: true,
        ..DedupConfig::default()
    };
    let logger = Arc::new(Mutex::new(JsonLineLogger::default()));
    let pipeline = PublishPipeline::new(
        "tenant/ns/orders",
        log,
        config,
        TopicPolicies::default(),
        Arc::new(ManualClock::starting_at(1_000)),
        logger,
    );
    pipeline.engine().check_status().expect("enable dedup");
    pipeline
}

fn publish(pipeline: &PublishPipeline, producer: &str, sequence_id: u64) -> PublishOutcome {
    let metadata = MessageMetadata::new(producer, sequence_id);
    let mut ctx = PublishContext::new(producer, sequence_id);
    pipeline.publish(&mut ctx, &metadata, b"payload")
}

#[test]
fn accepts_fresh_and_rejects_replayed_sequence_ids() {
    let pipeline = enabled_pipeline(Arc::new(InMemoryLog::new()));
    assert!(matches!(
        publish(&pipeline, "alpha", 0),
        PublishOutcome::Accepted { sequence_id: 0, .. }
    ));
    assert!(matches!(
        publish(&pipeline, "alpha", 1),
        PublishOutcome::Accepted { sequence_id: 1, .. }
    ));
    assert_eq!(
        publish(&pipeline, "alpha", 1),
        PublishOutcome::Duplicate {
            sequence_id: 1,
            last_sequence_id: Some(1),
        }
    );
    assert!(matches!(
        publish(&pipeline, "alpha", 2),
        PublishOutcome::Accepted { sequence_id: 2, .. }
    ));

    let engine = pipeline.engine();
    assert_eq!(engine.last_published_sequence_id("alpha"), Some(2));
    assert_eq!(engine.persisted_sequence_id("alpha"), Some(2));
}

#[test]
fn sequence_zero_is_distinguishable_from_absent() {
    let pipeline = enabled_pipeline(Arc::new(InMemoryLog::new()));
    assert_eq!(pipeline.engine().last_published_sequence_id("alpha"), None);
    assert!(matches!(
        publish(&pipeline, "alpha", 0),
        PublishOutcome::Accepted { .. }
    ));
    assert!(matches!(
        publish(&pipeline, "alpha", 0),
        PublishOutcome::Duplicate { .. }
    ));
    assert_eq!(pipeline.engine().last_published_sequence_id("alpha"), Some(0));
}

#[test]
fn producers_are_classified_independently() {
    let pipeline = enabled_pipeline(Arc::new(InMemoryLog::new()));
    assert!(matches!(
        publish(&pipeline, "alpha", 4),
        PublishOutcome::Accepted { .. }
    ));
    // beta has never published sequence 4
    assert!(matches!(
        publish(&pipeline, "beta", 4),
        PublishOutcome::Accepted { .. }
    ));
    assert!(matches!(
        publish(&pipeline, "beta", 4),
        PublishOutcome::Duplicate { .. }
    ));
}

#[test]
fn duplicate_before_persistence_is_indeterminate() {
    let pipeline = enabled_pipeline(Arc::new(InMemoryLog::new()));
    let metadata = MessageMetadata::new("alpha", 5);

    let mut first = PublishContext::new("alpha", 5);
    let ticket = match pipeline.admit(&mut first, &metadata, b"payload") {
        Admission::Admitted(ticket) => ticket,
        Admission::Settled(outcome) => panic!("first publish settled early: {outcome:?}"),
    };

    // A retry arriving before the first append completes cannot be judged.
    let mut second = PublishContext::new("alpha", 5);
    assert!(matches!(
        pipeline.admit(&mut second, &metadata, b"payload"),
        Admission::Settled(PublishOutcome::Indeterminate { sequence_id: 5 })
    ));

    assert!(matches!(
        pipeline.complete(&first, ticket),
        PublishOutcome::Accepted { .. }
    ));

    let mut third = PublishContext::new("alpha", 5);
    assert!(matches!(
        pipeline.publish(&mut third, &metadata, b"payload"),
        PublishOutcome::Duplicate { sequence_id: 5, .. }
    ));
}

#[test]
fn batch_upper_bound_advances_pushed() {
    let pipeline = enabled_pipeline(Arc::new(InMemoryLog::new()));
    let metadata = MessageMetadata::new("alpha", 3).with_highest_sequence_id(9);
    let mut ctx = PublishContext::new("alpha", 3).with_highest_sequence_id(9);
    assert!(matches!(
        pipeline.publish(&mut ctx, &metadata, b"batch"),
        PublishOutcome::Accepted { .. }
    ));
    assert_eq!(pipeline.engine().last_published_sequence_id("alpha"), Some(9));
    assert_eq!(pipeline.engine().persisted_sequence_id("alpha"), Some(9));

    // Any sequence id inside the acknowledged batch range is a duplicate.
    assert!(matches!(
        publish(&pipeline, "alpha", 7),
        PublishOutcome::Duplicate { .. }
    ));
    assert!(matches!(
        publish(&pipeline, "alpha", 10),
        PublishOutcome::Accepted { .. }
    ));
}

#[test]
fn persisted_never_exceeds_pushed() {
    let pipeline = enabled_pipeline(Arc::new(InMemoryLog::new()));
    let engine = pipeline.engine();
    for sequence_id in 0..5u64 {
        publish(&pipeline, "alpha", sequence_id);
        let pushed = engine.last_published_sequence_id("alpha").unwrap();
        let persisted = engine.persisted_sequence_id("alpha").unwrap();
        assert!(persisted <= pushed);
    }
}

#[test]
fn disabled_engine_classifies_nothing() {
    let log = Arc::new(InMemoryLog::new());
    let logger = Arc::new(Mutex::new(JsonLineLogger::default()));
    let pipeline = PublishPipeline::new(
        "tenant/ns/orders",
        log,
        DedupConfig::default(),
        TopicPolicies::default(),
        Arc::new(ManualClock::starting_at(1_000)),
        logger,
    );
    pipeline.engine().check_status().expect("status check");
    assert!(!pipeline.engine().is_enabled());

    // Repeated sequence ids pass straight through to the log.
    assert!(matches!(
        publish(&pipeline, "alpha", 1),
        PublishOutcome::Accepted { .. }
    ));
    assert!(matches!(
        publish(&pipeline, "alpha", 1),
        PublishOutcome::Accepted { .. }
    ));
    assert_eq!(pipeline.engine().last_published_sequence_id("alpha"), None);
}

#[test]
fn reset_discards_optimistic_pushed_entries() {
    let pipeline = enabled_pipeline(Arc::new(InMemoryLog::new()));
    let metadata = MessageMetadata::new("alpha", 5);
    let mut ctx = PublishContext::new("alpha", 5);
    let ticket = match pipeline.admit(&mut ctx, &metadata, b"payload") {
        Admission::Admitted(ticket) => ticket,
        Admission::Settled(outcome) => panic!("unexpected early settle: {outcome:?}"),
    };
    assert_eq!(pipeline.engine().last_published_sequence_id("alpha"), Some(5));

    // Ownership hand-off: the append never completed, so the overlay goes.
    drop(ticket);
    pipeline.engine().reset_pushed_to_persisted();
    assert_eq!(pipeline.engine().last_published_sequence_id("alpha"), None);

    assert!(matches!(
        publish(&pipeline, "alpha", 5),
        PublishOutcome::Accepted { .. }
    ));
}
