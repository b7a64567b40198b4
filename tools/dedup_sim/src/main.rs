use anyhow::{bail, Context, Result};
use pelago::{
    Admission, DedupConfig, InMemoryLog, JsonLineLogger, ManualClock,
    MaintenancePlan, MessageMetadata, PublishContext, PublishOutcome, PublishPipeline,
    TopicPolicies, WallClock, REPL_SOURCE_POSITION_KEY,
};
use std::env;
use std::sync::{Arc, Mutex};

fn main() -> Result<()> {
    let verbose = env::args().skip(1).any(|arg| arg == "--verbose" || arg == "-v");
    let scenarios: Vec<(&str, fn() -> Result<String>)> = vec![
        ("local_idempotent_publish", local_idempotent_publish),
        ("duplicate_before_persistence", duplicate_before_persistence),
        ("chunked_group", chunked_group),
        ("replicated_source_positions", replicated_source_positions),
        ("recovery_replay", recovery_replay),
        ("inactive_producer_purge", inactive_producer_purge),
    ];
    let mut failures = 0usize;
    for (name, scenario) in scenarios {
        match scenario() {
            Ok(metrics) => {
                println!("scenario '{name}' ... ok");
                if verbose {
                    print!("{metrics}");
                }
            }
            Err(err) => {
                failures += 1;
                eprintln!("scenario '{name}' ... FAILED:\n  {err:#}");
            }
        }
    }
    if failures > 0 {
        bail!("{failures} scenario(s) failed");
    }
    Ok(())
}

struct Harness {
    log: Arc<InMemoryLog>,
    clock: Arc<ManualClock>,
    pipeline: PublishPipeline,
}

fn harness() -> Result<Harness> {
    let log = Arc::new(InMemoryLog::new());
    let clock = Arc::new(ManualClock::starting_at(1_000));
    let harness = reopen(log, clock)?;
    Ok(harness)
}

fn reopen(log: Arc<InMemoryLog>, clock: Arc<ManualClock>) -> Result<Harness> {
    let config = DedupConfig {
        enabled: true,
        snapshot_entry_interval: 1_000,
        ..DedupConfig::default()
    };
    config.validate().context("simulator config must be valid")?;
    let logger = Arc::new(Mutex::new(JsonLineLogger::default()));
    let pipeline = PublishPipeline::new(
        "tenant/ns/simulated",
        log.clone(),
        config,
        TopicPolicies::default(),
        clock.clone(),
        logger,
    );
    pipeline
        .engine()
        .check_status()
        .context("enabling deduplication must succeed")?;
    Ok(Harness {
        log,
        clock,
        pipeline,
    })
}

fn expect_accepted(outcome: &PublishOutcome, label: &str) -> Result<()> {
    match outcome {
        PublishOutcome::Accepted { .. } => Ok(()),
        other => bail!("{label}: expected Accepted, got {other:?}"),
    }
}

fn expect_duplicate(outcome: &PublishOutcome, label: &str) -> Result<()> {
    match outcome {
        PublishOutcome::Duplicate { .. } => Ok(()),
        other => bail!("{label}: expected Duplicate, got {other:?}"),
    }
}

fn local_idempotent_publish() -> Result<String> {
    let sim = harness()?;
    for (sequence_id, expected_duplicate) in [(0u64, false), (1, false), (1, true), (2, false)] {
        let metadata = MessageMetadata::new("alpha", sequence_id);
        let mut ctx = PublishContext::new("alpha", sequence_id);
        let outcome = sim.pipeline.publish(&mut ctx, &metadata, b"payload");
        if expected_duplicate {
            expect_duplicate(&outcome, "repeat of sequence 1")?;
        } else {
            expect_accepted(&outcome, "fresh sequence")?;
        }
    }
    let engine = sim.pipeline.engine();
    if engine.last_published_sequence_id("alpha") != Some(2) {
        bail!("expected pushed[alpha] == 2");
    }
    if engine.persisted_sequence_id("alpha") != Some(2) {
        bail!("expected persisted[alpha] == 2");
    }
    Ok(sim.pipeline.telemetry().render_metrics())
}

fn duplicate_before_persistence() -> Result<String> {
    let sim = harness()?;
    let metadata = MessageMetadata::new("alpha", 5);
    let mut first = PublishContext::new("alpha", 5);
    let admitted = match sim.pipeline.admit(&mut first, &metadata, b"one") {
        Admission::Admitted(ticket) => ticket,
        Admission::Settled(outcome) => bail!("first publish settled early: {outcome:?}"),
    };
    let mut second = PublishContext::new("alpha", 5);
    match sim.pipeline.admit(&mut second, &metadata, b"one") {
        Admission::Settled(PublishOutcome::Indeterminate { .. }) => {}
        other => bail!("expected Indeterminate before persistence, got {other:?}"),
    }
    expect_accepted(
        &sim.pipeline.complete(&first, admitted),
        "delayed append completion",
    )?;
    let mut third = PublishContext::new("alpha", 5);
    expect_duplicate(
        &sim.pipeline.publish(&mut third, &metadata, b"one"),
        "retry after persistence",
    )?;
    Ok(sim.pipeline.telemetry().render_metrics())
}

fn chunked_group() -> Result<String> {
    let sim = harness()?;
    for chunk_id in 0u32..3 {
        let metadata = MessageMetadata::new("alpha", 7).with_chunk(chunk_id, 3);
        let mut ctx = PublishContext::new("alpha", 7).with_chunked();
        expect_accepted(
            &sim.pipeline.publish(&mut ctx, &metadata, b"chunk"),
            "chunk of a fresh group",
        )?;
    }
    let engine = sim.pipeline.engine();
    if engine.last_published_sequence_id("alpha") != Some(7) {
        bail!("expected pushed[alpha] == 7 after the last chunk");
    }
    let metadata = MessageMetadata::new("alpha", 7).with_chunk(2, 3);
    let mut ctx = PublishContext::new("alpha", 7).with_chunked();
    expect_duplicate(
        &sim.pipeline.publish(&mut ctx, &metadata, b"chunk"),
        "replayed chunk group",
    )?;
    Ok(sim.pipeline.telemetry().render_metrics())
}

fn replicated_source_positions() -> Result<String> {
    let sim = harness()?;
    let producer = "pelago.repl.west";
    let cases = [
        ((10u64, 5u64), false),
        ((10, 6), false),
        ((10, 6), true),
        ((9, 999), true),
        ((11, 0), false),
    ];
    for ((lid, eid), expected_duplicate) in cases {
        let metadata = MessageMetadata::new(producer, eid)
            .with_property(REPL_SOURCE_POSITION_KEY, format!("{lid}:{eid}"));
        let mut ctx = PublishContext::new(producer, eid).with_repl_v2_support();
        let outcome = sim.pipeline.publish(&mut ctx, &metadata, b"replicated");
        if expected_duplicate {
            expect_duplicate(&outcome, "stale source position")?;
        } else {
            expect_accepted(&outcome, "advancing source position")?;
        }
    }
    let engine = sim.pipeline.engine();
    if engine.persisted_sequence_id(&format!("{producer}_LID")) != Some(11)
        || engine.persisted_sequence_id(&format!("{producer}_EID")) != Some(0)
    {
        bail!("expected persisted source position 11:0");
    }
    Ok(sim.pipeline.telemetry().render_metrics())
}

fn recovery_replay() -> Result<String> {
    let sim = harness()?;
    for sequence_id in 0u64..3 {
        let metadata = MessageMetadata::new("alpha", sequence_id);
        let mut ctx = PublishContext::new("alpha", sequence_id);
        expect_accepted(
            &sim.pipeline.publish(&mut ctx, &metadata, b"payload"),
            "publish before restart",
        )?;
    }
    let Harness {
        log,
        clock,
        pipeline,
    } = sim;
    drop(pipeline);
    let reopened = reopen(log, clock)?;
    let engine = reopened.pipeline.engine();
    if engine.last_published_sequence_id("alpha") != Some(2)
        || engine.persisted_sequence_id("alpha") != Some(2)
    {
        bail!("expected sequence state restored by replay");
    }
    let metadata = MessageMetadata::new("alpha", 2);
    let mut ctx = PublishContext::new("alpha", 2);
    expect_duplicate(
        &reopened.pipeline.publish(&mut ctx, &metadata, b"payload"),
        "pre-restart sequence id",
    )?;
    let metadata = MessageMetadata::new("alpha", 3);
    let mut ctx = PublishContext::new("alpha", 3);
    expect_accepted(
        &reopened.pipeline.publish(&mut ctx, &metadata, b"payload"),
        "post-restart sequence id",
    )?;
    Ok(reopened.pipeline.telemetry().render_metrics())
}

fn inactive_producer_purge() -> Result<String> {
    let sim = harness()?;
    let metadata = MessageMetadata::new("beta", 0);
    let mut ctx = PublishContext::new("beta", 0);
    expect_accepted(
        &sim.pipeline.publish(&mut ctx, &metadata, b"payload"),
        "publish before disconnect",
    )?;
    sim.pipeline.on_producer_disconnect("beta");
    let engine = sim.pipeline.engine();
    sim.clock
        .advance(engine.config().inactivity_timeout_ms() + 1);
    let mut plan = MaintenancePlan::new(0);
    plan.run(engine, sim.clock.now_ms());
    if engine.last_published_sequence_id("beta").is_some()
        || engine.persisted_sequence_id("beta").is_some()
        || engine.registry().is_inactive("beta")
    {
        bail!("expected beta purged from all maps");
    }
    if sim.pipeline.telemetry().snapshot_total() == 0 {
        bail!("expected purge to persist a snapshot");
    }
    Ok(sim.pipeline.telemetry().render_metrics())
}
