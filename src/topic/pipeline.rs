use crate::config::core::DedupConfig;
use crate::config::policy::TopicPolicies;
use crate::observability::logging::{JsonLineLogger, TopicLog};
use crate::observability::telemetry::DedupTelemetry;
use crate::runtime::backpressure::{InFlightWindow, WindowPermit};
use crate::runtime::clock::WallClock;
use crate::storage::log::AppendLog;
use crate::topic::context::{DedupVerdict, PublishContext, PublishOutcome, RejectionKind};
use crate::topic::dedup::{DedupEngine, DedupError, StatusCheck};
use crate::wire::frame::{self, MessageMetadata, REPL_SOURCE_POSITION_KEY};
use std::sync::{Arc, Mutex};

const MODULE: &str = "topic::pipeline";

/// Result of the admission phase of a publish.
#[derive(Debug)]
pub enum Admission {
    /// Classification settled the publish without initiating an append.
    Settled(PublishOutcome),
    /// The message was accepted for append; finish it with
    /// [`PublishPipeline::complete`].
    Admitted(AppendTicket),
}

/// Reservation for one in-flight append: the encoded frame plus the window
/// slot held until the append settles.
#[derive(Debug)]
pub struct AppendTicket {
    frame: Vec<u8>,
    sequence_id: u64,
    _permit: WindowPermit,
}

impl AppendTicket {
    /// Sequence id the ticket acknowledges.
    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }
}

/// Per-topic publish pipeline: annotate, reserve, classify, append, record,
/// acknowledge, preserving per-producer arrival order.
///
/// `publish` is the single-call path; `admit`/`complete` expose the two
/// phases so callers (and tests) can interleave appends the way the wire
/// does.
pub struct PublishPipeline {
    engine: Arc<DedupEngine>,
    log: Arc<dyn AppendLog>,
    window: InFlightWindow,
    events: TopicLog,
    telemetry: Arc<DedupTelemetry>,
}

impl PublishPipeline {
    /// Assembles the pipeline and its engine for one topic.
    pub fn new(
        topic: impl Into<String>,
        log: Arc<dyn AppendLog>,
        config: DedupConfig,
        policies: TopicPolicies,
        clock: Arc<dyn WallClock>,
        logger: Arc<Mutex<JsonLineLogger>>,
    ) -> Self {
        let topic = topic.into();
        let events = TopicLog::new(logger, topic.clone(), clock.clone());
        let telemetry = Arc::new(DedupTelemetry::new());
        let window = InFlightWindow::new(config.max_in_flight_appends);
        let engine = Arc::new(DedupEngine::new(
            topic,
            log.clone(),
            config,
            policies,
            clock,
            events.clone(),
            telemetry.clone(),
        ));
        Self {
            engine,
            log,
            window,
            events,
            telemetry,
        }
    }

    /// The deduplication engine backing this pipeline.
    pub fn engine(&self) -> &Arc<DedupEngine> {
        &self.engine
    }

    /// Telemetry counters for this topic.
    pub fn telemetry(&self) -> &Arc<DedupTelemetry> {
        &self.telemetry
    }

    /// Currently reserved in-flight append slots.
    pub fn in_flight(&self) -> usize {
        self.window.in_flight()
    }

    /// Publishes one message end to end.
    pub fn publish(
        &self,
        ctx: &mut PublishContext,
        metadata: &MessageMetadata,
        payload: &[u8],
    ) -> PublishOutcome {
        match self.admit(ctx, metadata, payload) {
            Admission::Settled(outcome) => outcome,
            Admission::Admitted(ticket) => self.complete(ctx, ticket),
        }
    }

    /// Admission phase: annotate the context, reserve an in-flight slot, and
    /// classify. The `pushed` side-effect lands here, before any append.
    pub fn admit(
        &self,
        ctx: &mut PublishContext,
        metadata: &MessageMetadata,
        payload: &[u8],
    ) -> Admission {
        if !self.engine.accepts_publishes() {
            self.telemetry.record_rejected();
            self.events.warn(
                MODULE,
                &format!(
                    "rejecting publish from {} seq {}: deduplication status {:?}",
                    ctx.producer_name(),
                    ctx.sequence_id(),
                    self.engine.status()
                ),
            );
            return Admission::Settled(PublishOutcome::Rejected {
                kind: RejectionKind::NotReady,
                message: format!(
                    "topic is not open for publishes (deduplication status {:?})",
                    self.engine.status()
                ),
            });
        }

        self.annotate(ctx, metadata);

        let permit = match self.window.reserve() {
            Ok(permit) => permit,
            Err(err) => {
                self.telemetry.record_rejected();
                self.events.warn(
                    MODULE,
                    &format!(
                        "rejecting publish from {} seq {}: {err}",
                        ctx.producer_name(),
                        ctx.sequence_id()
                    ),
                );
                return Admission::Settled(PublishOutcome::Rejected {
                    kind: RejectionKind::Overloaded,
                    message: err.to_string(),
                });
            }
        };

        // Markers are broker control traffic: always published, never
        // deduplicated.
        if ctx.is_marker() {
            return Admission::Admitted(AppendTicket {
                frame: frame::encode_frame(metadata, payload),
                sequence_id: ctx.sequence_id(),
                _permit: permit,
            });
        }

        match self.engine.is_duplicate(ctx, metadata) {
            DedupVerdict::Fresh => Admission::Admitted(AppendTicket {
                frame: frame::encode_frame(metadata, payload),
                sequence_id: ctx.sequence_id(),
                _permit: permit,
            }),
            DedupVerdict::Duplicate => {
                self.telemetry.record_duplicate();
                let last_sequence_id = self
                    .classification_key(ctx)
                    .and_then(|key| self.engine.last_published_sequence_id(&key));
                Admission::Settled(PublishOutcome::Duplicate {
                    sequence_id: ctx.sequence_id(),
                    last_sequence_id,
                })
            }
            DedupVerdict::Indeterminate => {
                self.telemetry.record_indeterminate();
                Admission::Settled(PublishOutcome::Indeterminate {
                    sequence_id: ctx.sequence_id(),
                })
            }
        }
    }

    /// Completion phase: append the frame, record persistence, acknowledge.
    /// On append failure `pushed` stays advanced; retries of the same
    /// sequence id surface as indeterminate until an attempt lands or the
    /// topic reloads.
    pub fn complete(&self, ctx: &PublishContext, ticket: AppendTicket) -> PublishOutcome {
        let AppendTicket {
            frame,
            sequence_id,
            _permit,
        } = ticket;
        match self.log.append(frame) {
            Ok(position) => {
                self.engine.record_persisted(ctx, position);
                self.telemetry.record_accepted();
                PublishOutcome::Accepted {
                    position,
                    sequence_id,
                }
            }
            Err(err) => {
                self.telemetry.record_rejected();
                self.events.warn(
                    MODULE,
                    &format!(
                        "append failed for producer {} seq {sequence_id}: {err}",
                        ctx.producer_name()
                    ),
                );
                PublishOutcome::Rejected {
                    kind: RejectionKind::AppendFailed,
                    message: err.to_string(),
                }
            }
        }
    }

    /// Stamps replication facts on the context before classification: the
    /// replication-marker flag, and the parsed source position for remote
    /// producers. Malformed position values are logged and ignored, leaving
    /// the message on the repl-v1 path.
    fn annotate(&self, ctx: &mut PublishContext, metadata: &MessageMetadata) {
        if metadata.is_marker() {
            ctx.set_marker();
            if metadata.is_replication_marker() {
                ctx.set_repl_marker();
            }
            return;
        }
        if !self.is_remote_producer(ctx.producer_name()) {
            return;
        }
        if let Some(raw) = metadata.property(REPL_SOURCE_POSITION_KEY) {
            match metadata.repl_source_position() {
                Some((lid, eid)) => ctx.set_repl_source_position(lid, eid),
                None => self.events.warn(
                    MODULE,
                    &format!(
                        "unexpected {REPL_SOURCE_POSITION_KEY} value {raw:?} from {}",
                        ctx.producer_name()
                    ),
                ),
            }
        }
    }

    /// Map key the engine classified this publish under, used to look up the
    /// last known sequence id for duplicate acks. Source-position tracked
    /// messages have no single sequence key.
    fn classification_key(&self, ctx: &PublishContext) -> Option<String> {
        if self.is_remote_producer(ctx.producer_name())
            && ctx.supports_repl_dedup_by_lid_and_eid()
            && ctx.repl_source_position().is_some()
        {
            return None;
        }
        match ctx.original_producer_name() {
            Some(original) => Some(original.to_string()),
            None => Some(ctx.producer_name().to_string()),
        }
    }

    fn is_remote_producer(&self, producer_name: &str) -> bool {
        producer_name.starts_with(&self.engine.config().replicator_prefix)
    }

    /// Records a producer connect.
    pub fn on_producer_connect(&self, producer_name: &str) {
        self.engine.producer_added(producer_name);
    }

    /// Records a producer disconnect.
    pub fn on_producer_disconnect(&self, producer_name: &str) {
        self.engine.producer_removed(producer_name);
    }

    /// Swaps the per-topic policy overrides and reconciles the dedup status.
    pub fn update_policies(&self, policies: TopicPolicies) -> Result<StatusCheck, DedupError> {
        self.engine.update_policies(policies);
        self.engine.check_status()
    }
}
