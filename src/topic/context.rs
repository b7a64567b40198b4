use crate::storage::log::Position;
use std::collections::BTreeMap;

/// Verdict of classifying one message against the deduplication state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupVerdict {
    /// Definitely not a duplicate; the message may be appended.
    Fresh,
    /// Definitely a duplicate of an already-persisted message.
    Duplicate,
    /// Accepted for append earlier but not yet confirmed durable; the
    /// producer must retry later.
    Indeterminate,
}

/// Reasons a publish is fatally rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// The storage engine failed to append the entry.
    AppendFailed,
    /// The topic's in-flight append window is saturated.
    Overloaded,
    /// Deduplication is configured on but still recovering, transitioning,
    /// or failed; the topic is not open for publishes yet.
    NotReady,
}

/// Acknowledgement returned to the producer for one publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Accepted {
        position: Position,
        sequence_id: u64,
    },
    Duplicate {
        sequence_id: u64,
        last_sequence_id: Option<u64>,
    },
    Indeterminate {
        sequence_id: u64,
    },
    Rejected {
        kind: RejectionKind,
        message: String,
    },
}

/// Per-publish state handed through the pipeline and the dedup engine.
///
/// Typed fields carry the flags the original implementation kept in an
/// untyped property bag; `properties` remains for caller pass-through data.
#[derive(Debug, Clone)]
pub struct PublishContext {
    producer_name: String,
    sequence_id: u64,
    highest_sequence_id: u64,
    marker: bool,
    chunked: bool,
    supports_repl_dedup_by_lid_and_eid: bool,
    repl_marker: bool,
    repl_source_position: Option<(u64, u64)>,
    original_producer_name: Option<String>,
    original_sequence_id: Option<u64>,
    original_highest_sequence_id: Option<u64>,
    is_last_chunk: Option<bool>,
    properties: BTreeMap<String, String>,
}

impl PublishContext {
    /// Creates a context for a message from the named producer session.
    pub fn new(producer_name: impl Into<String>, sequence_id: u64) -> Self {
        Self {
            producer_name: producer_name.into(),
            sequence_id,
            highest_sequence_id: sequence_id,
            marker: false,
            chunked: false,
            supports_repl_dedup_by_lid_and_eid: false,
            repl_marker: false,
            repl_source_position: None,
            original_producer_name: None,
            original_sequence_id: None,
            original_highest_sequence_id: None,
            is_last_chunk: None,
            properties: BTreeMap::new(),
        }
    }

    /// Declares the batch upper bound; clamped to at least the sequence id.
    pub fn with_highest_sequence_id(mut self, highest: u64) -> Self {
        self.highest_sequence_id = highest.max(self.sequence_id);
        self
    }

    /// Flags the message as a broker-generated marker.
    pub fn with_marker(mut self) -> Self {
        self.marker = true;
        self
    }

    /// Flags the message as one chunk of a chunked message.
    pub fn with_chunked(mut self) -> Self {
        self.chunked = true;
        self
    }

    /// Declares that the producer session supports ledger/entry-id based
    /// replication deduplication.
    pub fn with_repl_v2_support(mut self) -> Self {
        self.supports_repl_dedup_by_lid_and_eid = true;
        self
    }

    /// Attaches a caller pass-through property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn producer_name(&self) -> &str {
        &self.producer_name
    }

    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    /// Upper bound of the sequence-id range covered by this publish.
    pub fn highest_sequence_id(&self) -> u64 {
        self.highest_sequence_id
    }

    pub fn is_marker(&self) -> bool {
        self.marker
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    pub fn supports_repl_dedup_by_lid_and_eid(&self) -> bool {
        self.supports_repl_dedup_by_lid_and_eid
    }

    /// True when the pipeline recognized the message as a replication marker.
    pub fn is_repl_marker(&self) -> bool {
        self.repl_marker
    }

    pub(crate) fn set_marker(&mut self) {
        self.marker = true;
    }

    pub(crate) fn set_repl_marker(&mut self) {
        self.repl_marker = true;
        self.marker = true;
    }

    /// Source-cluster `(ledger id, entry id)` stashed by annotation.
    pub fn repl_source_position(&self) -> Option<(u64, u64)> {
        self.repl_source_position
    }

    pub(crate) fn set_repl_source_position(&mut self, lid: u64, eid: u64) {
        self.repl_source_position = Some((lid, eid));
    }

    /// Source-cluster producer name recovered on the repl-v1 path.
    pub fn original_producer_name(&self) -> Option<&str> {
        self.original_producer_name.as_deref()
    }

    pub fn original_sequence_id(&self) -> Option<u64> {
        self.original_sequence_id
    }

    pub fn original_highest_sequence_id(&self) -> Option<u64> {
        self.original_highest_sequence_id
    }

    pub(crate) fn set_original(
        &mut self,
        producer_name: impl Into<String>,
        sequence_id: u64,
        highest_sequence_id: u64,
    ) {
        self.original_producer_name = Some(producer_name.into());
        self.original_sequence_id = Some(sequence_id);
        self.original_highest_sequence_id = Some(highest_sequence_id);
    }

    /// Whether this publish is the final chunk of its group. `None` until the
    /// engine classifies a chunked message, and for non-chunked messages.
    pub fn is_last_chunk(&self) -> Option<bool> {
        self.is_last_chunk
    }

    pub(crate) fn set_last_chunk(&mut self, last: bool) {
        self.is_last_chunk = Some(last);
    }

    /// Caller pass-through properties.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }
}
