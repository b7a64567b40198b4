//! Pelago broker core: the durable topic publish pipeline.
//!
//! Accepts produced messages, classifies duplicates against per-producer
//! sequence state, appends survivors to an external append-only log, and
//! periodically snapshots recovery state into the log's cursor properties.

pub mod config {
    pub mod core;
    pub mod policy;

    pub use self::core::*;
    pub use policy::*;
}

pub mod storage {
    pub mod log;
    pub mod memory;

    pub use log::*;
    pub use memory::*;
}

pub mod wire {
    pub mod frame;

    pub use frame::*;
}

pub mod topic {
    pub mod context;
    pub mod dedup;
    pub mod pipeline;
    pub mod registry;

    pub use context::*;
    pub use dedup::*;
    pub use pipeline::*;
    pub use registry::*;
}

pub mod runtime {
    pub mod backpressure;
    pub mod clock;
    pub mod scheduler;

    pub use backpressure::*;
    pub use clock::*;
    pub use scheduler::*;
}

pub mod observability {
    pub mod logging;
    pub mod telemetry;

    pub use logging::*;
    pub use telemetry::*;
}

pub use config::{ConfigError, DedupConfig, TopicPolicies, DEDUPLICATION_CURSOR_NAME};
pub use observability::{
    DedupTelemetry, JsonLineLogger, LogLevel, LogRetention, LogSegment, LoggingError, TopicLog,
};
pub use runtime::{
    InFlightWindow, MaintenancePlan, MaintenanceScheduler, ManualClock, SystemWallClock, WallClock,
    WindowPermit, WindowSaturated, DEFAULT_PURGE_INTERVAL_MS,
};
pub use storage::{AppendLog, CursorState, InMemoryLog, LogError, Position, SEGMENT_ROLL_INTERVAL};
pub use topic::{
    Admission, AppendTicket, DedupEngine, DedupError, DedupVerdict, ProducerRegistry,
    PublishContext, PublishOutcome, PublishPipeline, RejectionKind, Status, StatusCheck,
};
pub use wire::{
    decode_frame, encode_frame, is_replication_marker, peek_metadata, FrameError, KeyValue,
    MessageMetadata, REPLICATION_MARKER_MAX, REPLICATION_MARKER_MIN, REPL_SOURCE_POSITION_KEY,
};
