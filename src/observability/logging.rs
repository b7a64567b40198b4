use crate::runtime::clock::WallClock;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Severity levels supported by runtime log-level overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Canonical uppercase representation.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

/// Retention bounds for the in-process log buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRetention {
    /// Bytes a segment may accumulate before it is sealed.
    pub segment_bytes: usize,
    /// Sealed segments kept behind the open one; older segments are
    /// discarded and their loss accounted.
    pub sealed_segments: usize,
}

impl Default for LogRetention {
    fn default() -> Self {
        Self {
            segment_bytes: 1 << 20,
            sealed_segments: 8,
        }
    }
}

/// One bounded run of serialized records, oldest first.
#[derive(Debug, Default, Clone)]
pub struct LogSegment {
    lines: Vec<String>,
    bytes: usize,
}

impl LogSegment {
    /// Serialized records held by this segment.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Bytes held by this segment.
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

/// Buffered JSON-line logger shared by every component of one topic.
///
/// Each record is serialized eagerly and stamped with a per-logger sequence
/// number, so gaps in `seq` expose records lost to retention. The newest
/// segment stays open for writes; a write that would overflow it seals it
/// and opens the next one.
#[derive(Debug, Clone, Default)]
pub struct JsonLineLogger {
    retention: LogRetention,
    min_level: LogLevel,
    next_seq: u64,
    segments: VecDeque<LogSegment>,
    dropped_records: u64,
}

impl JsonLineLogger {
    /// Creates a logger with the given retention bounds.
    pub fn new(retention: LogRetention) -> Self {
        Self {
            retention,
            ..Self::default()
        }
    }

    /// Active minimum level.
    pub fn level(&self) -> LogLevel {
        self.min_level
    }

    /// Applies a runtime level override.
    pub fn set_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    /// Serializes and buffers one record. Returns `false` when the record
    /// was filtered by the active level.
    pub fn log(
        &mut self,
        ts_ms: u64,
        level: LogLevel,
        module: &str,
        topic: &str,
        message: &str,
    ) -> Result<bool, LoggingError> {
        if level < self.min_level {
            return Ok(false);
        }
        let record = LogRecord {
            seq: self.next_seq,
            ts: ts_ms,
            level: level.as_str(),
            module,
            topic,
            message,
        };
        let line = serde_json::to_string(&record)?;
        self.next_seq += 1;
        match self.segments.back_mut() {
            Some(open)
                if open.lines.is_empty()
                    || open.bytes + line.len() <= self.retention.segment_bytes =>
            {
                open.bytes += line.len();
                open.lines.push(line);
            }
            _ => {
                self.segments.push_back(LogSegment {
                    bytes: line.len(),
                    lines: vec![line],
                });
                self.enforce_retention();
            }
        }
        Ok(true)
    }

    /// Sealed history plus the open segment, oldest first.
    pub fn segments(&self) -> impl Iterator<Item = &LogSegment> {
        self.segments.iter()
    }

    /// Records currently buffered across all segments.
    pub fn buffered_records(&self) -> usize {
        self.segments.iter().map(|segment| segment.lines.len()).sum()
    }

    /// Records discarded by retention since the logger was created.
    pub fn dropped_records(&self) -> u64 {
        self.dropped_records
    }

    fn enforce_retention(&mut self) {
        while self.segments.len() > self.retention.sealed_segments + 1 {
            if let Some(discarded) = self.segments.pop_front() {
                self.dropped_records += discarded.lines.len() as u64;
            }
        }
    }
}

/// Failure to encode a record as a JSON line.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("log record could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct LogRecord<'a> {
    seq: u64,
    ts: u64,
    level: &'a str,
    module: &'a str,
    topic: &'a str,
    message: &'a str,
}

/// Topic-scoped handle shared by the engine, pipeline, and scheduler.
///
/// Timestamps come from the injected clock; a record that fails to encode is
/// dropped rather than surfaced to the publish path.
#[derive(Clone)]
pub struct TopicLog {
    inner: Arc<Mutex<JsonLineLogger>>,
    topic: Arc<String>,
    clock: Arc<dyn WallClock>,
}

impl TopicLog {
    /// Creates a handle over a shared logger.
    pub fn new(
        logger: Arc<Mutex<JsonLineLogger>>,
        topic: impl Into<String>,
        clock: Arc<dyn WallClock>,
    ) -> Self {
        Self {
            inner: logger,
            topic: Arc::new(topic.into()),
            clock,
        }
    }

    /// The topic this handle is scoped to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn info(&self, module: &str, message: &str) {
        self.emit(LogLevel::Info, module, message);
    }

    pub fn warn(&self, module: &str, message: &str) {
        self.emit(LogLevel::Warn, module, message);
    }

    pub fn error(&self, module: &str, message: &str) {
        self.emit(LogLevel::Error, module, message);
    }

    fn emit(&self, level: LogLevel, module: &str, message: &str) {
        let ts_ms = self.clock.now_ms();
        if let Ok(mut logger) = self.inner.lock() {
            let _ = logger.log(ts_ms, level, module, &self.topic, message);
        }
    }

    /// Snapshot of all buffered lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|logger| {
                logger
                    .segments()
                    .flat_map(|segment| segment.lines().iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl fmt::Debug for TopicLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicLog").field("topic", &self.topic).finish()
    }
}
