use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Totally-ordered coordinate of an entry in the append log.
///
/// Positions are produced only by the storage engine; the broker treats them
/// as opaque apart from their ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Position {
    pub segment_id: u64,
    pub offset: u64,
}

impl Position {
    /// Builds a position from its segment/offset pair.
    pub fn new(segment_id: u64, offset: u64) -> Self {
        Self { segment_id, offset }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment_id, self.offset)
    }
}

/// State recovered when opening a named cursor.
#[derive(Debug, Clone, Default)]
pub struct CursorState {
    /// Snapshot payload stored as cursor properties.
    pub properties: BTreeMap<String, i64>,
    /// Watermark below which the log may garbage-collect entries.
    pub mark_delete_position: Option<Position>,
}

/// Failure taxonomy of the storage engine.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("cursor {0} not found")]
    CursorNotFound(String),
    #[error("append failed: {0}")]
    Append(String),
    #[error("cursor operation failed: {0}")]
    Cursor(String),
    #[error("mark-delete failed: {0}")]
    MarkDelete(String),
    #[error("replay failed: {0}")]
    Replay(String),
}

/// Contract implemented by the external append-only storage engine.
///
/// Every operation may block; callers keep these calls out of lock-protected
/// critical sections. Named cursors persist across broker restarts, and
/// `mark_delete` atomically advances the watermark while replacing the cursor
/// properties.
pub trait AppendLog: Send + Sync {
    /// Durably appends a payload and returns its position.
    fn append(&self, payload: Vec<u8>) -> Result<Position, LogError>;

    /// Opens the named cursor, creating it when absent.
    fn open_cursor(&self, name: &str) -> Result<CursorState, LogError>;

    /// Deletes the named cursor. `CursorNotFound` is surfaced to the caller,
    /// which may treat it as success.
    fn delete_cursor(&self, name: &str) -> Result<(), LogError>;

    /// Atomically advances the cursor watermark and replaces its properties.
    fn mark_delete(
        &self,
        cursor: &str,
        position: Position,
        properties: BTreeMap<String, i64>,
    ) -> Result<(), LogError>;

    /// Invokes `handler` for every entry after the cursor watermark up to the
    /// last confirmed position, in log order. Returns the last position
    /// visited, or `None` when there was nothing to replay.
    fn replay_range(
        &self,
        cursor: &str,
        handler: &mut dyn FnMut(Position, &[u8]),
    ) -> Result<Option<Position>, LogError>;

    /// Returns the cursor's current watermark.
    fn mark_delete_position(&self, cursor: &str) -> Result<Option<Position>, LogError>;

    /// Position of the most recently confirmed entry, if any.
    fn last_confirmed_position(&self) -> Option<Position>;
}
