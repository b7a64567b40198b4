use super::log::{AppendLog, CursorState, LogError, Position};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Entries stored per segment before the in-memory log rolls to the next one.
pub const SEGMENT_ROLL_INTERVAL: u64 = 100;

#[derive(Debug, Default)]
struct CursorRecord {
    properties: BTreeMap<String, i64>,
    mark_delete: Option<Position>,
}

#[derive(Debug, Default)]
struct LogState {
    entries: Vec<(Position, Vec<u8>)>,
    next_segment: u64,
    next_offset: u64,
    cursors: HashMap<String, CursorRecord>,
}

/// Reference storage engine backing tests and the workload simulator.
///
/// Keeps every appended entry in memory, rolls segments every
/// `SEGMENT_ROLL_INTERVAL` entries so positions exercise both coordinates,
/// and persists named cursors for the lifetime of the instance. Fault
/// switches let tests fail individual operations.
#[derive(Debug, Default)]
pub struct InMemoryLog {
    state: Mutex<LogState>,
    fail_appends: AtomicBool,
    fail_mark_delete: AtomicBool,
    fail_cursor_ops: AtomicBool,
}

impl InMemoryLog {
    /// Creates an empty log with no cursors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `append` calls fail.
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent `mark_delete` calls fail.
    pub fn fail_mark_delete(&self, fail: bool) {
        self.fail_mark_delete.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent cursor open/delete calls fail.
    pub fn fail_cursor_ops(&self, fail: bool) {
        self.fail_cursor_ops.store(fail, Ordering::SeqCst);
    }

    /// Number of entries appended so far.
    pub fn entry_count(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    /// Returns the properties currently stored on a cursor.
    pub fn cursor_properties(&self, name: &str) -> Option<BTreeMap<String, i64>> {
        self.state
            .lock()
            .unwrap()
            .cursors
            .get(name)
            .map(|cursor| cursor.properties.clone())
    }
}

impl AppendLog for InMemoryLog {
    fn append(&self, payload: Vec<u8>) -> Result<Position, LogError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(LogError::Append("injected append failure".into()));
        }
        let mut state = self.state.lock().unwrap();
        let position = Position::new(state.next_segment, state.next_offset);
        state.entries.push((position, payload));
        state.next_offset += 1;
        if state.next_offset >= SEGMENT_ROLL_INTERVAL {
            state.next_segment += 1;
            state.next_offset = 0;
        }
        Ok(position)
    }

    fn open_cursor(&self, name: &str) -> Result<CursorState, LogError> {
        if self.fail_cursor_ops.load(Ordering::SeqCst) {
            return Err(LogError::Cursor("injected cursor failure".into()));
        }
        let mut state = self.state.lock().unwrap();
        let cursor = state.cursors.entry(name.to_string()).or_default();
        Ok(CursorState {
            properties: cursor.properties.clone(),
            mark_delete_position: cursor.mark_delete,
        })
    }

    fn delete_cursor(&self, name: &str) -> Result<(), LogError> {
        if self.fail_cursor_ops.load(Ordering::SeqCst) {
            return Err(LogError::Cursor("injected cursor failure".into()));
        }
        let mut state = self.state.lock().unwrap();
        if state.cursors.remove(name).is_none() {
            return Err(LogError::CursorNotFound(name.to_string()));
        }
        Ok(())
    }

    fn mark_delete(
        &self,
        cursor: &str,
        position: Position,
        properties: BTreeMap<String, i64>,
    ) -> Result<(), LogError> {
        if self.fail_mark_delete.load(Ordering::SeqCst) {
            return Err(LogError::MarkDelete("injected mark-delete failure".into()));
        }
        let mut state = self.state.lock().unwrap();
        let record = state
            .cursors
            .get_mut(cursor)
            .ok_or_else(|| LogError::CursorNotFound(cursor.to_string()))?;
        record.mark_delete = Some(match record.mark_delete {
            Some(current) => current.max(position),
            None => position,
        });
        record.properties = properties;
        Ok(())
    }

    fn replay_range(
        &self,
        cursor: &str,
        handler: &mut dyn FnMut(Position, &[u8]),
    ) -> Result<Option<Position>, LogError> {
        let (watermark, entries) = {
            let state = self.state.lock().unwrap();
            let record = state
                .cursors
                .get(cursor)
                .ok_or_else(|| LogError::CursorNotFound(cursor.to_string()))?;
            (record.mark_delete, state.entries.clone())
        };
        let mut last = None;
        for (position, payload) in entries {
            if let Some(watermark) = watermark {
                if position <= watermark {
                    continue;
                }
            }
            handler(position, &payload);
            last = Some(position);
        }
        Ok(last)
    }

    fn mark_delete_position(&self, cursor: &str) -> Result<Option<Position>, LogError> {
        let state = self.state.lock().unwrap();
        let record = state
            .cursors
            .get(cursor)
            .ok_or_else(|| LogError::CursorNotFound(cursor.to_string()))?;
        Ok(record.mark_delete)
    }

    fn last_confirmed_position(&self) -> Option<Position> {
        self.state
            .lock()
            .unwrap()
            .entries
            .last()
            .map(|(position, _)| *position)
    }
}
