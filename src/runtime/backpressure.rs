use crossbeam_queue::ArrayQueue;
use std::sync::Arc;
use thiserror::Error;

/// Bounded window of in-flight appends for one topic.
///
/// A slot is reserved before a message is classified and released when its
/// append settles, so saturation rejects publishes without touching the
/// deduplication maps.
#[derive(Debug, Clone)]
pub struct InFlightWindow {
    slots: Arc<ArrayQueue<()>>,
    capacity: usize,
}

impl InFlightWindow {
    /// Creates a window with the given capacity.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "in-flight window capacity must be > 0");
        Self {
            slots: Arc::new(ArrayQueue::new(capacity)),
            capacity,
        }
    }

    /// Reserves a slot, failing when the window is saturated.
    pub fn reserve(&self) -> Result<WindowPermit, WindowSaturated> {
        self.slots.push(()).map_err(|_| WindowSaturated {
            capacity: self.capacity,
        })?;
        Ok(WindowPermit {
            slots: self.slots.clone(),
        })
    }

    /// Number of currently reserved slots.
    pub fn in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Error returned when the window has no free slots.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("in-flight append window saturated ({capacity} slots)")]
pub struct WindowSaturated {
    pub capacity: usize,
}

/// Slot reservation released on drop.
#[derive(Debug)]
pub struct WindowPermit {
    slots: Arc<ArrayQueue<()>>,
}

impl Drop for WindowPermit {
    fn drop(&mut self) {
        let _ = self.slots.pop();
    }
}
