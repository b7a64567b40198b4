use crate::runtime::clock::WallClock;
use crate::topic::dedup::DedupEngine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Default cadence between purge passes over inactive producers.
pub const DEFAULT_PURGE_INTERVAL_MS: u64 = 60_000;

/// Per-tick maintenance logic, separated from the thread that drives it so
/// tests can run ticks against an injected clock.
///
/// Every tick re-checks the status machine (retrying transitions that were
/// deferred) and offers the engine a time-based snapshot; purges run on
/// their own cadence.
#[derive(Debug)]
pub struct MaintenancePlan {
    purge_interval_ms: u64,
    last_purge_ms: Option<u64>,
}

impl MaintenancePlan {
    /// Creates a plan with the provided purge cadence.
    pub fn new(purge_interval_ms: u64) -> Self {
        Self {
            purge_interval_ms,
            last_purge_ms: None,
        }
    }

    /// Runs one maintenance tick.
    pub fn run(&mut self, engine: &DedupEngine, now_ms: u64) {
        // Failures are logged by the engine and retried on a later tick.
        let _ = engine.check_status();
        engine.take_periodic_snapshot();
        if self.purge_due(now_ms) {
            self.last_purge_ms = Some(now_ms);
            engine.purge_inactive_producers();
        }
    }

    fn purge_due(&self, now_ms: u64) -> bool {
        match self.last_purge_ms {
            None => true,
            Some(last_ms) => now_ms.saturating_sub(last_ms) >= self.purge_interval_ms,
        }
    }
}

/// Background thread driving [`MaintenancePlan`] for one topic.
pub struct MaintenanceScheduler {
    stop: Arc<AtomicBool>,
    join: Mutex<Option<thread::JoinHandle<()>>>,
}

impl MaintenanceScheduler {
    /// Spawns the maintenance thread.
    pub fn start(
        engine: Arc<DedupEngine>,
        clock: Arc<dyn WallClock>,
        tick_interval: Duration,
        purge_interval_ms: u64,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let join = thread::Builder::new()
            .name(format!("{}_maintenance", engine.topic()))
            .spawn(move || {
                let mut plan = MaintenancePlan::new(purge_interval_ms);
                while !thread_stop.load(Ordering::Relaxed) {
                    plan.run(&engine, clock.now_ms());
                    thread::sleep(tick_interval);
                }
            })
            .expect("failed to spawn maintenance thread");
        Self {
            stop,
            join: Mutex::new(Some(join)),
        }
    }

    /// Stops the thread and waits for it to exit.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}
