//! Stage lifecycle primitives.
//!
//! Every pipeline stage implements [`StreamStage`] and internally drives a
//! [`Worker`]: a dedicated thread spawned on `start()` and joined on
//! `stop()`. The worker repeatedly calls the stage's work closure, which
//! processes one block per call; blocked stream operations poll the stop
//! flag so shutdown is always prompt.
//!
//! Configuration fields are not synchronized against the worker. The
//! orchestrator's stop-then-reconfigure-then-start sequencing is the sole
//! mechanism that makes reconfiguration race-free; the documented live
//! setters use atomics shared with the worker instead.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, error, warn};

use crate::error::{PathError, PathResult, WorkError, WorkResult};
use crate::watchdog;

/// Timestamp in milliseconds since UNIX_EPOCH.
#[inline]
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// A unit of the pipeline that consumes a stream, optionally produces one,
/// and exposes start/stop. Setters not documented live-safe must only be
/// called while the stage is stopped.
pub trait StreamStage {
    /// Debug name for this stage.
    fn name(&self) -> &'static str;

    /// Whether the worker thread is currently running.
    fn is_running(&self) -> bool;

    /// Spawn the worker and begin consuming/producing.
    fn start(&mut self) -> PathResult;

    /// Halt the worker and release its thread. Safe to call when the stage
    /// never started. Buffered-but-unconsumed samples are discarded, not
    /// drained.
    fn stop(&mut self);
}

/// Shared state between a [`Worker`] and its thread (and the watchdog).
pub(crate) struct WorkerState {
    pub(crate) name: &'static str,
    pub(crate) stop: AtomicBool,
    /// Updated every loop iteration; a stale heartbeat on a live worker
    /// means a collaborator callback has wedged the stage.
    pub(crate) last_beat: AtomicU64,
    pub(crate) warned: AtomicBool,
}

/// Owns a stage's worker thread and its lifecycle counters.
pub(crate) struct Worker {
    name: &'static str,
    state: Option<Arc<WorkerState>>,
    handle: Option<JoinHandle<()>>,
    starts: usize,
    stops: usize,
}

impl Worker {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            state: None,
            handle: None,
            starts: 0,
            stops: 0,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Times the worker was started. Exposed through stage accessors so
    /// tests can observe which stages a reconfiguration cycled.
    pub(crate) fn start_count(&self) -> usize {
        self.starts
    }

    pub(crate) fn stop_count(&self) -> usize {
        self.stops
    }

    /// Spawn the worker thread. `work` processes one block per call and
    /// returns the number of blocks produced; `Err(Shutdown)` ends the
    /// loop quietly, any other error is logged and fatal to the stage.
    pub(crate) fn spawn<F>(&mut self, mut work: F) -> PathResult
    where
        F: FnMut(&AtomicBool) -> WorkResult<usize> + Send + 'static,
    {
        if self.handle.is_some() {
            warn!("[{}] start() called while already running", self.name);
            return Ok(());
        }

        let state = Arc::new(WorkerState {
            name: self.name,
            stop: AtomicBool::new(false),
            last_beat: AtomicU64::new(now_millis()),
            warned: AtomicBool::new(false),
        });
        watchdog::register(&state);

        let name = self.name;
        let thread_state = Arc::clone(&state);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut produced = 0usize;
                loop {
                    thread_state.last_beat.store(now_millis(), Ordering::Relaxed);
                    if thread_state.stop.load(Ordering::Relaxed) {
                        break;
                    }
                    match work(&thread_state.stop) {
                        Ok(n) => produced += n,
                        Err(WorkError::Shutdown) => {
                            debug!("[{}] stream closed, worker exiting", name);
                            break;
                        }
                        Err(e) => {
                            error!("[{}] work error: {}", name, e);
                            break;
                        }
                    }
                }
                debug!("[{}] worker exited after {} blocks", name, produced);
            })
            .map_err(|source| PathError::Spawn {
                stage: self.name,
                source,
            })?;

        debug!("[{}] worker started", self.name);
        self.state = Some(state);
        self.handle = Some(handle);
        self.starts += 1;
        Ok(())
    }

    /// Signal the worker and join it. No-op when not running.
    pub(crate) fn stop(&mut self) {
        if let Some(state) = self.state.take() {
            state.stop.store(true, Ordering::Relaxed);
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("[{}] worker panicked", self.name);
            }
            self.stops += 1;
            debug!("[{}] worker stopped", self.name);
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn counts_start_stop_cycles() {
        let mut worker = Worker::new("test");
        assert!(!worker.is_running());
        assert_eq!(worker.start_count(), 0);

        let ticks = Arc::new(AtomicUsize::new(0));
        let t = Arc::clone(&ticks);
        worker
            .spawn(move |_stop| {
                t.fetch_add(1, Ordering::Relaxed);
                std::thread::sleep(Duration::from_millis(1));
                Ok(0)
            })
            .unwrap();
        assert!(worker.is_running());

        std::thread::sleep(Duration::from_millis(30));
        worker.stop();

        assert!(!worker.is_running());
        assert_eq!(worker.start_count(), 1);
        assert_eq!(worker.stop_count(), 1);
        assert!(ticks.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn stop_without_start_is_safe() {
        let mut worker = Worker::new("test");
        worker.stop();
        assert_eq!(worker.stop_count(), 0);
    }

    #[test]
    fn shutdown_error_ends_worker() {
        let mut worker = Worker::new("test");
        worker.spawn(|_stop| Err(WorkError::Shutdown)).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        worker.stop();
        // Thread already exited; stop() still joins cleanly.
        assert_eq!(worker.stop_count(), 1);
    }
}
