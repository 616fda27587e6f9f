//! Stall detection for stage worker threads.
//!
//! Workers update a heartbeat every loop iteration; because all blocking
//! stream operations poll with short timeouts, a heartbeat only goes stale
//! when a collaborator callback (FFT display, audio sink) has wedged the
//! stage. The watchdog thread scans registered workers once a second and
//! warns about any running worker blocked longer than the threshold.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{info, warn};

use crate::stage::{now_millis, WorkerState};

const STALL_THRESHOLD_MS: u64 = 5000;
const SCAN_INTERVAL: Duration = Duration::from_secs(1);

fn registry() -> &'static Mutex<Vec<Weak<WorkerState>>> {
    static REGISTRY: OnceLock<Mutex<Vec<Weak<WorkerState>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(Vec::new()))
}

/// Register a worker for monitoring. Dead entries are pruned during scans.
pub(crate) fn register(state: &Arc<WorkerState>) {
    registry().lock().unwrap().push(Arc::downgrade(state));
}

/// Monitoring thread handle. Created once per signal path session.
pub struct Watchdog {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Start the monitoring thread.
    pub fn start() -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = std::thread::spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                std::thread::sleep(SCAN_INTERVAL);
                scan();
            }
        });
        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Stop the monitoring thread.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

fn scan() {
    let now = now_millis();
    let mut workers = registry().lock().unwrap();
    workers.retain(|weak| {
        let Some(state) = weak.upgrade() else {
            return false;
        };
        if state.stop.load(Ordering::Relaxed) {
            return true;
        }
        let stalled = now.saturating_sub(state.last_beat.load(Ordering::Relaxed));
        if stalled > STALL_THRESHOLD_MS {
            if !state.warned.swap(true, Ordering::Relaxed) {
                warn!(
                    "[{}] worker blocked for {:.1}s, collaborator callback may be stuck",
                    state.name,
                    stalled as f64 / 1000.0
                );
            }
        } else if state.warned.swap(false, Ordering::Relaxed) {
            info!("[{}] worker unblocked", state.name);
        }
        true
    });
}
