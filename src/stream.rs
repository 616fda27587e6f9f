//! Bounded sample streams connecting pipeline stages.
//!
//! A [`Stream`] is a bounded single-producer single-consumer channel of
//! sample blocks (`Vec<T>`). The producing stage owns the stream and
//! allocates it; consumers hold cloned [`StreamReader`] handles. A full
//! stream blocks the producer, an empty one blocks the consumer; this is
//! the only synchronization between stages and provides natural
//! backpressure.
//!
//! Blocking operations use short poll timeouts so worker threads can
//! observe their stop flag while blocked; `stop()` therefore always
//! completes promptly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};

use crate::error::{WorkError, WorkResult};

/// How long a blocked stream operation waits before re-checking control
/// flags.
pub(crate) const POLL: Duration = Duration::from_millis(20);

/// Default stream depth in blocks.
pub(crate) const STREAM_DEPTH: usize = 4;

/// A bounded stream of sample blocks.
pub struct Stream<T> {
    tx: Sender<Vec<T>>,
    rx: Receiver<Vec<T>>,
}

impl<T> Stream<T> {
    /// Create a stream holding at most `depth` blocks.
    pub fn new(depth: usize) -> Self {
        let (tx, rx) = bounded(depth);
        Self { tx, rx }
    }

    /// Producer handle for this stream.
    pub fn writer(&self) -> StreamWriter<T> {
        StreamWriter {
            tx: self.tx.clone(),
        }
    }

    /// Consumer handle for this stream.
    pub fn reader(&self) -> StreamReader<T> {
        StreamReader {
            rx: self.rx.clone(),
        }
    }

    /// Discard any buffered blocks. Called when a stage restarts so stale
    /// data from a previous configuration is never delivered downstream.
    pub fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }
}

impl<T> Default for Stream<T> {
    fn default() -> Self {
        Self::new(STREAM_DEPTH)
    }
}

/// Consumer handle to a [`Stream`].
pub struct StreamReader<T> {
    rx: Receiver<Vec<T>>,
}

impl<T> Clone for StreamReader<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T> StreamReader<T> {
    /// Receive the next block. Returns `Ok(None)` when the poll interval
    /// elapsed with nothing to read (caller re-checks its stop flag), and
    /// `Err(WorkError::Shutdown)` when the producer side is gone.
    pub fn recv(&self) -> WorkResult<Option<Vec<T>>> {
        match self.rx.recv_timeout(POLL) {
            Ok(block) => Ok(Some(block)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(WorkError::Shutdown),
        }
    }

    /// Discard everything currently buffered.
    pub fn drain(&self) {
        while self.rx.try_recv().is_ok() {}
    }

    /// Number of blocks currently buffered.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether the stream currently holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Producer handle to a [`Stream`].
pub struct StreamWriter<T> {
    tx: Sender<Vec<T>>,
}

impl<T> Clone for StreamWriter<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> StreamWriter<T> {
    /// Send a block, blocking while the stream is full. `cancel` is the
    /// owning worker's stop flag; a cancelled send returns
    /// `Err(WorkError::Shutdown)` so the worker loop unwinds.
    pub fn send(&self, block: Vec<T>, cancel: &AtomicBool) -> WorkResult<()> {
        let mut block = block;
        loop {
            if cancel.load(Ordering::Relaxed) {
                return Err(WorkError::Shutdown);
            }
            match self.tx.send_timeout(block, POLL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(b)) => block = b,
                Err(SendTimeoutError::Disconnected(_)) => return Err(WorkError::Shutdown),
            }
        }
    }

    /// Send without blocking; the block is dropped when the stream is
    /// full. Returns whether the block was delivered. Used by the
    /// splitter's display branch so a slow display cannot throttle the
    /// audio path.
    pub fn try_send(&self, block: Vec<T>) -> bool {
        self.tx.try_send(block).is_ok()
    }
}
