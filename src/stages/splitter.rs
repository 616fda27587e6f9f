//! Stream splitter feeding the display and demodulation branches.
//!
//! Each branch has its own buffer. The demodulation branch (`output_b`)
//! uses blocking backpressure; the display branch (`output_a`) drops
//! blocks when full so a slow display consumer can never throttle the
//! audio path. Drops are counted and logged.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::dsp::ComplexSample;
use crate::error::PathResult;
use crate::stage::{StreamStage, Worker};
use crate::stream::{Stream, StreamReader};

pub struct Splitter {
    input: StreamReader<ComplexSample>,
    output_a: Stream<ComplexSample>,
    output_b: Stream<ComplexSample>,
    drops: Arc<AtomicUsize>,
    worker: Worker,
}

impl Splitter {
    pub fn new(input: StreamReader<ComplexSample>) -> Self {
        Self {
            input,
            output_a: Stream::default(),
            output_b: Stream::default(),
            drops: Arc::new(AtomicUsize::new(0)),
            worker: Worker::new("splitter"),
        }
    }

    /// Display branch, lossy under backpressure.
    pub fn output_a(&self) -> StreamReader<ComplexSample> {
        self.output_a.reader()
    }

    /// Demodulation branch, blocking.
    pub fn output_b(&self) -> StreamReader<ComplexSample> {
        self.output_b.reader()
    }

    /// Blocks dropped on the display branch so far.
    pub fn drop_count(&self) -> usize {
        self.drops.load(Ordering::Relaxed)
    }
}

impl StreamStage for Splitter {
    fn name(&self) -> &'static str {
        "splitter"
    }

    fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    fn start(&mut self) -> PathResult {
        self.input.drain();
        self.output_a.clear();
        self.output_b.clear();

        let input = self.input.clone();
        let out_a = self.output_a.writer();
        let out_b = self.output_b.writer();
        let drops = Arc::clone(&self.drops);

        self.worker.spawn(move |stop| {
            let Some(block) = input.recv()? else {
                return Ok(0);
            };
            if !out_a.try_send(block.clone()) {
                let total = drops.fetch_add(1, Ordering::Relaxed) + 1;
                if total % 100 == 1 {
                    warn!("[splitter] display branch full, {} blocks dropped", total);
                }
            }
            out_b.send(block, stop)?;
            Ok(1)
        })
    }

    fn stop(&mut self) {
        self.worker.stop();
    }
}
