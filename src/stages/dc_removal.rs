//! DC bias removal.
//!
//! Subtracts a slowly tracking average from the wideband stream. The
//! bypass flag is a live per-sample conditional, safe to toggle while the
//! stage runs; the tracking state resets whenever correction re-engages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::dsp::ComplexSample;
use crate::error::PathResult;
use crate::stage::{StreamStage, Worker};
use crate::stream::{Stream, StreamReader};

/// Per-sample tracking coefficient for the DC estimate.
const TRACKING_RATE: f32 = 1e-3;

pub struct DcRemoval {
    input: StreamReader<ComplexSample>,
    output: Stream<ComplexSample>,
    bypass: Arc<AtomicBool>,
    worker: Worker,
}

impl DcRemoval {
    pub fn new(input: StreamReader<ComplexSample>) -> Self {
        Self {
            input,
            output: Stream::default(),
            bypass: Arc::new(AtomicBool::new(true)),
            worker: Worker::new("dc-removal"),
        }
    }

    pub fn output(&self) -> StreamReader<ComplexSample> {
        self.output.reader()
    }

    /// Live-safe: per-sample conditional bypass.
    pub fn set_bypass(&self, bypassed: bool) {
        self.bypass.store(bypassed, Ordering::Relaxed);
    }

    pub fn bypassed(&self) -> bool {
        self.bypass.load(Ordering::Relaxed)
    }
}

impl StreamStage for DcRemoval {
    fn name(&self) -> &'static str {
        "dc-removal"
    }

    fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    fn start(&mut self) -> PathResult {
        self.input.drain();
        self.output.clear();

        let input = self.input.clone();
        let out = self.output.writer();
        let bypass = Arc::clone(&self.bypass);
        let mut dc = ComplexSample::default();
        let mut was_bypassed = true;

        self.worker.spawn(move |stop| {
            let Some(mut block) = input.recv()? else {
                return Ok(0);
            };
            if bypass.load(Ordering::Relaxed) {
                was_bypassed = true;
            } else {
                if was_bypassed {
                    dc = ComplexSample::default();
                    was_bypassed = false;
                }
                for s in block.iter_mut() {
                    dc = dc + (*s - dc) * TRACKING_RATE;
                    *s -= dc;
                }
            }
            out.send(block, stop)?;
            Ok(1)
        })
    }

    fn stop(&mut self) {
        self.worker.stop();
    }
}
