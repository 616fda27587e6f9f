//! Spectrum tap: decimating block-framer for the FFT display.
//!
//! Accumulates fixed-size complex frames and hands each one to the display
//! callback, then discards `skip` samples so frames are delivered at the
//! configured refresh rate (`skip = sample_rate / fft_rate - fft_size`).
//! Rate bounding beyond that comes from the splitter's lossy display
//! branch: a slow callback causes drops upstream, never audio stalls.

use std::sync::{Arc, Mutex};

use crate::dsp::ComplexSample;
use crate::error::PathResult;
use crate::stage::{StreamStage, Worker};
use crate::stream::StreamReader;

/// Display collaborator callback. Invoked with exactly `fft_size` samples.
pub type FftHandler = Arc<Mutex<dyn FnMut(&[ComplexSample]) + Send>>;

pub struct SpectrumFramer {
    input: StreamReader<ComplexSample>,
    fft_size: usize,
    skip: usize,
    handler: FftHandler,
    worker: Worker,
}

impl SpectrumFramer {
    pub fn new(
        input: StreamReader<ComplexSample>,
        fft_size: usize,
        skip: usize,
        handler: FftHandler,
    ) -> Self {
        Self {
            input,
            fft_size,
            skip,
            handler,
            worker: Worker::new("spectrum"),
        }
    }

    /// Stopped-only. The frame size itself is fixed at construction; only
    /// the inter-frame gap follows the wideband rate.
    pub fn set_skip(&mut self, skip: usize) {
        self.skip = skip;
    }
}

impl StreamStage for SpectrumFramer {
    fn name(&self) -> &'static str {
        "spectrum"
    }

    fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    fn start(&mut self) -> PathResult {
        self.input.drain();

        let input = self.input.clone();
        let fft_size = self.fft_size;
        let skip = self.skip;
        let handler = Arc::clone(&self.handler);
        let mut frame: Vec<ComplexSample> = Vec::with_capacity(fft_size);
        let mut skipping = 0usize;

        self.worker.spawn(move |_stop| {
            let Some(block) = input.recv()? else {
                return Ok(0);
            };
            let mut frames = 0usize;
            for &s in &block {
                if skipping > 0 {
                    skipping -= 1;
                    continue;
                }
                frame.push(s);
                if frame.len() == fft_size {
                    (&mut *handler.lock().unwrap())(&frame);
                    frame.clear();
                    skipping = skip;
                    frames += 1;
                }
            }
            Ok(frames)
        })
    }

    fn stop(&mut self) {
        self.worker.stop();
    }
}
