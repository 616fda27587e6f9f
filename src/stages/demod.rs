//! Demodulator stages.
//!
//! Each demodulator consumes the channel selector's complex stream and
//! produces a real-valued stream at the channel rate; the shared audio
//! resampler downstream brings that to the audio output rate.
//!
//! The FM discriminator is a single stage shared by the wide and narrow FM
//! modes; only its deviation and rate differ. Deviation is a live atomic
//! because a bandwidth change must not disturb discriminator state (a
//! reset would produce an audible click).

use std::f32::consts::PI;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::dsp::ComplexSample;
use crate::error::PathResult;
use crate::stage::{StreamStage, Worker};
use crate::stream::{Stream, StreamReader};

/// Sideband polarity for SSB reception. A static mode attribute, not a
/// live-tunable one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sideband {
    Upper,
    Lower,
}

/// Quadrature FM detector: recovers instantaneous frequency, normalized so
/// full deviation maps to ±1.
pub struct FmDiscriminator {
    input: StreamReader<ComplexSample>,
    output: Stream<f32>,
    sample_rate: u32,
    deviation_bits: Arc<AtomicU32>,
    block_size: usize,
    mismatches: Arc<AtomicUsize>,
    worker: Worker,
}

impl FmDiscriminator {
    pub fn new(
        input: StreamReader<ComplexSample>,
        sample_rate: u32,
        deviation: f32,
        block_size: usize,
    ) -> Self {
        Self {
            input,
            output: Stream::default(),
            sample_rate,
            deviation_bits: Arc::new(AtomicU32::new(deviation.to_bits())),
            block_size,
            mismatches: Arc::new(AtomicUsize::new(0)),
            worker: Worker::new("fm-demod"),
        }
    }

    pub fn output(&self) -> StreamReader<f32> {
        self.output.reader()
    }

    /// Stopped-only.
    pub fn set_sample_rate(&mut self, rate: u32) {
        self.sample_rate = rate;
    }

    /// Live-safe: tracked per block by the worker.
    pub fn set_deviation(&self, deviation: f32) {
        self.deviation_bits
            .store(deviation.max(1.0).to_bits(), Ordering::Relaxed);
    }

    pub fn deviation(&self) -> f32 {
        f32::from_bits(self.deviation_bits.load(Ordering::Relaxed))
    }

    /// Stopped-only.
    pub fn set_block_size(&mut self, block_size: usize) {
        self.block_size = block_size;
    }

    pub fn start_count(&self) -> usize {
        self.worker.start_count()
    }

    pub fn stop_count(&self) -> usize {
        self.worker.stop_count()
    }

    pub fn mismatch_count(&self) -> usize {
        self.mismatches.load(Ordering::Relaxed)
    }
}

impl StreamStage for FmDiscriminator {
    fn name(&self) -> &'static str {
        "fm-demod"
    }

    fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    fn start(&mut self) -> PathResult {
        self.input.drain();
        self.output.clear();

        let input = self.input.clone();
        let out = self.output.writer();
        let fs = self.sample_rate as f32;
        let deviation_bits = Arc::clone(&self.deviation_bits);
        let expected = self.block_size;
        let mismatches = Arc::clone(&self.mismatches);
        let mut last = ComplexSample::new(1.0, 0.0);

        self.worker.spawn(move |stop| {
            let Some(block) = input.recv()? else {
                return Ok(0);
            };
            if block.len() != expected {
                mismatches.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "[fm-demod] block size mismatch: got {}, expected {}",
                    block.len(),
                    expected
                );
            }
            let deviation = f32::from_bits(deviation_bits.load(Ordering::Relaxed));
            let gain = fs / (2.0 * PI * deviation);
            let mut audio = Vec::with_capacity(block.len());
            for &s in &block {
                let d = (s * last.conj()).arg();
                last = s;
                audio.push(d * gain);
            }
            out.send(audio, stop)?;
            Ok(1)
        })
    }

    fn stop(&mut self) {
        self.worker.stop();
    }
}

/// Envelope detector: magnitude minus a slow-tracking carrier mean.
pub struct AmDetector {
    input: StreamReader<ComplexSample>,
    output: Stream<f32>,
    worker: Worker,
}

impl AmDetector {
    pub fn new(input: StreamReader<ComplexSample>) -> Self {
        Self {
            input,
            output: Stream::default(),
            worker: Worker::new("am-demod"),
        }
    }

    pub fn output(&self) -> StreamReader<f32> {
        self.output.reader()
    }
}

impl StreamStage for AmDetector {
    fn name(&self) -> &'static str {
        "am-demod"
    }

    fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    fn start(&mut self) -> PathResult {
        self.input.drain();
        self.output.clear();

        let input = self.input.clone();
        let out = self.output.writer();
        let mut mean = 0.0f32;

        self.worker.spawn(move |stop| {
            let Some(block) = input.recv()? else {
                return Ok(0);
            };
            let mut audio = Vec::with_capacity(block.len());
            for &s in &block {
                let mag = s.norm();
                mean += (mag - mean) * 1e-3;
                audio.push(mag - mean);
            }
            out.send(audio, stop)?;
            Ok(1)
        })
    }

    fn stop(&mut self) {
        self.worker.stop();
    }
}

/// Product detector for single sideband: shifts the passband edge to the
/// carrier position and takes the real part.
pub struct SsbDetector {
    input: StreamReader<ComplexSample>,
    output: Stream<f32>,
    sample_rate: u32,
    bandwidth: f32,
    sideband: Sideband,
    worker: Worker,
}

impl SsbDetector {
    pub fn new(input: StreamReader<ComplexSample>, sample_rate: u32, bandwidth: f32) -> Self {
        Self {
            input,
            output: Stream::default(),
            sample_rate,
            bandwidth,
            sideband: Sideband::Upper,
            worker: Worker::new("ssb-demod"),
        }
    }

    pub fn output(&self) -> StreamReader<f32> {
        self.output.reader()
    }

    /// Stopped-only: sideband polarity is a static mode attribute.
    pub fn set_sideband(&mut self, sideband: Sideband) {
        self.sideband = sideband;
    }

    pub fn sideband(&self) -> Sideband {
        self.sideband
    }

    /// Stopped-only.
    pub fn set_sample_rate(&mut self, rate: u32, bandwidth: f32) {
        self.sample_rate = rate;
        self.bandwidth = bandwidth;
    }
}

impl StreamStage for SsbDetector {
    fn name(&self) -> &'static str {
        "ssb-demod"
    }

    fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    fn start(&mut self) -> PathResult {
        self.input.drain();
        self.output.clear();

        let input = self.input.clone();
        let out = self.output.writer();
        let shift = match self.sideband {
            Sideband::Upper => -self.bandwidth / 2.0,
            Sideband::Lower => self.bandwidth / 2.0,
        };
        let angle = 2.0 * PI * shift / self.sample_rate as f32;
        let mult = ComplexSample::new(angle.cos(), angle.sin());
        let mut rot = ComplexSample::new(1.0, 0.0);

        self.worker.spawn(move |stop| {
            let Some(block) = input.recv()? else {
                return Ok(0);
            };
            let mut audio = Vec::with_capacity(block.len());
            for &s in &block {
                audio.push((s * rot).re * 2.0);
                rot *= mult;
            }
            let norm = rot.norm();
            if norm > 0.0 {
                rot /= norm;
            }
            out.send(audio, stop)?;
            Ok(1)
        })
    }

    fn stop(&mut self) {
        self.worker.stop();
    }
}
