//! Channel selector ("VFO").
//!
//! Extracts a frequency-shifted, filtered, rate-reduced sub-channel from
//! the wideband stream: a complex NCO mixes the channel at `offset` down
//! to zero, then a rational polyphase resampler (anti-alias cutoff at half
//! the channel bandwidth) reduces the rate. Output is framed into exact
//! `output_block_size()` chunks so block-oriented consumers always see
//! fixed-size frames.
//!
//! Offset and bandwidth are live atomics; the worker rebuilds its mixer
//! increment and filter taps when it observes a change. Rate changes
//! require the stage to be stopped.

use std::f32::consts::PI;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::dsp::resamp::Rational;
use crate::dsp::window::WindowDesign;
use crate::dsp::{gcd, ComplexSample};
use crate::error::{PathError, PathResult};
use crate::stage::{StreamStage, Worker};
use crate::stream::{Stream, StreamReader};

pub struct ChannelSelector {
    input: StreamReader<ComplexSample>,
    output: Stream<ComplexSample>,
    offset_bits: Arc<AtomicU32>,
    bandwidth_bits: Arc<AtomicU32>,
    input_rate: u32,
    input_block: usize,
    output_rate: u32,
    worker: Worker,
}

impl ChannelSelector {
    pub fn new(
        input: StreamReader<ComplexSample>,
        input_rate: u32,
        output_rate: u32,
        bandwidth: f32,
        input_block: usize,
    ) -> Self {
        let bandwidth = bandwidth.min(output_rate as f32);
        Self {
            input,
            output: Stream::default(),
            offset_bits: Arc::new(AtomicU32::new(0f32.to_bits())),
            bandwidth_bits: Arc::new(AtomicU32::new(bandwidth.to_bits())),
            input_rate,
            input_block,
            output_rate,
            worker: Worker::new("vfo"),
        }
    }

    pub fn output(&self) -> StreamReader<ComplexSample> {
        self.output.reader()
    }

    /// Live-safe: shifts the mix frequency with no stream restart. Offsets
    /// beyond the representable spectrum are clamped to ±input_rate/2.
    pub fn set_offset(&self, offset: f32) {
        let limit = self.input_rate as f32 / 2.0;
        let clamped = offset.clamp(-limit, limit);
        if clamped != offset {
            warn!("[vfo] offset {} Hz clamped to {} Hz", offset, clamped);
        }
        self.offset_bits.store(clamped.to_bits(), Ordering::Relaxed);
    }

    pub fn offset(&self) -> f32 {
        f32::from_bits(self.offset_bits.load(Ordering::Relaxed))
    }

    /// Live-safe: the worker rebuilds its filter taps on change. Requests
    /// wider than the output rate are clamped.
    pub fn set_bandwidth(&self, bandwidth: f32) {
        let clamped = bandwidth.min(self.output_rate as f32);
        if clamped != bandwidth {
            warn!(
                "[vfo] bandwidth {} Hz exceeds output rate, clamped to {} Hz",
                bandwidth, clamped
            );
        }
        self.bandwidth_bits
            .store(clamped.to_bits(), Ordering::Relaxed);
    }

    pub fn bandwidth(&self) -> f32 {
        f32::from_bits(self.bandwidth_bits.load(Ordering::Relaxed))
    }

    /// Stopped-only: recomputes the decimation ratio.
    pub fn set_input_rate(&mut self, rate: u32, input_block: usize) -> PathResult {
        if rate == 0 || input_block == 0 {
            return Err(PathError::InvalidConfig {
                stage: "vfo",
                reason: format!("input rate {} / block {} must be positive", rate, input_block),
            });
        }
        self.input_rate = rate;
        self.input_block = input_block;
        Ok(())
    }

    /// Stopped-only: recomputes filter taps and decimation.
    pub fn set_output_rate(&mut self, rate: u32, bandwidth: f32) -> PathResult {
        if rate == 0 || rate > self.input_rate {
            return Err(PathError::InvalidConfig {
                stage: "vfo",
                reason: format!(
                    "output rate {} must be in 1..={}",
                    rate, self.input_rate
                ),
            });
        }
        self.output_rate = rate;
        self.set_bandwidth(bandwidth);
        debug!(
            "[vfo] output rate {} Hz, bandwidth {} Hz, block {}",
            rate,
            self.bandwidth(),
            self.output_block_size()
        );
        Ok(())
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn start_count(&self) -> usize {
        self.worker.start_count()
    }

    pub fn stop_count(&self) -> usize {
        self.worker.stop_count()
    }

    /// Size of the fixed frames this stage emits; downstream block-oriented
    /// stages must size their processing to match.
    pub fn output_block_size(&self) -> usize {
        let n = self.input_block as u64 * self.output_rate as u64 / self.input_rate as u64;
        (n as usize).max(1)
    }
}

impl StreamStage for ChannelSelector {
    fn name(&self) -> &'static str {
        "vfo"
    }

    fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    fn start(&mut self) -> PathResult {
        self.input.drain();
        self.output.clear();

        let g = gcd(self.input_rate, self.output_rate);
        let interp = (self.output_rate / g) as usize;
        let decim = (self.input_rate / g) as usize;
        let fs = self.input_rate as f32;
        let out_block = self.output_block_size();

        let input = self.input.clone();
        let out = self.output.writer();
        let offset_bits = Arc::clone(&self.offset_bits);
        let bandwidth_bits = Arc::clone(&self.bandwidth_bits);

        let design = move |bw: f32| {
            WindowDesign::new(bw / 2.0, bw / 2.0, fs * interp as f32).build()
        };

        let mut bandwidth = self.bandwidth();
        let mut resamp: Rational<ComplexSample> =
            Rational::new(interp, decim, design(bandwidth));

        let mut offset = f32::from_bits(offset_bits.load(Ordering::Relaxed));
        let mut rot = ComplexSample::new(1.0, 0.0);
        let mut mult = mixer_step(offset, fs);
        let mut pending: Vec<ComplexSample> = Vec::with_capacity(out_block * 2);

        self.worker.spawn(move |stop| {
            let new_bw = f32::from_bits(bandwidth_bits.load(Ordering::Relaxed));
            if new_bw != bandwidth {
                bandwidth = new_bw;
                resamp.set_taps(design(bandwidth));
            }
            let new_offset = f32::from_bits(offset_bits.load(Ordering::Relaxed));
            if new_offset != offset {
                offset = new_offset;
                mult = mixer_step(offset, fs);
            }

            let Some(mut block) = input.recv()? else {
                return Ok(0);
            };
            for s in block.iter_mut() {
                *s *= rot;
                rot *= mult;
            }
            // Renormalize so rounding error cannot grow the oscillator.
            let norm = rot.norm();
            if norm > 0.0 {
                rot /= norm;
            }

            resamp.process(&block, &mut pending);

            let mut sent = 0usize;
            while pending.len() >= out_block {
                let frame: Vec<ComplexSample> = pending.drain(..out_block).collect();
                out.send(frame, stop)?;
                sent += 1;
            }
            Ok(sent)
        })
    }

    fn stop(&mut self) {
        self.worker.stop();
    }
}

/// Per-sample mixer rotation shifting `offset` Hz down to zero.
fn mixer_step(offset: f32, sample_rate: f32) -> ComplexSample {
    let angle = -2.0 * PI * offset / sample_rate;
    ComplexSample::new(angle.cos(), angle.sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[test]
    fn block_size_tracks_rate_ratio() {
        let source: Stream<ComplexSample> = Stream::default();
        let mut vfo =
            ChannelSelector::new(source.reader(), 2_000_000, 200_000, 200_000.0, 10_000);
        assert_eq!(vfo.output_block_size(), 1_000);

        vfo.set_output_rate(12_500, 12_500.0).unwrap();
        assert_eq!(vfo.output_block_size(), 62);

        vfo.set_output_rate(6_000, 3_000.0).unwrap();
        assert_eq!(vfo.output_block_size(), 30);

        vfo.set_input_rate(1_000_000, 5_000).unwrap();
        assert_eq!(vfo.output_block_size(), 30);
    }

    #[test]
    fn rejects_upsampling_and_zero_rates() {
        let source: Stream<ComplexSample> = Stream::default();
        let mut vfo =
            ChannelSelector::new(source.reader(), 1_000_000, 200_000, 200_000.0, 5_000);
        assert!(vfo.set_output_rate(2_000_000, 200_000.0).is_err());
        assert!(vfo.set_output_rate(0, 200_000.0).is_err());
        assert!(vfo.set_input_rate(0, 5_000).is_err());
    }

    #[test]
    fn bandwidth_wider_than_output_rate_is_clamped() {
        let source: Stream<ComplexSample> = Stream::default();
        let vfo = ChannelSelector::new(source.reader(), 1_000_000, 200_000, 500_000.0, 5_000);
        assert_eq!(vfo.bandwidth(), 200_000.0);
    }

    #[test]
    fn extracts_offset_tone_as_near_dc() {
        let fs = 1_000_000u32;
        let offset = 50_000.0f32;
        let source: Stream<ComplexSample> = Stream::new(16);
        let mut vfo = ChannelSelector::new(source.reader(), fs, 100_000, 100_000.0, 5_000);
        vfo.set_offset(offset);
        let out = vfo.output();
        vfo.start().unwrap();

        let cancel = AtomicBool::new(false);
        let writer = source.writer();
        let mut phase = 0.0f32;
        for _ in 0..8 {
            let block: Vec<ComplexSample> = (0..5_000)
                .map(|_| {
                    phase += 2.0 * PI * offset / fs as f32;
                    ComplexSample::new(phase.cos(), phase.sin())
                })
                .collect();
            writer.send(block, &cancel).unwrap();
        }

        let mut collected: Vec<ComplexSample> = Vec::new();
        for _ in 0..500 {
            if let Ok(Some(block)) = out.recv() {
                assert_eq!(block.len(), 500);
                collected.extend(block);
            }
            if collected.len() >= 2_000 {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        vfo.stop();
        assert!(collected.len() >= 2_000, "only {} samples", collected.len());

        // Mixed to baseband the tone is DC: successive samples barely rotate.
        let tail = &collected[collected.len() - 500..];
        for pair in tail.windows(2) {
            let d = (pair[1] * pair[0].conj()).arg();
            assert!(d.abs() < 0.05, "residual rotation {}", d);
        }
    }
}
