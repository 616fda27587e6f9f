//! Audio-rate resampler.
//!
//! Brings the active demodulator's output from the channel rate to the
//! audio device rate with a rational polyphase resampler. The stage is
//! rewired to a different upstream demodulator on every mode change, so
//! its input is optional; starting an unwired stage is a configuration
//! error, not a panic.
//!
//! Tap design lives with the orchestrator: the anti-alias cutoff depends
//! on both the audio rate and the channel bandwidth, which only the
//! orchestrator knows together. It pushes fresh taps in with
//! [`AudioResampler::update_window`] before every restart.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::dsp::gcd;
use crate::dsp::resamp::Rational;
use crate::dsp::window::WindowDesign;
use crate::error::{PathError, PathResult};
use crate::stage::{StreamStage, Worker};
use crate::stream::{Stream, StreamReader};

pub struct AudioResampler {
    input: Option<StreamReader<f32>>,
    output: Stream<f32>,
    input_rate: u32,
    input_block: usize,
    output_rate: u32,
    taps: Option<Vec<f32>>,
    mismatches: Arc<AtomicUsize>,
    worker: Worker,
}

impl AudioResampler {
    pub fn new(output_rate: u32) -> Self {
        Self {
            input: None,
            output: Stream::default(),
            input_rate: output_rate,
            input_block: 1,
            output_rate,
            taps: None,
            mismatches: Arc::new(AtomicUsize::new(0)),
            worker: Worker::new("audio-resamp"),
        }
    }

    pub fn output(&self) -> StreamReader<f32> {
        self.output.reader()
    }

    /// Stopped-only: rewire to a different demodulator's output.
    pub fn set_input(&mut self, input: StreamReader<f32>) {
        self.input = Some(input);
    }

    /// Stopped-only: the channel rate and block size of the upstream
    /// demodulator.
    pub fn set_input_rate(&mut self, rate: u32, input_block: usize) -> PathResult {
        if rate == 0 || input_block == 0 {
            return Err(PathError::InvalidConfig {
                stage: "audio-resamp",
                reason: format!("input rate {} / block {} must be positive", rate, input_block),
            });
        }
        self.input_rate = rate;
        self.input_block = input_block;
        Ok(())
    }

    /// Stopped-only.
    pub fn set_output_rate(&mut self, rate: u32) -> PathResult {
        if rate == 0 {
            return Err(PathError::InvalidConfig {
                stage: "audio-resamp",
                reason: "output rate must be positive".into(),
            });
        }
        self.output_rate = rate;
        Ok(())
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Interpolation factor of the current rate pair. The anti-alias
    /// prototype must be designed at `input_rate * interpolation()`.
    pub fn interpolation(&self) -> usize {
        (self.output_rate / gcd(self.input_rate, self.output_rate)) as usize
    }

    /// Stopped-only: install fresh anti-alias taps. Must be called after
    /// every rate or bandwidth change, before the next start.
    pub fn update_window(&mut self, design: &WindowDesign) {
        let taps = design.build();
        debug!(
            "[audio-resamp] {} taps, cutoff {} Hz",
            taps.len(),
            design.cutoff()
        );
        self.taps = Some(taps);
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

impl StreamStage for AudioResampler {
    fn name(&self) -> &'static str {
        "audio-resamp"
    }

    fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    fn start(&mut self) -> PathResult {
        let Some(input) = self.input.clone() else {
            return Err(PathError::NotWired {
                stage: "audio-resamp",
            });
        };
        let Some(taps) = self.taps.clone() else {
            return Err(PathError::InvalidConfig {
                stage: "audio-resamp",
                reason: "no anti-alias taps installed".into(),
            });
        };
        input.drain();
        self.output.clear();

        let g = gcd(self.input_rate, self.output_rate);
        let interp = (self.output_rate / g) as usize;
        let decim = (self.input_rate / g) as usize;
        let mut resamp: Rational<f32> = Rational::new(interp, decim, taps);

        let out = self.output.writer();
        let expected = self.input_block;
        let mismatches = Arc::clone(&self.mismatches);

        self.worker.spawn(move |stop| {
            let Some(block) = input.recv()? else {
                return Ok(0);
            };
            if block.len() != expected {
                mismatches.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "[audio-resamp] block size mismatch: got {}, expected {}",
                    block.len(),
                    expected
                );
            }
            let mut audio = Vec::with_capacity(block.len() * interp / decim + 1);
            resamp.process(&block, &mut audio);
            if !audio.is_empty() {
                out.send(audio, stop)?;
            }
            Ok(1)
        })
    }

    fn stop(&mut self) {
        self.worker.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn armed(input_rate: u32, block: usize, output_rate: u32) -> AudioResampler {
        let mut r = AudioResampler::new(output_rate);
        r.set_input_rate(input_rate, block).unwrap();
        let fs = input_rate as f32 * r.interpolation() as f32;
        let cutoff = (output_rate as f32 / 2.0).min(input_rate as f32 / 2.0);
        r.update_window(&WindowDesign::new(cutoff, cutoff, fs));
        r
    }

    #[test]
    fn unwired_start_is_an_error() {
        let mut r = armed(200_000, 1_000, 48_000);
        assert!(matches!(r.start(), Err(PathError::NotWired { .. })));
    }

    #[test]
    fn start_without_taps_is_an_error() {
        let source: Stream<f32> = Stream::default();
        let mut r = AudioResampler::new(48_000);
        r.set_input(source.reader());
        assert!(matches!(r.start(), Err(PathError::InvalidConfig { .. })));
    }

    #[test]
    fn interpolation_tracks_rate_pair() {
        let r = armed(200_000, 1_000, 48_000);
        // 200 kHz -> 48 kHz reduces to 6/25.
        assert_eq!(r.interpolation(), 6);
    }

    #[test]
    fn resamples_dc_to_output_rate() {
        let source: Stream<f32> = Stream::new(16);
        let mut r = armed(200_000, 1_000, 48_000);
        r.set_input(source.reader());
        let out = r.output();
        r.start().unwrap();

        let cancel = AtomicBool::new(false);
        let writer = source.writer();
        for _ in 0..10 {
            writer.send(vec![1.0; 1_000], &cancel).unwrap();
        }

        let mut got: Vec<f32> = Vec::new();
        for _ in 0..500 {
            if let Ok(Some(block)) = out.recv() {
                got.extend(block);
            }
            if got.len() >= 2_400 {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        r.stop();

        // 10_000 input samples at 6/25 produce 2_400 output samples.
        assert!(got.len() >= 2_400, "only {} samples", got.len());
        for &y in &got[got.len() / 2..] {
            assert!((y - 1.0).abs() < 0.02, "gain error: {}", y);
        }
        assert_eq!(r.mismatch_count(), 0);
    }

    #[test]
    fn counts_block_size_mismatches() {
        let source: Stream<f32> = Stream::new(16);
        let mut r = armed(12_500, 62, 48_000);
        r.set_input(source.reader());
        let out = r.output();
        r.start().unwrap();

        let cancel = AtomicBool::new(false);
        source.writer().send(vec![0.0; 125], &cancel).unwrap();
        for _ in 0..200 {
            if let Ok(Some(_)) = out.recv() {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        r.stop();
        assert_eq!(r.mismatch_count(), 1);
    }
}
