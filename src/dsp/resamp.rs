//! Rational (polyphase) resampling core.
//!
//! Changes sample rate by interp/decim using a polyphase decomposition of
//! a low-pass prototype (see [`crate::dsp::window`]). Generic over the
//! sample type so the channel selector (complex) and the audio resampler
//! (real) share one implementation. State is carried across `process`
//! calls, so input may arrive in blocks of any size.

use std::ops::{Add, Mul};

/// Sample types the polyphase core can filter.
pub trait Sample: Copy + Default + Add<Output = Self> + Mul<f32, Output = Self> {}

impl Sample for f32 {}
impl Sample for super::ComplexSample {}

/// Stateful rational resampler.
pub struct Rational<T> {
    taps: Vec<f32>,
    interp: usize,
    decim: usize,
    taps_per_phase: usize,
    hist: Vec<T>,
    pos: usize,
    phase: usize,
}

impl<T: Sample> Rational<T> {
    /// Create a resampler with ratio `interp/decim` and the given
    /// prototype taps (designed at input rate times `interp`).
    pub fn new(interp: usize, decim: usize, taps: Vec<f32>) -> Self {
        debug_assert!(interp > 0 && decim > 0);
        debug_assert!(!taps.is_empty());
        let (taps, taps_per_phase) = pad_taps(taps, interp);
        Self {
            taps,
            interp,
            decim,
            taps_per_phase,
            hist: vec![T::default(); taps_per_phase],
            pos: 0,
            phase: 0,
        }
    }

    pub fn interpolation(&self) -> usize {
        self.interp
    }

    pub fn decimation(&self) -> usize {
        self.decim
    }

    /// Replace the prototype taps. Filter history is discarded; the phase
    /// counter is kept so the output rate stays exact across the swap.
    pub fn set_taps(&mut self, taps: Vec<f32>) {
        let (taps, taps_per_phase) = pad_taps(taps, self.interp);
        self.taps = taps;
        self.taps_per_phase = taps_per_phase;
        self.hist = vec![T::default(); taps_per_phase];
        self.pos = 0;
    }

    /// Process a block, appending output samples to `out`. Produces
    /// `len * interp / decim` samples on average.
    pub fn process(&mut self, input: &[T], out: &mut Vec<T>) {
        let k = self.taps_per_phase;
        for &x in input {
            self.hist[self.pos] = x;
            self.pos = (self.pos + 1) % k;
            while self.phase < self.interp {
                let mut acc = T::default();
                for t in 0..k {
                    let idx = (self.pos + k - 1 - t) % k;
                    acc = acc + self.hist[idx] * self.taps[self.phase + t * self.interp];
                }
                // Upsampling by interp scales unity-gain taps down by the
                // same factor; compensate here.
                out.push(acc * self.interp as f32);
                self.phase += self.decim;
            }
            self.phase -= self.interp;
        }
    }
}

/// Zero-pad taps to a whole number of phases.
fn pad_taps(mut taps: Vec<f32>, interp: usize) -> (Vec<f32>, usize) {
    let rem = taps.len() % interp;
    if rem != 0 {
        taps.resize(taps.len() + interp - rem, 0.0);
    }
    let taps_per_phase = taps.len() / interp;
    (taps, taps_per_phase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::window::WindowDesign;
    use approx::assert_relative_eq;

    #[test]
    fn unit_ratio_single_tap_is_identity() {
        let mut r: Rational<f32> = Rational::new(1, 1, vec![1.0]);
        let mut out = Vec::new();
        r.process(&[1.0, -2.0, 3.0], &mut out);
        assert_eq!(out, vec![1.0, -2.0, 3.0]);
    }

    #[test]
    fn output_count_matches_ratio() {
        let win = WindowDesign::new(24_000.0, 24_000.0, 1_200_000.0);
        // 200 kHz -> 48 kHz: 6/25
        let mut r: Rational<f32> = Rational::new(6, 25, win.build());
        let mut out = Vec::new();
        r.process(&vec![0.0; 1000], &mut out);
        assert_eq!(out.len(), 240);
    }

    #[test]
    fn dc_gain_is_preserved() {
        let win = WindowDesign::new(24_000.0, 24_000.0, 1_200_000.0);
        let mut r: Rational<f32> = Rational::new(6, 25, win.build());
        let mut out = Vec::new();
        r.process(&vec![1.0; 4000], &mut out);
        // Skip the filter's settling transient.
        let tail = &out[out.len() / 2..];
        for &y in tail {
            assert_relative_eq!(y, 1.0, epsilon = 0.02);
        }
    }

    #[test]
    fn state_carries_across_blocks() {
        let win = WindowDesign::new(5_000.0, 5_000.0, 40_000.0);
        let taps = win.build();

        let mut whole: Rational<f32> = Rational::new(1, 2, taps.clone());
        let mut split: Rational<f32> = Rational::new(1, 2, taps);

        let input: Vec<f32> = (0..600).map(|i| (i as f32 * 0.05).sin()).collect();
        let mut a = Vec::new();
        whole.process(&input, &mut a);

        let mut b = Vec::new();
        split.process(&input[..173], &mut b);
        split.process(&input[173..], &mut b);

        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_relative_eq!(x, y, epsilon = 1e-6);
        }
    }

    #[test]
    fn works_on_complex_samples() {
        use crate::dsp::ComplexSample;
        let win = WindowDesign::new(100_000.0, 100_000.0, 2_000_000.0);
        let mut r: Rational<ComplexSample> = Rational::new(1, 10, win.build());
        let mut out = Vec::new();
        r.process(&vec![ComplexSample::new(1.0, 0.0); 1000], &mut out);
        assert_eq!(out.len(), 100);
        assert_relative_eq!(out[out.len() - 1].re, 1.0, epsilon = 0.02);
    }
}
