//! Blackman-windowed sinc low-pass prototype design.
//!
//! Used as the anti-alias filter of every rational resampler in the path.
//! The design is parameterized by cutoff, transition width and the sample
//! rate the filter runs at (for a polyphase resampler that is the input
//! rate times the interpolation factor). Reconfiguration mutates the
//! parameters and rebuilds the taps with [`WindowDesign::build`]; the
//! consumer re-arms itself with the fresh taps afterwards, never before.

use std::f32::consts::PI;

/// Tap count ceiling. Narrow transition widths at high design rates would
/// otherwise produce filters too long to run in real time.
const MAX_TAPS: usize = 4097;
const MIN_TAPS: usize = 15;

/// A low-pass window design: cutoff/transition in Hz at a given rate.
#[derive(Clone, Debug)]
pub struct WindowDesign {
    cutoff: f32,
    trans_width: f32,
    sample_rate: f32,
}

impl WindowDesign {
    pub fn new(cutoff: f32, trans_width: f32, sample_rate: f32) -> Self {
        Self {
            cutoff,
            trans_width,
            sample_rate,
        }
    }

    pub fn set_cutoff(&mut self, cutoff: f32) {
        self.cutoff = cutoff;
    }

    pub fn set_trans_width(&mut self, trans_width: f32) {
        self.trans_width = trans_width;
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }

    /// Number of taps the current parameters produce; always odd.
    pub fn tap_count(&self) -> usize {
        let trans = self.trans_width.max(1.0);
        let n = (4.0 * self.sample_rate / trans).ceil() as usize;
        let n = n.clamp(MIN_TAPS, MAX_TAPS);
        if n % 2 == 0 {
            n + 1
        } else {
            n
        }
    }

    /// Build the Blackman-windowed sinc taps, normalized to unity DC gain.
    pub fn build(&self) -> Vec<f32> {
        let taps = self.tap_count();
        let mid = (taps / 2) as isize;
        let norm_cutoff = (self.cutoff / (self.sample_rate / 2.0)).min(1.0);
        let mut fir = Vec::with_capacity(taps);

        for n in 0..taps {
            let x = n as isize - mid;
            let sinc = if x == 0 {
                norm_cutoff
            } else {
                (norm_cutoff * PI * x as f32).sin() / (PI * x as f32)
            };
            // Blackman window
            let w = 0.42 - 0.5 * ((2.0 * PI * n as f32) / (taps as f32 - 1.0)).cos()
                + 0.08 * ((4.0 * PI * n as f32) / (taps as f32 - 1.0)).cos();
            fir.push(sinc * w);
        }

        let sum: f32 = fir.iter().sum();
        for v in fir.iter_mut() {
            *v /= sum;
        }
        fir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn taps_are_odd_and_bounded() {
        let narrow = WindowDesign::new(1_500.0, 1_500.0, 6_000_000.0);
        assert_eq!(narrow.tap_count(), MAX_TAPS);

        let wide = WindowDesign::new(100_000.0, 100_000.0, 2_000_000.0);
        let n = wide.tap_count();
        assert!(n % 2 == 1);
        assert!((MIN_TAPS..=MAX_TAPS).contains(&n));
    }

    #[test]
    fn unity_dc_gain() {
        let win = WindowDesign::new(24_000.0, 24_000.0, 1_200_000.0);
        let taps = win.build();
        let sum: f32 = taps.iter().sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn impulse_response_is_symmetric() {
        let win = WindowDesign::new(10_000.0, 20_000.0, 200_000.0);
        let taps = win.build();
        let n = taps.len();
        for i in 0..n / 2 {
            assert_relative_eq!(taps[i], taps[n - 1 - i], epsilon = 1e-6);
        }
    }

    #[test]
    fn lower_cutoff_means_smaller_peak() {
        let mut win = WindowDesign::new(5_000.0, 10_000.0, 240_000.0);
        let low = win.build();
        win.set_cutoff(50_000.0);
        let high = win.build();

        let peak = |t: &[f32]| t.iter().fold(0.0f32, |a, &b| a.max(b.abs()));
        assert!(peak(&low) < peak(&high));
    }
}
