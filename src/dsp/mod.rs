//! DSP building blocks shared by the pipeline stages.

pub mod resamp;
pub mod window;

/// Complex baseband sample.
pub type ComplexSample = num_complex::Complex<f32>;

/// One frame of stereo audio.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StereoSample {
    pub l: f32,
    pub r: f32,
}

/// Greatest common divisor, used to reduce resampling ratios.
pub(crate) fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}
