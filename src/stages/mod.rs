//! Pipeline stages.
//!
//! Each stage owns its output stream and a worker thread; see
//! [`crate::stage`] for the lifecycle contract.

pub mod audio;
pub mod dc_removal;
pub mod demod;
pub mod resampler;
pub mod spectrum;
pub mod splitter;
pub mod vfo;

pub use audio::{AudioHandler, AudioSink, MonoToStereo};
pub use dc_removal::DcRemoval;
pub use demod::{AmDetector, FmDiscriminator, Sideband, SsbDetector};
pub use resampler::AudioResampler;
pub use spectrum::{FftHandler, SpectrumFramer};
pub use splitter::Splitter;
pub use vfo::ChannelSelector;
