//! Reconfigurable DSP signal path for a software radio receiver
//!
//! This library turns a wideband complex baseband stream into demodulated
//! stereo audio plus a spectrum/FFT tap, using a thread-per-stage graph
//! connected by bounded channels. Sample rates, bandwidths and the active
//! demodulator can all change while the stream runs.
//!
//! # Architecture
//!
//! - **Stages**: thread-per-stage execution over crossbeam channels; each
//!   stage implements [`StreamStage`]
//! - **SignalPath**: the orchestrator; sole initiator of the
//!   stop-reconfigure-start sequence
//! - **Demodulators**: wide/narrow FM, AM envelope, upper/lower sideband
//! - **Collaborators**: the FFT display and audio playback attach as
//!   callbacks; the wideband source pushes blocks through a stream writer
//!
//! # Example
//!
//! ```no_run
//! use std::sync::{Arc, Mutex};
//! use sigpath::{AudioHandler, FftHandler, PathConfig, SignalPath};
//!
//! let fft: FftHandler = Arc::new(Mutex::new(|_frame: &[sigpath::ComplexSample]| {}));
//! let audio: AudioHandler = Arc::new(Mutex::new(|_block: &[sigpath::StereoSample]| {}));
//! let mut path = SignalPath::new(PathConfig::default(), fft, audio)?;
//! let source = path.input();
//! path.start()?;
//! // ... push wideband blocks through `source`
//! # Ok::<(), sigpath::PathError>(())
//! ```

pub mod dsp;
pub mod error;
pub mod path;
pub mod stage;
pub mod stages;
pub mod stream;
pub mod watchdog;

pub use dsp::{ComplexSample, StereoSample};
pub use error::{PathError, PathResult, WorkError, WorkResult};
pub use path::{DemodFamily, DemodMode, PathConfig, SignalPath, VariantConfig, VariantTable};
pub use stage::StreamStage;
pub use stages::{AudioHandler, FftHandler, Sideband};
pub use stream::{Stream, StreamReader, StreamWriter};
