//! Audio terminal stages.
//!
//! [`MonoToStereo`] duplicates the mono audio stream into interleaved
//! stereo frames. [`AudioSink`] applies volume and hands the result to the
//! playback collaborator callback. Volume is a live atomic; a playback
//! callback that blocks stalls only the audio branch and trips the
//! watchdog, never the display branch.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::dsp::StereoSample;
use crate::error::PathResult;
use crate::stage::{StreamStage, Worker};
use crate::stream::{Stream, StreamReader};

/// Playback collaborator callback.
pub type AudioHandler = Arc<Mutex<dyn FnMut(&[StereoSample]) + Send>>;

pub struct MonoToStereo {
    input: StreamReader<f32>,
    output: Stream<StereoSample>,
    worker: Worker,
}

impl MonoToStereo {
    pub fn new(input: StreamReader<f32>) -> Self {
        Self {
            input,
            output: Stream::default(),
            worker: Worker::new("mono-to-stereo"),
        }
    }

    pub fn output(&self) -> StreamReader<StereoSample> {
        self.output.reader()
    }
}

impl StreamStage for MonoToStereo {
    fn name(&self) -> &'static str {
        "mono-to-stereo"
    }

    fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    fn start(&mut self) -> PathResult {
        self.input.drain();
        self.output.clear();

        let input = self.input.clone();
        let out = self.output.writer();

        self.worker.spawn(move |stop| {
            let Some(block) = input.recv()? else {
                return Ok(0);
            };
            let stereo: Vec<StereoSample> = block
                .iter()
                .map(|&m| StereoSample { l: m, r: m })
                .collect();
            out.send(stereo, stop)?;
            Ok(1)
        })
    }

    fn stop(&mut self) {
        self.worker.stop();
    }
}

pub struct AudioSink {
    input: StreamReader<StereoSample>,
    volume_bits: Arc<AtomicU32>,
    handler: AudioHandler,
    worker: Worker,
}

impl AudioSink {
    pub fn new(input: StreamReader<StereoSample>, handler: AudioHandler) -> Self {
        Self {
            input,
            volume_bits: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            handler,
            worker: Worker::new("audio-sink"),
        }
    }

    /// Live-safe: applied per block by the worker. Negative values are
    /// clamped to zero.
    pub fn set_volume(&self, volume: f32) {
        self.volume_bits
            .store(volume.max(0.0).to_bits(), Ordering::Relaxed);
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }
}

impl StreamStage for AudioSink {
    fn name(&self) -> &'static str {
        "audio-sink"
    }

    fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    fn start(&mut self) -> PathResult {
        self.input.drain();

        let input = self.input.clone();
        let volume_bits = Arc::clone(&self.volume_bits);
        let handler = Arc::clone(&self.handler);
        let mut scaled: Vec<StereoSample> = Vec::new();

        self.worker.spawn(move |_stop| {
            let Some(block) = input.recv()? else {
                return Ok(0);
            };
            let volume = f32::from_bits(volume_bits.load(Ordering::Relaxed));
            scaled.clear();
            scaled.extend(block.iter().map(|s| StereoSample {
                l: s.l * volume,
                r: s.r * volume,
            }));
            (&mut *handler.lock().unwrap())(&scaled);
            Ok(1)
        })
    }

    fn stop(&mut self) {
        self.worker.stop();
    }
}
