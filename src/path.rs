//! Signal path orchestrator.
//!
//! Owns every stage of the receive chain and is the only initiator of the
//! stop-then-reconfigure-then-start sequence. The graph is fixed:
//!
//! ```text
//! source -> dc removal -> splitter -> spectrum tap
//!                                  -> vfo -> demodulator -> audio resampler
//!                                            -> mono-to-stereo -> audio sink
//! ```
//!
//! All three demodulators exist permanently and hold cloned readers of the
//! channel selector's output; exactly one runs at a time. Mode selection
//! rewires the audio resampler's input to the chosen demodulator and
//! restarts only the channel leg; the wideband leg and the audio terminal
//! stages keep running.
//!
//! Per-mode channel configuration is retained in a [`VariantTable`] and
//! restored whenever a mode is re-selected.

use std::fmt;

use tracing::{debug, info, warn};

use crate::dsp::window::WindowDesign;
use crate::dsp::ComplexSample;
use crate::error::{PathError, PathResult};
use crate::stage::StreamStage;
use crate::stages::{
    AmDetector, AudioHandler, AudioResampler, AudioSink, ChannelSelector, DcRemoval,
    FftHandler, FmDiscriminator, MonoToStereo, Sideband, SpectrumFramer, Splitter,
    SsbDetector,
};
use crate::stream::{Stream, StreamWriter};

/// Wideband input blocks carry 5 ms of samples.
const FRAMES_PER_SEC: u32 = 200;

/// Bandwidth limits for the FM bandwidth control.
const FM_BW_MIN: f32 = 6_000.0;
const FM_BW_MAX: f32 = 15_000.0;

/// The set of selectable demodulators. Unknown identifiers are
/// unrepresentable; UI strings go through [`DemodMode::from_name`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DemodMode {
    FmWide,
    FmNarrow,
    Am,
    Usb,
    Lsb,
}

/// Which demodulator stage a mode runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DemodFamily {
    Fm,
    Am,
    Ssb,
}

impl DemodMode {
    /// Parse a UI mode identifier. `None` means the request is a no-op.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "FM" | "WFM" => Some(Self::FmWide),
            "NFM" => Some(Self::FmNarrow),
            "AM" => Some(Self::Am),
            "USB" => Some(Self::Usb),
            "LSB" => Some(Self::Lsb),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::FmWide => "FM",
            Self::FmNarrow => "NFM",
            Self::Am => "AM",
            Self::Usb => "USB",
            Self::Lsb => "LSB",
        }
    }

    pub fn family(&self) -> DemodFamily {
        match self {
            Self::FmWide | Self::FmNarrow => DemodFamily::Fm,
            Self::Am => DemodFamily::Am,
            Self::Usb | Self::Lsb => DemodFamily::Ssb,
        }
    }

    fn index(&self) -> usize {
        match self {
            Self::FmWide => 0,
            Self::FmNarrow => 1,
            Self::Am => 2,
            Self::Usb => 3,
            Self::Lsb => 4,
        }
    }
}

impl fmt::Display for DemodMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Channel configuration retained per mode. `deviation` is meaningful for
/// the FM family, `sideband` for SSB.
#[derive(Clone, Copy, Debug)]
pub struct VariantConfig {
    pub channel_rate: u32,
    pub bandwidth: f32,
    pub deviation: f32,
    pub sideband: Sideband,
}

/// Per-mode retained configurations, restored on re-selection.
pub struct VariantTable {
    entries: [VariantConfig; 5],
}

impl Default for VariantTable {
    fn default() -> Self {
        let entry = |channel_rate, bandwidth, deviation, sideband| VariantConfig {
            channel_rate,
            bandwidth,
            deviation,
            sideband,
        };
        Self {
            entries: [
                entry(200_000, 200_000.0, 100_000.0, Sideband::Upper),
                entry(12_500, 12_500.0, 6_250.0, Sideband::Upper),
                entry(12_500, 12_500.0, 0.0, Sideband::Upper),
                entry(6_000, 3_000.0, 0.0, Sideband::Upper),
                entry(6_000, 3_000.0, 0.0, Sideband::Lower),
            ],
        }
    }
}

impl VariantTable {
    pub fn get(&self, mode: DemodMode) -> VariantConfig {
        self.entries[mode.index()]
    }

    fn get_mut(&mut self, mode: DemodMode) -> &mut VariantConfig {
        &mut self.entries[mode.index()]
    }
}

/// Orchestrator configuration. The FFT frame parameters are fixed for the
/// lifetime of the path.
#[derive(Clone, Copy, Debug)]
pub struct PathConfig {
    pub sample_rate: u32,
    pub fft_rate: u32,
    pub fft_size: usize,
    pub audio_rate: u32,
    pub dc_correction: bool,
    pub mode: DemodMode,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            sample_rate: 2_000_000,
            fft_rate: 20,
            fft_size: 4096,
            audio_rate: 48_000,
            dc_correction: false,
            mode: DemodMode::FmWide,
        }
    }
}

pub struct SignalPath {
    cfg: PathConfig,
    variants: VariantTable,
    input: Stream<ComplexSample>,
    dc: DcRemoval,
    split: Splitter,
    spectrum: SpectrumFramer,
    vfo: ChannelSelector,
    fm: FmDiscriminator,
    am: AmDetector,
    ssb: SsbDetector,
    audio_resamp: AudioResampler,
    audio_win: WindowDesign,
    m2s: MonoToStereo,
    audio: AudioSink,
    watchdog: Option<crate::watchdog::Watchdog>,
    running: bool,
}

impl SignalPath {
    /// Build and wire the whole graph, stopped.
    pub fn new(
        cfg: PathConfig,
        fft_handler: FftHandler,
        audio_handler: AudioHandler,
    ) -> PathResult<Self> {
        if cfg.sample_rate == 0 || cfg.fft_rate == 0 || cfg.audio_rate == 0 {
            return Err(PathError::InvalidConfig {
                stage: "signal-path",
                reason: "sample, FFT and audio rates must be positive".into(),
            });
        }
        if cfg.fft_size == 0 {
            return Err(PathError::InvalidConfig {
                stage: "signal-path",
                reason: "fft_size must be positive".into(),
            });
        }

        let variants = VariantTable::default();
        let input: Stream<ComplexSample> = Stream::default();
        let block = (cfg.sample_rate / FRAMES_PER_SEC).max(1) as usize;

        let dc = DcRemoval::new(input.reader());
        dc.set_bypass(!cfg.dc_correction);
        let split = Splitter::new(dc.output());
        let skip = (cfg.sample_rate / cfg.fft_rate) as usize;
        let spectrum = SpectrumFramer::new(
            split.output_a(),
            cfg.fft_size,
            skip.saturating_sub(cfg.fft_size),
            fft_handler,
        );

        let active = variants.get(cfg.mode);
        let vfo = ChannelSelector::new(
            split.output_b(),
            cfg.sample_rate,
            active.channel_rate,
            active.bandwidth,
            block,
        );

        // Demodulators are built from nominal values; apply_variant below
        // configures whichever one the initial mode activates.
        let wide = variants.get(DemodMode::FmWide);
        let ssb_cfg = variants.get(DemodMode::Usb);
        let fm = FmDiscriminator::new(vfo.output(), wide.channel_rate, wide.deviation, 1);
        let am = AmDetector::new(vfo.output());
        let ssb = SsbDetector::new(vfo.output(), ssb_cfg.channel_rate, ssb_cfg.bandwidth);

        let audio_resamp = AudioResampler::new(cfg.audio_rate);
        let m2s = MonoToStereo::new(audio_resamp.output());
        let audio = AudioSink::new(m2s.output(), audio_handler);

        let mut path = Self {
            cfg,
            variants,
            input,
            dc,
            split,
            spectrum,
            vfo,
            fm,
            am,
            ssb,
            audio_resamp,
            audio_win: WindowDesign::new(1.0, 1.0, 2.0),
            m2s,
            audio,
            watchdog: None,
            running: false,
        };
        path.apply_variant()?;
        Ok(path)
    }

    /// Producer handle for the wideband source collaborator. Blocks are
    /// expected to be [`SignalPath::input_block_size`] samples.
    pub fn input(&self) -> StreamWriter<ComplexSample> {
        self.input.writer()
    }

    pub fn config(&self) -> &PathConfig {
        &self.cfg
    }

    pub fn variants(&self) -> &VariantTable {
        &self.variants
    }

    pub fn input_block_size(&self) -> usize {
        (self.cfg.sample_rate / FRAMES_PER_SEC).max(1) as usize
    }

    /// Block size of the channel-rate streams under the current mode.
    pub fn channel_block_size(&self) -> usize {
        self.vfo.output_block_size()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start every stage, source to sink.
    pub fn start(&mut self) -> PathResult {
        if self.running {
            warn!("[path] start() while already running");
            return Ok(());
        }
        self.watchdog = Some(crate::watchdog::Watchdog::start());
        if let Err(e) = self.start_stages() {
            self.stop_stages();
            if let Some(mut w) = self.watchdog.take() {
                w.stop();
            }
            return Err(e);
        }
        self.running = true;
        info!(
            "[path] started: {} S/s wideband, {} mode, {} Hz audio",
            self.cfg.sample_rate, self.cfg.mode, self.cfg.audio_rate
        );
        Ok(())
    }

    /// Stop every stage, sink to source. Buffered samples are discarded.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.stop_stages();
        if let Some(mut w) = self.watchdog.take() {
            w.stop();
        }
        self.running = false;
        info!("[path] stopped");
    }

    /// Switch the active demodulator, restoring the new mode's retained
    /// channel configuration. Restarts only the channel leg.
    pub fn select_demodulator(&mut self, mode: DemodMode) -> PathResult {
        // Validate before touching any stage; a rejected request must
        // leave every stage running.
        let channel_rate = self.variants.get(mode).channel_rate;
        if channel_rate > self.cfg.sample_rate {
            return Err(PathError::InvalidConfig {
                stage: "signal-path",
                reason: format!(
                    "{} channel rate {} exceeds the wideband rate {}",
                    mode, channel_rate, self.cfg.sample_rate
                ),
            });
        }
        info!("[path] demodulator {} -> {}", self.cfg.mode, mode);
        let was_running = self.running;
        if was_running {
            self.audio_resamp.stop();
            self.stop_active_demod();
            self.vfo.stop();
        }
        self.cfg.mode = mode;
        self.apply_variant()?;
        if was_running {
            self.vfo.start()?;
            self.start_active_demod()?;
            self.audio_resamp.start()?;
        }
        Ok(())
    }

    /// Change the wideband input rate. Every derived parameter (block
    /// sizes, FFT skip, channel decimation, audio taps) is recomputed.
    pub fn set_wideband_sample_rate(&mut self, rate: u32) -> PathResult {
        if rate == 0 {
            return Err(PathError::InvalidConfig {
                stage: "signal-path",
                reason: "sample rate must be positive".into(),
            });
        }
        // Validate against the active variant before touching any stage;
        // a rejected request must leave every stage running.
        let channel_rate = self.variants.get(self.cfg.mode).channel_rate;
        if rate < channel_rate {
            return Err(PathError::InvalidConfig {
                stage: "signal-path",
                reason: format!(
                    "sample rate {} below the {} channel rate {}",
                    rate, self.cfg.mode, channel_rate
                ),
            });
        }
        info!(
            "[path] wideband rate {} -> {} S/s",
            self.cfg.sample_rate, rate
        );
        let was_running = self.running;
        if was_running {
            self.spectrum.stop();
            self.split.stop();
            self.dc.stop();
            self.vfo.stop();
        }

        self.cfg.sample_rate = rate;
        let block = self.input_block_size();
        let skip = (rate / self.cfg.fft_rate) as usize;
        self.spectrum.set_skip(skip.saturating_sub(self.cfg.fft_size));
        self.vfo.set_input_rate(rate, block)?;

        // Shares all channel-leg derivation with mode selection.
        self.select_demodulator(self.cfg.mode)?;

        if was_running {
            self.spectrum.start()?;
            self.split.start()?;
            self.dc.start()?;
        }
        Ok(())
    }

    /// Change the audio device rate. Stops and re-arms only the audio
    /// resampler; the demodulator keeps running.
    pub fn set_audio_output_rate(&mut self, rate: u32) -> PathResult {
        if rate == 0 {
            return Err(PathError::InvalidConfig {
                stage: "audio-resamp",
                reason: "output rate must be positive".into(),
            });
        }
        info!("[path] audio rate {} -> {} Hz", self.cfg.audio_rate, rate);
        let was_running = self.audio_resamp.is_running();
        if was_running {
            self.audio_resamp.stop();
        }
        self.audio_resamp.set_output_rate(rate)?;
        self.cfg.audio_rate = rate;
        self.rearm_audio_window();
        if was_running {
            self.audio_resamp.start()?;
        }
        Ok(())
    }

    /// Tune the FM channel bandwidth, live. Outside the FM family the
    /// request is ignored. Values are clamped to the supported range and
    /// retained for the current mode; deviation follows at half the
    /// bandwidth.
    pub fn set_demod_bandwidth(&mut self, bandwidth: f32) {
        if self.cfg.mode.family() != DemodFamily::Fm {
            debug!("[path] bandwidth control ignored in {} mode", self.cfg.mode);
            return;
        }
        let clamped = bandwidth.clamp(FM_BW_MIN, FM_BW_MAX);
        if clamped != bandwidth {
            warn!(
                "[path] bandwidth {} Hz clamped to {} Hz",
                bandwidth, clamped
            );
        }
        let v = self.variants.get_mut(self.cfg.mode);
        v.bandwidth = clamped;
        v.deviation = clamped / 2.0;
        self.vfo.set_bandwidth(clamped);
        self.fm.set_deviation(clamped / 2.0);
    }

    /// Live: shift the channel selector's mix frequency.
    pub fn set_offset(&self, offset: f32) {
        self.vfo.set_offset(offset);
    }

    pub fn offset(&self) -> f32 {
        self.vfo.offset()
    }

    /// Live: audio output gain.
    pub fn set_volume(&self, volume: f32) {
        self.audio.set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.audio.volume()
    }

    /// Live: toggle DC bias correction on the wideband stream.
    pub fn set_dc_bias_correction(&mut self, enabled: bool) {
        info!("[path] dc correction {}", if enabled { "on" } else { "off" });
        self.cfg.dc_correction = enabled;
        self.dc.set_bypass(!enabled);
    }

    /// Configure the channel leg and the audio resampler for the current
    /// mode's retained variant. Every stage touched here is stopped.
    fn apply_variant(&mut self) -> PathResult {
        let v = self.variants.get(self.cfg.mode);
        self.vfo.set_output_rate(v.channel_rate, v.bandwidth)?;
        let chan_block = self.vfo.output_block_size();

        match self.cfg.mode.family() {
            DemodFamily::Fm => {
                self.fm.set_sample_rate(v.channel_rate);
                self.fm.set_deviation(v.deviation);
                self.fm.set_block_size(chan_block);
                self.audio_resamp.set_input(self.fm.output());
            }
            DemodFamily::Am => {
                self.audio_resamp.set_input(self.am.output());
            }
            DemodFamily::Ssb => {
                self.ssb.set_sample_rate(v.channel_rate, v.bandwidth);
                self.ssb.set_sideband(v.sideband);
                self.audio_resamp.set_input(self.ssb.output());
            }
        }
        self.audio_resamp.set_input_rate(v.channel_rate, chan_block)?;
        self.rearm_audio_window();
        debug!(
            "[path] variant {}: {} S/s channel, {} Hz bandwidth, block {}",
            self.cfg.mode, v.channel_rate, v.bandwidth, chan_block
        );
        Ok(())
    }

    /// Recompute the audio anti-alias window and install fresh taps. The
    /// cutoff is the narrower of half the audio rate and half the channel
    /// bandwidth. Always runs before the resampler restarts.
    fn rearm_audio_window(&mut self) {
        let bandwidth = self.variants.get(self.cfg.mode).bandwidth;
        let cutoff = (self.cfg.audio_rate as f32 / 2.0).min(bandwidth / 2.0);
        self.audio_win.set_cutoff(cutoff);
        self.audio_win.set_trans_width(cutoff);
        let design_rate =
            self.audio_resamp.input_rate() as f32 * self.audio_resamp.interpolation() as f32;
        self.audio_win.set_sample_rate(design_rate);
        self.audio_resamp.update_window(&self.audio_win);
    }

    fn start_stages(&mut self) -> PathResult {
        self.dc.start()?;
        self.split.start()?;
        self.spectrum.start()?;
        self.vfo.start()?;
        self.start_active_demod()?;
        self.audio_resamp.start()?;
        self.m2s.start()?;
        self.audio.start()?;
        Ok(())
    }

    fn stop_stages(&mut self) {
        self.audio.stop();
        self.m2s.stop();
        self.audio_resamp.stop();
        self.fm.stop();
        self.am.stop();
        self.ssb.stop();
        self.vfo.stop();
        self.spectrum.stop();
        self.split.stop();
        self.dc.stop();
    }

    fn start_active_demod(&mut self) -> PathResult {
        match self.cfg.mode.family() {
            DemodFamily::Fm => self.fm.start(),
            DemodFamily::Am => self.am.start(),
            DemodFamily::Ssb => self.ssb.start(),
        }
    }

    fn stop_active_demod(&mut self) {
        match self.cfg.mode.family() {
            DemodFamily::Fm => self.fm.stop(),
            DemodFamily::Am => self.am.stop(),
            DemodFamily::Ssb => self.ssb.stop(),
        }
    }
}

impl Drop for SignalPath {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::StereoSample;
    use std::f32::consts::PI;
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn null_handlers() -> (FftHandler, AudioHandler) {
        (
            Arc::new(Mutex::new(|_: &[ComplexSample]| {})),
            Arc::new(Mutex::new(|_: &[StereoSample]| {})),
        )
    }

    fn path(cfg: PathConfig) -> SignalPath {
        let (fft, audio) = null_handlers();
        SignalPath::new(cfg, fft, audio).unwrap()
    }

    #[test]
    fn mode_names_round_trip() {
        for mode in [
            DemodMode::FmWide,
            DemodMode::FmNarrow,
            DemodMode::Am,
            DemodMode::Usb,
            DemodMode::Lsb,
        ] {
            assert_eq!(DemodMode::from_name(mode.name()), Some(mode));
        }
        assert_eq!(DemodMode::from_name("wfm"), Some(DemodMode::FmWide));
        assert_eq!(DemodMode::from_name("CW"), None);
    }

    #[test]
    fn block_sizes_are_consistent_per_mode() {
        let mut p = path(PathConfig::default());
        // 2 MHz wideband, 5 ms frames.
        assert_eq!(p.input_block_size(), 10_000);
        assert_eq!(p.channel_block_size(), 1_000);

        p.select_demodulator(DemodMode::FmNarrow).unwrap();
        assert_eq!(p.channel_block_size(), 62);

        p.select_demodulator(DemodMode::Usb).unwrap();
        assert_eq!(p.channel_block_size(), 30);
    }

    #[test]
    fn reselection_restores_retained_variant() {
        let mut p = path(PathConfig::default());
        assert_eq!(p.vfo.output_rate(), 200_000);

        p.select_demodulator(DemodMode::Am).unwrap();
        assert_eq!(p.vfo.output_rate(), 12_500);
        assert_eq!(p.vfo.bandwidth(), 12_500.0);

        p.select_demodulator(DemodMode::FmWide).unwrap();
        assert_eq!(p.vfo.output_rate(), 200_000);
        assert_eq!(p.vfo.bandwidth(), 200_000.0);
        assert_eq!(p.channel_block_size(), 1_000);
    }

    #[test]
    fn fm_bandwidth_is_clamped_and_retained() {
        let mut p = path(PathConfig {
            mode: DemodMode::FmNarrow,
            ..PathConfig::default()
        });

        p.set_demod_bandwidth(20_000.0);
        assert_eq!(p.variants.get(DemodMode::FmNarrow).bandwidth, 15_000.0);
        assert_eq!(p.fm.deviation(), 7_500.0);

        p.set_demod_bandwidth(1_000.0);
        assert_eq!(p.variants.get(DemodMode::FmNarrow).bandwidth, 6_000.0);
        assert_eq!(p.fm.deviation(), 3_000.0);
        assert_eq!(p.vfo.bandwidth(), 6_000.0);
    }

    #[test]
    fn bandwidth_control_is_ignored_outside_fm() {
        let mut p = path(PathConfig {
            mode: DemodMode::Usb,
            ..PathConfig::default()
        });
        p.set_demod_bandwidth(10_000.0);
        assert_eq!(p.variants.get(DemodMode::Usb).bandwidth, 3_000.0);
    }

    #[test]
    fn audio_rate_change_cycles_only_the_resampler() {
        let mut p = path(PathConfig::default());
        p.start().unwrap();
        assert_eq!(p.fm.start_count(), 1);
        assert_eq!(p.audio_resamp.start_count(), 1);

        p.set_audio_output_rate(44_100).unwrap();
        assert_eq!(p.fm.start_count(), 1);
        assert_eq!(p.fm.stop_count(), 0);
        assert_eq!(p.audio_resamp.start_count(), 2);
        assert_eq!(p.audio_resamp.stop_count(), 1);
        assert_eq!(p.config().audio_rate, 44_100);
        p.stop();
    }

    #[test]
    fn dc_toggle_disturbs_nothing_else() {
        let mut p = path(PathConfig::default());
        p.start().unwrap();
        let vfo_starts = p.vfo.start_count();

        p.set_dc_bias_correction(true);
        p.set_dc_bias_correction(false);

        assert!(p.dc.bypassed());
        assert_eq!(p.vfo.start_count(), vfo_starts);
        assert_eq!(p.fm.start_count(), 1);
        assert_eq!(p.audio_resamp.start_count(), 1);
        assert_eq!(p.vfo.output_rate(), 200_000);
        p.stop();
    }

    #[test]
    fn rate_change_then_mode_change_uses_new_rate() {
        let mut p = path(PathConfig::default());
        p.set_wideband_sample_rate(1_000_000).unwrap();
        assert_eq!(p.input_block_size(), 5_000);

        p.select_demodulator(DemodMode::Am).unwrap();
        // 5_000 * 12_500 / 1_000_000, not the 2 MHz-derived 125.
        assert_eq!(p.channel_block_size(), 62);
    }

    #[test]
    fn fm_tone_reaches_the_audio_sink() {
        let played: Arc<Mutex<Vec<StereoSample>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_buf = Arc::clone(&played);
        let audio_handler: AudioHandler = Arc::new(Mutex::new(move |b: &[StereoSample]| {
            sink_buf.lock().unwrap().extend_from_slice(b);
        }));
        let fft_handler: FftHandler = Arc::new(Mutex::new(|_: &[ComplexSample]| {}));

        let mut p = SignalPath::new(PathConfig::default(), fft_handler, audio_handler).unwrap();
        let writer = p.input();
        p.set_offset(50_000.0);
        p.start().unwrap();

        // Carrier at +50 kHz, FM-modulated by a 1 kHz tone at 50 kHz
        // deviation. With 100 kHz nominal deviation the recovered tone
        // has amplitude 0.5.
        let fs = 2_000_000.0f32;
        let cancel = AtomicBool::new(false);
        let mut phase = 0.0f32;
        let mut t = 0u64;
        for _ in 0..40 {
            let block: Vec<ComplexSample> = (0..10_000)
                .map(|_| {
                    let inst = 50_000.0 + 50_000.0 * (2.0 * PI * 1_000.0 * t as f32 / fs).sin();
                    t += 1;
                    phase = (phase + 2.0 * PI * inst / fs) % (2.0 * PI);
                    ComplexSample::new(phase.cos(), phase.sin())
                })
                .collect();
            writer.send(block, &cancel).unwrap();
        }

        for _ in 0..1_000 {
            if played.lock().unwrap().len() >= 8_000 {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        p.stop();

        let played = played.lock().unwrap();
        assert!(played.len() >= 8_000, "only {} frames played", played.len());
        let tail = &played[played.len() / 2..];
        let rms = (tail.iter().map(|s| s.l * s.l).sum::<f32>() / tail.len() as f32).sqrt();
        assert!(rms > 0.1, "audio rms {} too low", rms);
        for s in tail {
            assert_eq!(s.l, s.r);
        }
        assert_eq!(p.fm.mismatch_count(), 0);
        assert_eq!(p.audio_resamp.mismatch_count(), 0);
    }

    #[test]
    fn rejected_rates_leave_the_path_running() {
        let mut p = path(PathConfig::default());
        p.start().unwrap();

        assert!(p.set_audio_output_rate(0).is_err());
        assert!(p.audio_resamp.is_running());
        assert_eq!(p.audio_resamp.stop_count(), 0);
        assert_eq!(p.config().audio_rate, 48_000);

        // Wide FM needs a 200 kHz channel; a narrower wideband rate is
        // rejected before any stage is stopped.
        assert!(p.set_wideband_sample_rate(100_000).is_err());
        assert!(p.vfo.is_running());
        assert!(p.fm.is_running());
        assert_eq!(p.vfo.stop_count(), 0);
        assert_eq!(p.config().sample_rate, 2_000_000);
        p.stop();
    }

    #[test]
    fn invalid_rates_are_rejected() {
        let mut p = path(PathConfig::default());
        assert!(p.set_wideband_sample_rate(0).is_err());
        assert!(p.set_audio_output_rate(0).is_err());
        // The path remains usable after a rejected request.
        assert_eq!(p.config().sample_rate, 2_000_000);
        p.start().unwrap();
        p.stop();
    }
}
