//! Audio outputs driving the synthesizer
//!
//! Each output owns its synthesizer once started. The UI reaches the render
//! side only through the lock-free [`SynthSettings`] and [`KeyerControl`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use keyer_core::{
    AudioOutput, HalError, Keyer, KeyerControl, PaddleInput, SegmentView, SynthParams,
    SynthSettings, Synthesizer,
};
use log::{debug, error, info, warn};

pub type StationKeyer = Keyer<Arc<PaddleInput>, Arc<KeyerControl>>;
pub type StationSynth = Synthesizer<StationKeyer, Arc<SegmentView>>;

/// Frames converted per pass for integer sample formats
pub const SCRATCH_FRAMES: usize = 1024;

/// Render one buffer, picking up published settings first
pub fn render_buffer(
    synth: &mut StationSynth,
    settings: &SynthSettings,
    out: &mut [f32],
    channels: usize,
) {
    synth.apply_settings(settings);
    synth.render(out, channels);
}

/// Render into an integer buffer through a fixed float scratch buffer.
///
/// `scratch` must hold a whole number of frames; it is never resized.
pub fn render_converted<T>(
    synth: &mut StationSynth,
    settings: &SynthSettings,
    scratch: &mut [f32],
    out: &mut [T],
    channels: usize,
    convert: fn(f32) -> T,
) {
    synth.apply_settings(settings);
    if scratch.is_empty() {
        return;
    }
    for chunk in out.chunks_mut(scratch.len()) {
        let rendered = &mut scratch[..chunk.len()];
        synth.render(rendered, channels);
        for (d, s) in chunk.iter_mut().zip(rendered.iter()) {
            *d = convert(*s);
        }
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn to_u16(sample: f32) -> u16 {
    ((sample.clamp(-1.0, 1.0) * 0.5 + 0.5) * u16::MAX as f32) as u16
}

/// Default output device through cpal.
///
/// The synthesizer moves into the stream callback on `start`; a stopped
/// output cannot be started again.
pub struct CpalOutput {
    synth: Option<StationSynth>,
    settings: Arc<SynthSettings>,
    stream: Option<cpal::Stream>,
    sample_rate: u32,
}

impl CpalOutput {
    pub fn new(synth: StationSynth, settings: Arc<SynthSettings>) -> Self {
        let sample_rate = settings.current().sample_rate;
        Self {
            synth: Some(synth),
            settings,
            stream: None,
            sample_rate,
        }
    }

    fn build_stream(&mut self) -> Result<cpal::Stream, HalError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            error!("no audio output device");
            HalError::NoAudioDevice
        })?;
        let supported = device.default_output_config().map_err(|e| {
            error!("no usable output config: {}", e);
            HalError::StreamConfig
        })?;
        let format = supported.sample_format();
        if !matches!(format, SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16) {
            error!("unsupported sample format {:?}", format);
            return Err(HalError::StreamConfig);
        }
        let config: cpal::StreamConfig = supported.into();
        let channels = (config.channels as usize).max(1);

        // The render clock is the device's, not the configured one
        self.sample_rate = config.sample_rate.0;
        let params = SynthParams {
            sample_rate: self.sample_rate,
            ..self.settings.current()
        };
        self.settings
            .publish(params)
            .map_err(|_| HalError::StreamConfig)?;
        info!(
            "audio device {:?}: {} Hz, {} channels, {:?}",
            device.name().unwrap_or_default(),
            self.sample_rate,
            channels,
            format
        );

        let err_fn = |e: cpal::StreamError| error!("audio stream error: {}", e);
        let mut synth = self.synth.take().ok_or(HalError::NotInitialized)?;
        let settings = Arc::clone(&self.settings);
        // Allocated here, never on the callback thread
        let mut scratch = vec![0.0f32; SCRATCH_FRAMES * channels];

        let stream = match format {
            SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    render_converted(&mut synth, &settings, &mut scratch, data, channels, to_i16);
                },
                err_fn,
                None,
            ),
            SampleFormat::U16 => device.build_output_stream(
                &config,
                move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                    render_converted(&mut synth, &settings, &mut scratch, data, channels, to_u16);
                },
                err_fn,
                None,
            ),
            _ => device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    render_buffer(&mut synth, &settings, data, channels);
                },
                err_fn,
                None,
            ),
        };

        stream.map_err(|e| {
            error!("failed to build output stream: {}", e);
            HalError::StreamBuild
        })
    }
}

impl AudioOutput for CpalOutput {
    fn start(&mut self) -> Result<(), HalError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let stream = self.build_stream()?;
        stream.play().map_err(|e| {
            error!("failed to start output stream: {}", e);
            HalError::StreamStart
        })?;
        self.stream = Some(stream);
        info!("audio output started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), HalError> {
        let stream = self.stream.take().ok_or(HalError::NotInitialized)?;
        if let Err(e) = stream.pause() {
            warn!("failed to pause output stream: {}", e);
        }
        info!("audio output stopped");
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_running(&self) -> bool {
        self.stream.is_some()
    }
}

/// Buffer length rendered by [`NullOutput`] per wakeup
pub const NULL_BUFFER_MS: u64 = 5;

/// Clock thread that keeps rendering into a discarded buffer.
///
/// Used when no device is wanted or the device fails, so the keyer and the
/// decoder still run in real time.
pub struct NullOutput {
    synth: Option<StationSynth>,
    settings: Arc<SynthSettings>,
    close: Arc<AtomicBool>,
    worker: Option<JoinHandle<StationSynth>>,
}

impl NullOutput {
    pub fn new(synth: StationSynth, settings: Arc<SynthSettings>) -> Self {
        Self {
            synth: Some(synth),
            settings,
            close: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl AudioOutput for NullOutput {
    fn start(&mut self) -> Result<(), HalError> {
        if self.worker.is_some() {
            return Ok(());
        }
        let mut synth = self.synth.take().ok_or(HalError::NotInitialized)?;
        self.close.store(false, Ordering::Release);
        let settings = Arc::clone(&self.settings);
        let close = Arc::clone(&self.close);
        let frames = (self.sample_rate() as u64 * NULL_BUFFER_MS / 1000) as usize;

        self.worker = Some(thread::spawn(move || {
            debug!("null output thread started");
            let period = Duration::from_millis(NULL_BUFFER_MS);
            let mut buf = vec![0.0f32; frames.max(1)];
            let mut deadline = Instant::now();
            while !close.load(Ordering::Acquire) {
                render_buffer(&mut synth, &settings, &mut buf, 1);
                deadline += period;
                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                } else {
                    deadline = now;
                }
            }
            debug!("null output thread stopped");
            synth
        }));
        info!("null audio output started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), HalError> {
        let worker = self.worker.take().ok_or(HalError::NotInitialized)?;
        self.close.store(true, Ordering::Release);
        match worker.join() {
            // Kept so the output can be started again
            Ok(synth) => self.synth = Some(synth),
            Err(_) => error!("null output thread panicked"),
        }
        info!("null audio output stopped");
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.settings.current().sample_rate
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for NullOutput {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
