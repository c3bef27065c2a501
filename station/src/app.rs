//! Station wiring: keyer, synthesizer, audio output and decoder

use std::sync::Arc;

use keyer_core::{
    AudioOutput, Decoder, DecoderConfig, HalError, Keyer, KeyerConfig, KeyerControl, KeyerError,
    PaddleInput, SegmentView, SynthParams, SynthSettings, Synthesizer,
};
use log::{error, info, warn};
use tokio::sync::watch;

use crate::audio::{CpalOutput, NullOutput, StationSynth};

/// A running station
pub struct Station {
    control: Arc<KeyerControl>,
    paddle: Arc<PaddleInput>,
    view: Arc<SegmentView>,
    settings: Arc<SynthSettings>,
    decoder: Decoder,
    output: Option<Box<dyn AudioOutput>>,
}

impl Station {
    pub fn new(
        keyer: KeyerConfig,
        params: SynthParams,
        decoder: DecoderConfig,
    ) -> Result<Self, KeyerError> {
        let control = Arc::new(KeyerControl::new(keyer));
        let paddle = Arc::new(PaddleInput::new());
        let view = Arc::new(SegmentView::new());
        params.validate()?;
        let settings = Arc::new(SynthSettings::new(params));
        let decoder = Decoder::new(Arc::clone(&view), decoder);
        Ok(Self {
            control,
            paddle,
            view,
            settings,
            decoder,
            output: None,
        })
    }

    /// A synthesizer clocking this station's keyer, for an output to own
    fn synthesizer(&self) -> Result<StationSynth, HalError> {
        Synthesizer::new(
            Keyer::new(Arc::clone(&self.paddle), Arc::clone(&self.control)),
            Arc::clone(&self.view),
            self.settings.current(),
        )
        .map_err(|e| {
            error!("synthesizer setup failed: {}", e);
            HalError::StreamConfig
        })
    }

    /// Start audio on the default device, or the silent clock when
    /// `use_device` is false. A device failure is reported and the station
    /// continues muted on the silent clock.
    pub fn start_audio(&mut self, use_device: bool) -> Result<(), HalError> {
        if self.output.is_some() {
            return Ok(());
        }
        if use_device {
            let mut device = CpalOutput::new(self.synthesizer()?, Arc::clone(&self.settings));
            match device.start() {
                Ok(()) => {
                    self.output = Some(Box::new(device));
                    return Ok(());
                }
                Err(e) => {
                    error!("audio output failed ({}), continuing without sound", e);
                    self.set_muted(true);
                }
            }
        }
        let mut clock = NullOutput::new(self.synthesizer()?, Arc::clone(&self.settings));
        clock.start()?;
        self.output = Some(Box::new(clock));
        Ok(())
    }

    /// Start the decoder thread; every text append is published as the new
    /// text length on `notify`
    pub fn start_decoder(&mut self, notify: watch::Sender<usize>) -> Result<(), KeyerError> {
        self.decoder.start(move |len| {
            notify.send_replace(len);
        })
    }

    pub fn control(&self) -> &KeyerControl {
        &self.control
    }

    /// Contact state the keyer reads in paddle and straight key modes
    pub fn paddle(&self) -> &PaddleInput {
        &self.paddle
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// Change keyer speed; the decoder starts from the same speed
    pub fn set_speed(&self, wpm: f32) -> Result<(), KeyerError> {
        let weighting = self.control.speed().weighting;
        self.control.set_speed(wpm, weighting)?;
        self.decoder.set_speed(wpm, weighting)
    }

    pub fn set_frequency(&self, frequency: f32) -> Result<(), KeyerError> {
        self.settings.publish(SynthParams {
            frequency,
            ..self.settings.current()
        })
    }

    pub fn set_muted(&self, muted: bool) {
        self.settings.set_muted(muted);
    }

    pub fn is_muted(&self) -> bool {
        self.settings.is_muted()
    }

    /// Drop queued text the keyer has not started; returns the number of
    /// characters dropped
    pub fn clear_text(&self) -> usize {
        let dropped = self.control.clear_queue();
        info!("cleared {} queued characters", dropped);
        dropped
    }

    /// Stop the decoder and the audio output
    pub fn stop(&mut self) {
        self.decoder.stop();
        self.paddle.reset();
        if let Some(mut output) = self.output.take() {
            if let Err(e) = output.stop() {
                warn!("audio output stop: {}", e);
            }
        }
    }
}

impl Drop for Station {
    fn drop(&mut self) {
        self.stop();
    }
}
