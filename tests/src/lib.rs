//! Host integration tests for the keyer, synthesizer and decoder
//!
//! [`Rig`] wires the three together the way the station does, but clocked
//! by the test instead of an audio device.

use std::sync::Arc;

use keyer_core::test_utils::{render_pattern, render_traced, PaddlePattern, ScriptedKeys, SegmentTrace};
use keyer_core::{
    DecoderConfig, DecoderCore, Keyer, KeyerConfig, KeyerControl, KeyingMode, SegmentView,
    SynthParams, Synthesizer,
};

mod decoder_thread_tests;
mod mode_behavior_tests;
mod pin_paddle_tests;
mod pipeline_tests;
mod property_tests;

/// Sample rate used by the rig, 8 samples per millisecond
pub const RIG_SAMPLE_RATE: u32 = 8_000;

pub type RigSynth = Synthesizer<Keyer<ScriptedKeys, Arc<KeyerControl>>, Arc<SegmentView>>;

/// Keyer, synthesizer and shared view clocked in 1 ms steps
pub struct Rig {
    pub control: Arc<KeyerControl>,
    pub keys: ScriptedKeys,
    pub view: Arc<SegmentView>,
    pub synth: RigSynth,
}

impl Rig {
    pub fn new(mode: KeyingMode, wpm: f32) -> Self {
        let config = KeyerConfig {
            mode,
            wpm,
            weighting: 3.0,
        };
        let control = Arc::new(KeyerControl::new(config));
        let keys = ScriptedKeys::new();
        let view = Arc::new(SegmentView::new());
        let params = SynthParams {
            sample_rate: RIG_SAMPLE_RATE,
            frequency: 600.0,
            ..SynthParams::default()
        };
        let keyer = Keyer::new(keys.clone(), Arc::clone(&control));
        let synth = Synthesizer::new(keyer, Arc::clone(&view), params)
            .expect("rig parameters are valid");
        Self {
            control,
            keys,
            view,
            synth,
        }
    }

    /// Play a paddle pattern for `ms` milliseconds and return the edge log
    pub fn play(&mut self, pattern: &PaddlePattern, ms: u64) -> SegmentTrace {
        let mut trace = SegmentTrace::new();
        render_pattern(&mut self.synth, &self.keys, pattern, ms, &mut trace);
        trace.finish();
        trace
    }

    /// Render `ms` milliseconds with the keys untouched
    pub fn run(&mut self, ms: u64) -> SegmentTrace {
        let mut trace = SegmentTrace::new();
        render_traced(&mut self.synth, ms, &mut trace);
        trace.finish();
        trace
    }

    /// Render until the keyer has sent everything and `tail_ms` more,
    /// feeding every millisecond's view into `decoder`
    pub fn decode_into<W: core::fmt::Write>(
        &mut self,
        decoder: &mut DecoderCore,
        text: &mut W,
        tail_ms: u64,
        limit_ms: u64,
    ) {
        let mut chunk = vec![0.0f32; (RIG_SAMPLE_RATE / 1000) as usize];
        let mut quiet = 0;
        for _ in 0..limit_ms {
            self.synth.render_mono(&mut chunk);
            decoder.observe(self.view.snapshot(), text);
            if self.control.idle() && self.control.pending() == 0 {
                quiet += 1;
                if quiet >= tail_ms {
                    break;
                }
            } else {
                quiet = 0;
            }
        }
    }
}

/// Decoder matched to the rig's speed
pub fn matched_decoder(wpm: f32) -> DecoderCore {
    DecoderCore::new(&DecoderConfig {
        wpm,
        ..DecoderConfig::default()
    })
}
