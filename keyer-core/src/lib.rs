#![cfg_attr(not(feature = "std"), no_std)]

//! # Keyer Core
//!
//! CW keyer state machine, sidetone synthesizer and adaptive decoder.
//! Supports keyboard, straight key, iambic A/B and bug keying; usable
//! `no_std` with the threaded decoder behind the `std` feature.

// This must go first so the macros are visible in the other modules
mod fmt;

pub mod types;
pub mod morse;
pub mod controller;
pub mod hal;
pub mod fsm;
pub mod synth;
pub mod decoder;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;


pub use types::*;
pub use controller::{KeyerControl, Outbound, PaddleInput, Sent, OUTBOUND_CAPACITY};
pub use hal::{AudioOutput, HalError, KeySource, NoKeys, PinPaddle};
pub use fsm::{transition, Input, Keyer, TextCue, Timing, Transition};
pub use synth::{
    SegmentSnapshot, SegmentSource, SegmentView, Shape, SynthParams, SynthSettings, Synthesizer,
};
pub use decoder::{
    Classification, CodeAccumulator, DecoderConfig, DecoderCore, DecoderSpeed, Thresholds,
};
#[cfg(feature = "std")]
pub use decoder::Decoder;

/// Keyer library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration: iambic B at 20 WPM
pub fn default_config() -> KeyerConfig {
    KeyerConfig {
        mode: KeyingMode::IambicB,
        wpm: 20.0,
        weighting: 3.0,
    }
}
