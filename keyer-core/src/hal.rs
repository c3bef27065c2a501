//! Collaborator interfaces: key input and audio output

use embedded_hal::digital::InputPin;

use crate::controller::PaddleInput;
use crate::types::{LogicalKeyState, PaddleSide};

/// Error types for collaborator operations
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HalError {
    /// GPIO read failed
    GpioError,
    /// No audio output device available
    NoAudioDevice,
    /// Audio device rejected the stream configuration
    StreamConfig,
    /// Audio stream could not be built
    StreamBuild,
    /// Audio stream could not be started
    StreamStart,
    /// Operation on an output that was never started
    NotInitialized,
}

#[cfg(feature = "std")]
impl core::fmt::Display for HalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HalError::GpioError => write!(f, "GPIO operation failed"),
            HalError::NoAudioDevice => write!(f, "No audio output device available"),
            HalError::StreamConfig => write!(f, "Audio stream configuration rejected"),
            HalError::StreamBuild => write!(f, "Audio stream could not be built"),
            HalError::StreamStart => write!(f, "Audio stream could not be started"),
            HalError::NotInitialized => write!(f, "Audio output not initialized"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HalError {}

/// Input collaborator: debounced snapshot of the two key contacts.
///
/// Polled by the keyer at least once per decision, from the render context.
pub trait KeySource {
    fn logical_state(&self) -> LogicalKeyState;
}

impl<T: KeySource + ?Sized> KeySource for &T {
    fn logical_state(&self) -> LogicalKeyState {
        (**self).logical_state()
    }
}

#[cfg(feature = "std")]
impl<T: KeySource + ?Sized> KeySource for std::sync::Arc<T> {
    fn logical_state(&self) -> LogicalKeyState {
        (**self).logical_state()
    }
}

/// Key source for keyboard-only setups
#[derive(Copy, Clone, Debug, Default)]
pub struct NoKeys;

impl KeySource for NoKeys {
    fn logical_state(&self) -> LogicalKeyState {
        LogicalKeyState::Neither
    }
}

/// Audio collaborator: drives the synthesizer's render operation
pub trait AudioOutput {
    /// Open the device and start calling the render operation
    fn start(&mut self) -> Result<(), HalError>;

    /// Stop the stream; the render operation is no longer invoked
    fn stop(&mut self) -> Result<(), HalError>;

    /// Sample rate the render operation is called at
    fn sample_rate(&self) -> u32;

    /// True while the stream is running
    fn is_running(&self) -> bool;
}

/// Polls two embedded-hal contacts into a shared [`PaddleInput`].
///
/// Contacts are active low (pulled up, grounded when pressed).
pub struct PinPaddle<'a, DIT, DASH> {
    dit: DIT,
    dash: DASH,
    input: &'a PaddleInput,
}

impl<'a, DIT, DASH> PinPaddle<'a, DIT, DASH>
where
    DIT: InputPin,
    DASH: InputPin,
{
    pub fn new(dit: DIT, dash: DASH, input: &'a PaddleInput) -> Self {
        Self { dit, dash, input }
    }

    /// Sample both contacts once and forward them with debouncing
    pub fn poll(&mut self, now_ms: u32) -> Result<LogicalKeyState, HalError> {
        let dit = self.dit.is_low().map_err(|_| HalError::GpioError)?;
        let dash = self.dash.is_low().map_err(|_| HalError::GpioError)?;
        self.input.update(PaddleSide::Dit, dit, now_ms);
        self.input.update(PaddleSide::Dash, dash, now_ms);
        Ok(self.input.logical_state())
    }

    /// Release the pins
    pub fn release(self) -> (DIT, DASH) {
        (self.dit, self.dash)
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    //! Mock implementations for testing

    use super::*;
    use core::cell::Cell;

    /// Audio output that records start/stop calls
    pub struct MockAudioOutput {
        sample_rate: u32,
        running: Cell<bool>,
        fail_start: bool,
        starts: Cell<u32>,
    }

    impl MockAudioOutput {
        pub fn new(sample_rate: u32) -> Self {
            Self {
                sample_rate,
                running: Cell::new(false),
                fail_start: false,
                starts: Cell::new(0),
            }
        }

        /// Output whose start always fails
        pub fn failing(sample_rate: u32) -> Self {
            Self {
                fail_start: true,
                ..Self::new(sample_rate)
            }
        }

        /// Number of start attempts
        pub fn start_attempts(&self) -> u32 {
            self.starts.get()
        }
    }

    impl AudioOutput for MockAudioOutput {
        fn start(&mut self) -> Result<(), HalError> {
            self.starts.set(self.starts.get() + 1);
            if self.fail_start {
                return Err(HalError::StreamStart);
            }
            self.running.set(true);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), HalError> {
            if !self.running.get() {
                return Err(HalError::NotInitialized);
            }
            self.running.set(false);
            Ok(())
        }

        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn is_running(&self) -> bool {
            self.running.get()
        }
    }
}
