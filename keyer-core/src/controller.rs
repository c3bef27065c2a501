//! Shared paddle input and keyer control
//!
//! Both types are written by one context and read by others through plain
//! atomics: every read returns the latest stored value, with no ordering
//! guarantee relative to other fields.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use heapless::mpmc::MpMcQueue;
use portable_atomic::AtomicU64;

use crate::hal::KeySource;
use crate::morse::{self, MorseCode, PLACEHOLDER_CHAR};
use crate::types::{KeyerConfig, KeyerError, KeyingMode, LogicalKeyState, PaddleSide, SpeedParams};

const NO_EDGE: u32 = u32::MAX;

/// Atomic paddle input state management
/// Safe for use in interrupt contexts and from any thread
pub struct PaddleInput {
    dit_pressed: AtomicBool,
    dash_pressed: AtomicBool,
    dit_last_edge: AtomicU32,
    dash_last_edge: AtomicU32,
    debounce_ms: AtomicU32,
}

impl PaddleInput {
    /// Create new paddle input manager with a 10 ms debounce
    pub const fn new() -> Self {
        Self {
            dit_pressed: AtomicBool::new(false),
            dash_pressed: AtomicBool::new(false),
            dit_last_edge: AtomicU32::new(NO_EDGE),
            dash_last_edge: AtomicU32::new(NO_EDGE),
            debounce_ms: AtomicU32::new(10),
        }
    }

    /// Change the minimum time between accepted edges of one contact
    pub fn set_debounce(&self, debounce_ms: u32) {
        self.debounce_ms.store(debounce_ms, Ordering::Relaxed);
    }

    /// Update one contact from the input sampling context.
    ///
    /// `now_ms` is a free-running millisecond clock. An edge arriving sooner
    /// than the debounce time after the previous accepted edge is dropped.
    /// Returns true if the stored state changed.
    pub fn update(&self, side: PaddleSide, pressed: bool, now_ms: u32) -> bool {
        let (state, last_edge) = self.contact(side);
        if state.load(Ordering::Relaxed) == pressed {
            return false;
        }

        let last = last_edge.load(Ordering::Relaxed);
        let debounce = self.debounce_ms.load(Ordering::Relaxed);
        if last != NO_EDGE && now_ms.wrapping_sub(last) < debounce {
            return false;
        }

        state.store(pressed, Ordering::Relaxed);
        last_edge.store(now_ms, Ordering::Relaxed);
        true
    }

    /// Set one contact without debouncing
    pub fn set(&self, side: PaddleSide, pressed: bool) {
        self.contact(side).0.store(pressed, Ordering::Relaxed);
    }

    /// Set both contacts from a logical state without debouncing
    pub fn set_state(&self, state: LogicalKeyState) {
        self.dit_pressed.store(state.dit(), Ordering::Relaxed);
        self.dash_pressed.store(state.dash(), Ordering::Relaxed);
    }

    /// Check if Dit paddle is pressed
    pub fn dit(&self) -> bool {
        self.dit_pressed.load(Ordering::Relaxed)
    }

    /// Check if Dash paddle is pressed
    pub fn dash(&self) -> bool {
        self.dash_pressed.load(Ordering::Relaxed)
    }

    /// Check if both paddles are pressed (squeeze condition)
    pub fn both_pressed(&self) -> bool {
        self.dit() && self.dash()
    }

    /// Reset all paddle states
    pub fn reset(&self) {
        self.dit_pressed.store(false, Ordering::Relaxed);
        self.dash_pressed.store(false, Ordering::Relaxed);
        self.dit_last_edge.store(NO_EDGE, Ordering::Relaxed);
        self.dash_last_edge.store(NO_EDGE, Ordering::Relaxed);
    }

    fn contact(&self, side: PaddleSide) -> (&AtomicBool, &AtomicU32) {
        match side {
            PaddleSide::Dit => (&self.dit_pressed, &self.dit_last_edge),
            PaddleSide::Dash => (&self.dash_pressed, &self.dash_last_edge),
        }
    }
}

impl Default for PaddleInput {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySource for PaddleInput {
    fn logical_state(&self) -> LogicalKeyState {
        LogicalKeyState::from_contacts(self.dit(), self.dash())
    }
}

/// Outbound text queue capacity
pub const OUTBOUND_CAPACITY: usize = 64;

/// Item in the outbound text queue, already encoded
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outbound {
    /// One character's pattern
    Code(MorseCode),
    /// Space between words
    WordGap,
}

/// How a character was accepted by [`KeyerControl::send`]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Sent {
    /// Queued as given
    Exact,
    /// No Morse mapping, the placeholder was queued instead
    Substituted {
        requested: char,
        placeholder: char,
    },
}

/// Settings and outbound text shared between the UI and the render context.
///
/// The UI side writes mode, speed and text; the keyer (render side) reads
/// them and publishes its idle flag back.
pub struct KeyerControl {
    mode: AtomicU8,
    speed: AtomicU64,
    idle: AtomicBool,
    outbound: MpMcQueue<Outbound, OUTBOUND_CAPACITY>,
    pending: AtomicUsize,
    marks_sent: AtomicU32,
}

impl KeyerControl {
    /// Create control block from an initial configuration
    pub fn new(config: KeyerConfig) -> Self {
        Self {
            mode: AtomicU8::new(config.mode as u8),
            speed: AtomicU64::new(config.speed().to_bits()),
            idle: AtomicBool::new(true),
            outbound: MpMcQueue::new(),
            pending: AtomicUsize::new(0),
            marks_sent: AtomicU32::new(0),
        }
    }

    /// Requested keying mode
    pub fn mode(&self) -> KeyingMode {
        KeyingMode::from_u8(self.mode.load(Ordering::Relaxed)).unwrap_or_default()
    }

    /// Change keying mode; only accepted while the keyer is idle
    pub fn set_mode(&self, mode: KeyingMode) -> Result<(), KeyerError> {
        if !self.idle() {
            warn!("mode change to {:?} rejected: keyer busy", mode);
            return Err(KeyerError::ModeChangeWhileBusy);
        }
        self.mode.store(mode as u8, Ordering::Relaxed);
        info!("keying mode {:?}", mode);
        Ok(())
    }

    /// Current speed parameters
    pub fn speed(&self) -> SpeedParams {
        SpeedParams::from_bits(self.speed.load(Ordering::Relaxed))
    }

    /// Change speed; takes effect at the next segment boundary
    pub fn set_speed(&self, wpm: f32, weighting: f32) -> Result<(), KeyerError> {
        let speed = SpeedParams::new(wpm, weighting).map_err(|e| {
            warn!("speed {} wpm / weighting {} rejected", wpm, weighting);
            e
        })?;
        self.speed.store(speed.to_bits(), Ordering::Relaxed);
        info!("keyer speed {} wpm, weighting {}", wpm, weighting);
        Ok(())
    }

    /// Queue one character for keyboard sending.
    ///
    /// Whitespace queues a word gap. Characters without a Morse mapping are
    /// replaced by the placeholder and reported.
    pub fn send(&self, c: char) -> Result<Sent, KeyerError> {
        let (item, sent) = if c.is_whitespace() {
            (Outbound::WordGap, Sent::Exact)
        } else if let Some(code) = morse::encode(c) {
            (Outbound::Code(code), Sent::Exact)
        } else {
            warn!("no Morse mapping for {:?}, sending {:?}", c, PLACEHOLDER_CHAR);
            let code = morse::encode(PLACEHOLDER_CHAR).unwrap_or_default();
            (
                Outbound::Code(code),
                Sent::Substituted {
                    requested: c,
                    placeholder: PLACEHOLDER_CHAR,
                },
            )
        };

        // Counted before it becomes visible to the render side
        self.pending.fetch_add(1, Ordering::Relaxed);
        if self.outbound.enqueue(item).is_err() {
            self.pending.fetch_sub(1, Ordering::Relaxed);
            warn!("outbound queue full, dropping {:?}", c);
            return Err(KeyerError::QueueFull);
        }
        Ok(sent)
    }

    /// Queue a string; stops at the first character that cannot be queued.
    /// Returns the number of characters queued.
    pub fn send_text(&self, text: &str) -> Result<usize, KeyerError> {
        let mut queued = 0;
        for c in text.chars() {
            self.send(c)?;
            queued += 1;
        }
        Ok(queued)
    }

    /// Drop all pending outbound text, returns the number of items dropped
    pub fn clear_queue(&self) -> usize {
        let mut dropped = 0;
        while self.take_outbound().is_some() {
            dropped += 1;
        }
        dropped
    }

    /// Number of queued items not yet started
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// True while the keyer state machine is in `Idle`
    pub fn idle(&self) -> bool {
        self.idle.load(Ordering::Relaxed)
    }

    /// Marks started since creation
    pub fn marks_sent(&self) -> u32 {
        self.marks_sent.load(Ordering::Relaxed)
    }

    pub(crate) fn take_outbound(&self) -> Option<Outbound> {
        let item = self.outbound.dequeue()?;
        self.pending.fetch_sub(1, Ordering::Relaxed);
        Some(item)
    }

    pub(crate) fn publish_idle(&self, idle: bool) {
        self.idle.store(idle, Ordering::Relaxed);
    }

    pub(crate) fn count_mark(&self) {
        self.marks_sent.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for KeyerControl {
    fn default() -> Self {
        Self::new(KeyerConfig::default())
    }
}
