//! Keyer state machine
//!
//! The keyer is pulled: each call to [`Keyer::next_segment`] makes one
//! decision and returns the interval that follows it. The decision itself is
//! the pure [`transition`] function; [`Keyer`] wraps it with the collaborators
//! (key contacts, outbound text, shared settings).

use core::ops::Deref;

use crate::controller::{KeyerControl, Outbound, Sent};
use crate::hal::KeySource;
use crate::morse::MorseCode;
use crate::synth::SegmentSource;
use crate::types::{
    whole_ms, Element, KeyerError, KeyerState, KeyingMode, LogicalKeyState, Segment, SpeedParams,
};

/// Element lengths in whole milliseconds for one speed setting
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timing {
    pub dit_ms: u64,
    pub dash_ms: u64,
    /// Inter-character space added after the element space
    pub space_ms: u64,
    /// Keyboard word space added after the element space
    pub word_ms: u64,
}

impl Timing {
    pub fn from_speed(speed: &SpeedParams) -> Self {
        Self {
            dit_ms: whole_ms(speed.dit_time_ms()),
            dash_ms: whole_ms(speed.dash_time_ms()),
            space_ms: whole_ms(speed.space_time_ms()),
            word_ms: whole_ms(3.0 * speed.space_time_ms()),
        }
    }
}

/// Next keyboard item as seen by the state machine
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TextCue {
    /// Next sign of the current character
    Sign(Element),
    /// Current character finished, another one follows
    CharGap,
    /// Word boundary, or the text ran out after a character
    WordGap,
    /// Nothing to send
    Empty,
}

/// Inputs sampled for one decision
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Input {
    pub keys: LogicalKeyState,
    pub cue: TextCue,
}

impl Input {
    /// Paddle-only input
    pub const fn keys(keys: LogicalKeyState) -> Self {
        Self {
            keys,
            cue: TextCue::Empty,
        }
    }

    /// Keyboard-only input
    pub const fn cue(cue: TextCue) -> Self {
        Self {
            keys: LogicalKeyState::Neither,
            cue,
        }
    }
}

/// Result of one decision
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transition {
    pub state: KeyerState,
    /// Sign committed for after the next element space (mode B)
    pub memory: Option<Element>,
    pub segment: Segment,
}

impl Transition {
    const fn idle() -> Self {
        Self {
            state: KeyerState::Idle,
            memory: None,
            segment: Segment::space(0),
        }
    }

    const fn to(state: KeyerState, segment: Segment) -> Self {
        Self {
            state,
            memory: None,
            segment,
        }
    }
}

/// Compute the state entered from `state` and the segment it emits
pub fn transition(
    state: KeyerState,
    memory: Option<Element>,
    mode: KeyingMode,
    input: Input,
    speed: &SpeedParams,
) -> Transition {
    let timing = Timing::from_speed(speed);
    match mode {
        KeyingMode::StraightKey => straight_key(state, input.keys),
        KeyingMode::Keyboard => keyboard(state, input.cue, &timing),
        KeyingMode::IambicA
        | KeyingMode::IambicB
        | KeyingMode::FullyAutomaticBug
        | KeyingMode::SemiAutomaticBug => paddle(state, memory, mode, input.keys, &timing),
    }
}

fn straight_key(state: KeyerState, keys: LogicalKeyState) -> Transition {
    if !keys.any() {
        return Transition::idle();
    }
    let next = match state {
        KeyerState::UntimedDit | KeyerState::UntimedDash => state,
        _ if keys.dit() => KeyerState::UntimedDit,
        _ => KeyerState::UntimedDash,
    };
    Transition::to(next, Segment::mark(0))
}

fn keyboard(state: KeyerState, cue: TextCue, timing: &Timing) -> Transition {
    match state {
        KeyerState::KbDitMark => {
            Transition::to(KeyerState::KbDitSpace, Segment::space(timing.dit_ms))
        }
        KeyerState::KbDashMark => {
            Transition::to(KeyerState::KbDashSpace, Segment::space(timing.dit_ms))
        }
        // Paddle marks never survive into keyboard mode
        s if s.is_mark() => Transition::idle(),
        _ => match cue {
            TextCue::Sign(Element::Dit) => {
                Transition::to(KeyerState::KbDitMark, Segment::mark(timing.dit_ms))
            }
            TextCue::Sign(Element::Dash) => {
                Transition::to(KeyerState::KbDashMark, Segment::mark(timing.dash_ms))
            }
            TextCue::CharGap => {
                Transition::to(KeyerState::InterCharSpace, Segment::space(timing.space_ms))
            }
            TextCue::WordGap => {
                Transition::to(KeyerState::KbWordSpace, Segment::space(timing.word_ms))
            }
            TextCue::Empty => Transition::idle(),
        },
    }
}

fn paddle(
    state: KeyerState,
    memory: Option<Element>,
    mode: KeyingMode,
    keys: LogicalKeyState,
    timing: &Timing,
) -> Transition {
    match state {
        KeyerState::DitMark
        | KeyerState::DashMark
        | KeyerState::DitMarkThenDash
        | KeyerState::DashMarkThenDit => {
            let element = state.timed_element().unwrap_or(Element::Dit);
            let memory = match state {
                KeyerState::DitMarkThenDash => Some(Element::Dash),
                KeyerState::DashMarkThenDit => Some(Element::Dit),
                _ if mode == KeyingMode::IambicB => {
                    Some(element.opposite()).filter(|e| keys.pressed(*e))
                }
                _ => None,
            };
            let next = match element {
                Element::Dit => KeyerState::DitSpace,
                Element::Dash => KeyerState::DashSpace,
            };
            Transition {
                state: next,
                memory,
                segment: Segment::space(timing.dit_ms),
            }
        }

        KeyerState::DitSpace | KeyerState::DashSpace => {
            match memory.or_else(|| choose(mode, keys, state.timed_element())) {
                Some(element) => begin_mark(mode, element, keys, timing),
                None => {
                    Transition::to(KeyerState::InterCharSpace, Segment::space(timing.space_ms))
                }
            }
        }

        KeyerState::UntimedDash if keys.dash() => {
            Transition::to(KeyerState::UntimedDash, Segment::mark(0))
        }
        KeyerState::UntimedDash => Transition::idle(),

        // Idle, InterCharSpace, and anything left over from another mode
        _ => match choose(mode, keys, None) {
            Some(element) => begin_mark(mode, element, keys, timing),
            None => Transition::idle(),
        },
    }
}

/// Sign selected by the paddles, given the previous sign of the character
fn choose(mode: KeyingMode, keys: LogicalKeyState, last: Option<Element>) -> Option<Element> {
    match keys {
        LogicalKeyState::Neither => None,
        LogicalKeyState::Left => Some(Element::Dit),
        LogicalKeyState::Right => Some(Element::Dash),
        LogicalKeyState::Both => Some(match mode {
            KeyingMode::FullyAutomaticBug => last.unwrap_or(Element::Dit),
            KeyingMode::IambicA | KeyingMode::IambicB => {
                last.map_or(Element::Dit, |e| e.opposite())
            }
            _ => Element::Dit,
        }),
    }
}

fn begin_mark(
    mode: KeyingMode,
    element: Element,
    keys: LogicalKeyState,
    timing: &Timing,
) -> Transition {
    let (state, segment) = match (mode, element) {
        (KeyingMode::SemiAutomaticBug, Element::Dash) => {
            (KeyerState::UntimedDash, Segment::mark(0))
        }
        (KeyingMode::IambicB, Element::Dit) if keys.dash() => {
            (KeyerState::DitMarkThenDash, Segment::mark(timing.dit_ms))
        }
        (KeyingMode::IambicB, Element::Dash) if keys.dit() => {
            (KeyerState::DashMarkThenDit, Segment::mark(timing.dash_ms))
        }
        (_, Element::Dit) => (KeyerState::DitMark, Segment::mark(timing.dit_ms)),
        (_, Element::Dash) => (KeyerState::DashMark, Segment::mark(timing.dash_ms)),
    };
    Transition::to(state, segment)
}

/// Keyer driven by the render context.
///
/// `K` provides the contacts, `C` the settings and outbound text shared with
/// the UI (`&KeyerControl` or `Arc<KeyerControl>`).
pub struct Keyer<K, C>
where
    K: KeySource,
    C: Deref<Target = KeyerControl>,
{
    keys: K,
    control: C,
    state: KeyerState,
    memory: Option<Element>,
    mode: KeyingMode,
    /// Keyboard character being sent and the index of its next sign
    current: Option<(MorseCode, u8)>,
}

impl<K, C> Keyer<K, C>
where
    K: KeySource,
    C: Deref<Target = KeyerControl>,
{
    pub fn new(keys: K, control: C) -> Self {
        let mode = control.mode();
        control.publish_idle(true);
        Self {
            keys,
            control,
            state: KeyerState::Idle,
            memory: None,
            mode,
            current: None,
        }
    }

    /// Make one decision and return the segment that follows it
    pub fn next_segment(&mut self) -> Segment {
        if self.state == KeyerState::Idle {
            let mode = self.control.mode();
            if mode != self.mode {
                debug!("keyer mode latched: {:?}", mode);
                self.mode = mode;
            }
        }

        let speed = self.control.speed();
        let keys = if self.mode.uses_paddles() {
            self.keys.logical_state()
        } else {
            LogicalKeyState::Neither
        };
        let cue = if self.mode == KeyingMode::Keyboard && !self.state.is_mark() {
            self.take_cue()
        } else {
            TextCue::Empty
        };

        let next = transition(self.state, self.memory, self.mode, Input { keys, cue }, &speed);

        if next.state != self.state {
            trace!("keyer {:?} -> {:?}", self.state, next.state);
        }
        if next.state.is_mark() && !self.state.is_mark() {
            self.control.count_mark();
        }

        self.state = next.state;
        self.memory = next.memory;
        self.control.publish_idle(self.state == KeyerState::Idle);
        next.segment
    }

    fn take_cue(&mut self) -> TextCue {
        if let Some((code, index)) = self.current {
            if let Some(element) = code.element(index) {
                self.current = Some((code, index + 1));
                return TextCue::Sign(element);
            }
            self.current = None;
            return match self.control.take_outbound() {
                Some(Outbound::Code(code)) => {
                    self.current = Some((code, 0));
                    TextCue::CharGap
                }
                Some(Outbound::WordGap) | None => TextCue::WordGap,
            };
        }

        match self.control.take_outbound() {
            Some(Outbound::Code(code)) => {
                self.current = Some((code, 1));
                code.element(0).map_or(TextCue::Empty, TextCue::Sign)
            }
            Some(Outbound::WordGap) => TextCue::WordGap,
            None => TextCue::Empty,
        }
    }

    /// Current state machine state
    pub fn state(&self) -> KeyerState {
        self.state
    }

    /// Mode latched at the last idle decision
    pub fn mode(&self) -> KeyingMode {
        self.mode
    }

    /// Shared control block
    pub fn control(&self) -> &KeyerControl {
        &self.control
    }

    pub fn set_mode(&self, mode: KeyingMode) -> Result<(), KeyerError> {
        self.control.set_mode(mode)
    }

    pub fn set_speed(&self, wpm: f32, weighting: f32) -> Result<(), KeyerError> {
        self.control.set_speed(wpm, weighting)
    }

    pub fn send(&self, c: char) -> Result<Sent, KeyerError> {
        self.control.send(c)
    }

    pub fn idle(&self) -> bool {
        self.state == KeyerState::Idle
    }

    /// Return to idle, dropping any character in progress and mode B memory
    pub fn reset(&mut self) {
        self.state = KeyerState::Idle;
        self.memory = None;
        self.current = None;
        self.control.publish_idle(true);
    }
}

impl<K, C> SegmentSource for Keyer<K, C>
where
    K: KeySource,
    C: Deref<Target = KeyerControl>,
{
    fn next_segment(&mut self) -> Segment {
        Keyer::next_segment(self)
    }
}
