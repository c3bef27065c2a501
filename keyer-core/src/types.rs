//! Core data types shared by the keyer, synthesizer and decoder

/// Lowest accepted keying speed
pub const MIN_WPM: f32 = 5.0;
/// Highest accepted keying speed
pub const MAX_WPM: f32 = 100.0;
/// Lowest accepted dash/dit ratio
pub const MIN_WEIGHTING: f32 = 2.0;
/// Highest accepted dash/dit ratio
pub const MAX_WEIGHTING: f32 = 6.0;

/// Dit units in the calibration word "PARIS"
pub const PARIS_UNITS: f32 = 50.0;

/// One key-down or key-up interval.
///
/// `duration_ms == 0` means the value continues and its length is not yet
/// known; the consumer has to ask again before it advances.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Segment {
    /// Key asserted (tone on)
    pub asserted: bool,
    /// Length in milliseconds, 0 = open ended
    pub duration_ms: u64,
}

impl Segment {
    /// Timed mark
    pub const fn mark(duration_ms: u64) -> Self {
        Self { asserted: true, duration_ms }
    }

    /// Timed space
    pub const fn space(duration_ms: u64) -> Self {
        Self { asserted: false, duration_ms }
    }

    /// Returns true for the open-ended sentinel
    pub const fn is_open(&self) -> bool {
        self.duration_ms == 0
    }
}

/// Debounced snapshot of the two key contacts
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LogicalKeyState {
    #[default]
    Neither,
    /// Dit contact only
    Left,
    /// Dash contact only
    Right,
    Both,
}

impl LogicalKeyState {
    /// Build from the two contact states
    pub const fn from_contacts(dit: bool, dash: bool) -> Self {
        match (dit, dash) {
            (false, false) => LogicalKeyState::Neither,
            (true, false) => LogicalKeyState::Left,
            (false, true) => LogicalKeyState::Right,
            (true, true) => LogicalKeyState::Both,
        }
    }

    /// Dit paddle pressed
    pub const fn dit(&self) -> bool {
        matches!(self, LogicalKeyState::Left | LogicalKeyState::Both)
    }

    /// Dash paddle pressed
    pub const fn dash(&self) -> bool {
        matches!(self, LogicalKeyState::Right | LogicalKeyState::Both)
    }

    /// Any contact closed
    pub const fn any(&self) -> bool {
        !matches!(self, LogicalKeyState::Neither)
    }

    /// True if the paddle producing `element` is pressed
    pub const fn pressed(&self, element: Element) -> bool {
        match element {
            Element::Dit => self.dit(),
            Element::Dash => self.dash(),
        }
    }
}

/// Paddle side identification
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PaddleSide {
    /// Dit paddle (left)
    Dit,
    /// Dash paddle (right)
    Dash,
}

/// Morse signs
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Element {
    Dit,
    Dash,
}

impl Element {
    /// Returns the opposite sign
    pub const fn opposite(&self) -> Element {
        match self {
            Element::Dit => Element::Dash,
            Element::Dash => Element::Dit,
        }
    }
}

/// Keying modes
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum KeyingMode {
    /// Signs come from the outbound text queue
    Keyboard = 0,
    /// Marks follow the contact directly, untimed
    StraightKey = 1,
    /// Iambic squeeze without memory
    IambicA = 2,
    /// Iambic squeeze, commits to one extra opposite sign
    #[default]
    IambicB = 3,
    /// Both dits and dashes timed, repeats instead of alternating
    FullyAutomaticBug = 4,
    /// Dits timed, dash passed through by hand
    SemiAutomaticBug = 5,
}

impl KeyingMode {
    /// Decode from the atomic representation
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(KeyingMode::Keyboard),
            1 => Some(KeyingMode::StraightKey),
            2 => Some(KeyingMode::IambicA),
            3 => Some(KeyingMode::IambicB),
            4 => Some(KeyingMode::FullyAutomaticBug),
            5 => Some(KeyingMode::SemiAutomaticBug),
            _ => None,
        }
    }

    /// Returns true for the modes read from the paddles
    pub const fn uses_paddles(&self) -> bool {
        !matches!(self, KeyingMode::Keyboard)
    }
}

/// Keyer FSM states
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyerState {
    /// Nothing to send
    #[default]
    Idle,
    /// Straight key mark, held by the dit contact
    UntimedDit,
    /// Mark held by the dash contact (straight key and semi-automatic bug)
    UntimedDash,
    KbDitMark,
    KbDitSpace,
    KbDashMark,
    KbDashSpace,
    KbWordSpace,
    DitMark,
    DitSpace,
    DashMark,
    DashSpace,
    /// Dit mark during which the dash paddle was seen (mode B)
    DitMarkThenDash,
    /// Dash mark during which the dit paddle was seen (mode B)
    DashMarkThenDit,
    InterCharSpace,
}

impl KeyerState {
    /// Returns true if the key is asserted in this state
    pub const fn is_mark(&self) -> bool {
        matches!(
            self,
            KeyerState::UntimedDit
                | KeyerState::UntimedDash
                | KeyerState::KbDitMark
                | KeyerState::KbDashMark
                | KeyerState::DitMark
                | KeyerState::DashMark
                | KeyerState::DitMarkThenDash
                | KeyerState::DashMarkThenDit
        )
    }

    /// Returns true if the state's length is set by the operator
    pub const fn is_untimed(&self) -> bool {
        matches!(
            self,
            KeyerState::Idle | KeyerState::UntimedDit | KeyerState::UntimedDash
        )
    }

    /// Sign sent by a timed paddle mark state
    pub const fn timed_element(&self) -> Option<Element> {
        match self {
            KeyerState::DitMark | KeyerState::DitMarkThenDash | KeyerState::DitSpace => {
                Some(Element::Dit)
            }
            KeyerState::DashMark | KeyerState::DashMarkThenDit | KeyerState::DashSpace => {
                Some(Element::Dash)
            }
            _ => None,
        }
    }
}

/// Speed parameters, PARIS calibrated
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpeedParams {
    /// Words per minute
    pub wpm: f32,
    /// Dash to dit ratio
    pub weighting: f32,
}

impl Default for SpeedParams {
    fn default() -> Self {
        Self {
            wpm: 20.0,
            weighting: 3.0,
        }
    }
}

impl SpeedParams {
    /// Create validated speed parameters
    pub fn new(wpm: f32, weighting: f32) -> Result<Self, KeyerError> {
        if !(MIN_WPM..=MAX_WPM).contains(&wpm) {
            return Err(KeyerError::InvalidSpeed);
        }
        if !(MIN_WEIGHTING..=MAX_WEIGHTING).contains(&weighting) {
            return Err(KeyerError::InvalidWeighting);
        }
        Ok(Self { wpm, weighting })
    }

    /// Dit length: 60000 / (wpm * 50)
    pub fn dit_time_ms(&self) -> f32 {
        60_000.0 / (self.wpm * PARIS_UNITS)
    }

    /// Dash length: dit * weighting
    pub fn dash_time_ms(&self) -> f32 {
        self.dit_time_ms() * self.weighting
    }

    /// Inter-character space added after the element space
    pub fn space_time_ms(&self) -> f32 {
        2.0 * self.dit_time_ms()
    }

    /// Pack both values into one word so a reader never sees a torn pair
    pub fn to_bits(&self) -> u64 {
        ((self.wpm.to_bits() as u64) << 32) | self.weighting.to_bits() as u64
    }

    /// Inverse of [`SpeedParams::to_bits`]
    pub fn from_bits(bits: u64) -> Self {
        Self {
            wpm: f32::from_bits((bits >> 32) as u32),
            weighting: f32::from_bits(bits as u32),
        }
    }
}

/// Round a positive millisecond value to the segment resolution
pub(crate) fn whole_ms(ms: f32) -> u64 {
    if ms <= 0.0 {
        return 0;
    }
    ((ms + 0.5) as u64).max(1)
}

/// Keyer configuration parameters
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyerConfig {
    /// Keying mode
    pub mode: KeyingMode,
    /// Speed in words per minute
    pub wpm: f32,
    /// Dash to dit ratio
    pub weighting: f32,
}

impl Default for KeyerConfig {
    fn default() -> Self {
        Self {
            mode: KeyingMode::IambicB,
            wpm: 20.0,
            weighting: 3.0,
        }
    }
}

impl KeyerConfig {
    /// Create a new configuration with validation
    pub fn new(mode: KeyingMode, wpm: f32, weighting: f32) -> Result<Self, KeyerError> {
        SpeedParams::new(wpm, weighting)?;
        Ok(Self {
            mode,
            wpm,
            weighting,
        })
    }

    /// Speed part of the configuration
    pub fn speed(&self) -> SpeedParams {
        SpeedParams {
            wpm: self.wpm,
            weighting: self.weighting,
        }
    }
}

/// Configuration and lifecycle errors of the pipeline
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyerError {
    /// WPM outside the accepted range
    InvalidSpeed,
    /// Dash/dit ratio outside the accepted range
    InvalidWeighting,
    /// Mode change requested while the keyer is sending
    ModeChangeWhileBusy,
    /// Outbound text queue is full
    QueueFull,
    /// Sample rate is zero or too low
    InvalidSampleRate,
    /// Tone frequency is not positive or above Nyquist
    InvalidFrequency,
    /// Rise or fall time is negative or not finite
    InvalidShapeTime,
    /// Volume outside 0.0..=1.0
    InvalidVolume,
    /// Computed table exceeds its fixed capacity
    TableTooLarge,
    /// Decoder thresholds are not increasing
    InvalidThresholds,
    /// Decoder loop already started
    AlreadyRunning,
}

#[cfg(feature = "std")]
impl core::fmt::Display for KeyerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            KeyerError::InvalidSpeed => write!(f, "WPM must be between 5 and 100"),
            KeyerError::InvalidWeighting => write!(f, "Weighting must be between 2.0 and 6.0"),
            KeyerError::ModeChangeWhileBusy => write!(f, "Keying mode can only change while idle"),
            KeyerError::QueueFull => write!(f, "Outbound text queue is full"),
            KeyerError::InvalidSampleRate => write!(f, "Invalid sample rate"),
            KeyerError::InvalidFrequency => write!(f, "Tone frequency must be positive and below Nyquist"),
            KeyerError::InvalidShapeTime => write!(f, "Rise and fall times must be non-negative"),
            KeyerError::InvalidVolume => write!(f, "Volume must be between 0.0 and 1.0"),
            KeyerError::TableTooLarge => write!(f, "Waveform table exceeds its capacity"),
            KeyerError::InvalidThresholds => write!(f, "Decoder thresholds must be increasing"),
            KeyerError::AlreadyRunning => write!(f, "Decoder already running"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for KeyerError {}
