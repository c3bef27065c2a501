//! Adaptive Morse decoder
//!
//! [`DecoderCore`] classifies the intervals seen through a [`SegmentView`]
//! and assembles characters; it is single threaded and allocation free.
//! With `std`, [`Decoder`] runs it on a worker thread that polls the view.

use core::fmt::Write;
use core::time::Duration;

use crate::morse;
use crate::synth::SegmentSnapshot;
#[cfg(feature = "std")]
use crate::synth::SegmentView;
use crate::types::{Element, KeyerError, SpeedParams};

/// Weight of the previous estimate in speed adaptation
pub const BIAS: f32 = 2.0 / 3.0;
/// Lowest dash/dit ratio the adaptation settles on
pub const MIN_ADAPTED_WEIGHTING: f32 = 2.8;
/// Highest dash/dit ratio the adaptation settles on
pub const MAX_ADAPTED_WEIGHTING: f32 = 4.8;

/// What a completed (or timed out) interval was
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Classification {
    Noise,
    Dit,
    Dash,
    SignGap,
    CharGap,
    WordGap,
    StuckHigh,
    StuckLow,
}

/// Classification boundaries in dit units
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Thresholds {
    /// Shorter intervals are noise
    pub noise: f32,
    /// Marks at or above are dashes
    pub dash: f32,
    /// Spaces at or above end the sign
    pub sign_gap: f32,
    /// Spaces at or above end the word
    pub char_gap: f32,
    /// Stuck timeout as a multiple of the word-gap boundary
    pub stuck_factor: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            noise: 0.2,
            dash: 2.0,
            sign_gap: 2.0,
            char_gap: 4.0,
            stuck_factor: 10.0,
        }
    }
}

impl Thresholds {
    pub fn new(
        noise: f32,
        dash: f32,
        sign_gap: f32,
        char_gap: f32,
        stuck_factor: f32,
    ) -> Result<Self, KeyerError> {
        let thresholds = Self {
            noise,
            dash,
            sign_gap,
            char_gap,
            stuck_factor,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<(), KeyerError> {
        let finite = [
            self.noise,
            self.dash,
            self.sign_gap,
            self.char_gap,
            self.stuck_factor,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite
            || self.noise <= 0.0
            || self.noise >= self.dash
            || self.noise >= self.sign_gap
            || self.sign_gap >= self.char_gap
            || self.stuck_factor < 1.0
        {
            return Err(KeyerError::InvalidThresholds);
        }
        Ok(())
    }
}

/// Decoder's own speed estimate
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DecoderSpeed {
    pub wpm: f32,
    pub weighting: f32,
    pub dit_ms: f32,
    pub dash_ms: f32,
}

impl DecoderSpeed {
    pub fn new(speed: SpeedParams) -> Self {
        let dit_ms = speed.dit_time_ms();
        Self {
            wpm: speed.wpm,
            weighting: speed.weighting,
            dit_ms,
            dash_ms: dit_ms * speed.weighting,
        }
    }

    /// Fold in an observed dit or sign gap
    fn observe_dit(&mut self, ms: f32) {
        self.dit_ms = BIAS * self.dit_ms + (1.0 - BIAS) * ms;
        self.wpm = 1200.0 / self.dit_ms;
    }

    /// Fold in an observed dash, keeping the ratio within the adapted range
    fn observe_dash(&mut self, ms: f32) {
        self.dash_ms = BIAS * self.dash_ms + (1.0 - BIAS) * ms;
        self.weighting = self.dash_ms / self.dit_ms;
        if self.weighting < MIN_ADAPTED_WEIGHTING {
            self.weighting = MIN_ADAPTED_WEIGHTING;
            self.dit_ms = self.dash_ms / MIN_ADAPTED_WEIGHTING;
        } else if self.weighting > MAX_ADAPTED_WEIGHTING {
            self.weighting = MAX_ADAPTED_WEIGHTING;
            self.dit_ms = self.dash_ms / MAX_ADAPTED_WEIGHTING;
        }
        self.wpm = 1200.0 / self.dit_ms;
    }
}

impl Default for DecoderSpeed {
    fn default() -> Self {
        Self::new(SpeedParams::default())
    }
}

/// Signs of the character being received
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CodeAccumulator {
    code: u8,
    len: u8,
}

impl CodeAccumulator {
    pub const MAX_LEN: u8 = 8;

    pub const fn new() -> Self {
        Self { code: 0, len: 0 }
    }

    /// Shift in one sign; past eight signs the bit is ORed into the code
    pub fn push(&mut self, element: Element) {
        let bit = matches!(element, Element::Dash) as u8;
        if self.len < Self::MAX_LEN {
            self.code = (self.code << 1) | bit;
            self.len += 1;
        } else {
            self.code |= bit;
        }
    }

    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn len(&self) -> u8 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn symbol(&self) -> morse::Symbol {
        morse::decode(self.len, self.code)
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Decoder configuration
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct DecoderConfig {
    pub wpm: f32,
    pub weighting: f32,
    pub thresholds: Thresholds,
    /// Sleep between polls of the segment view
    pub poll_interval: Duration,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            wpm: 20.0,
            weighting: 3.0,
            thresholds: Thresholds::default(),
            poll_interval: Duration::from_millis(1),
        }
    }
}

impl DecoderConfig {
    pub fn new(
        wpm: f32,
        weighting: f32,
        thresholds: Thresholds,
        poll_interval: Duration,
    ) -> Result<Self, KeyerError> {
        SpeedParams::new(wpm, weighting)?;
        thresholds.validate()?;
        Ok(Self {
            wpm,
            weighting,
            thresholds,
            poll_interval,
        })
    }
}

/// Interval classifier and character assembler
pub struct DecoderCore {
    speed: DecoderSpeed,
    thresholds: Thresholds,
    acc: CodeAccumulator,
    last: Option<SegmentSnapshot>,
    /// Current interval already classified by a timeout
    classified: bool,
    idle: bool,
    last_char: Option<char>,
}

impl DecoderCore {
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            speed: DecoderSpeed::new(SpeedParams {
                wpm: config.wpm,
                weighting: config.weighting,
            }),
            thresholds: config.thresholds,
            acc: CodeAccumulator::new(),
            last: None,
            classified: false,
            idle: false,
            last_char: None,
        }
    }

    /// Classify a completed interval without changing any state
    pub fn classify(&self, asserted: bool, duration_ms: u64) -> Classification {
        let units = duration_ms as f32 / self.speed.dit_ms;
        let t = &self.thresholds;
        if units < t.noise {
            Classification::Noise
        } else if asserted {
            if units < t.dash {
                Classification::Dit
            } else {
                Classification::Dash
            }
        } else if units < t.sign_gap {
            Classification::SignGap
        } else if units < t.char_gap {
            Classification::CharGap
        } else {
            Classification::WordGap
        }
    }

    /// Process one poll of the segment view.
    ///
    /// Decoded characters are written to `text`. Returns the classification
    /// made on this poll, if any.
    pub fn observe<W: Write>(
        &mut self,
        snapshot: SegmentSnapshot,
        text: &mut W,
    ) -> Option<Classification> {
        let prev = self.last.replace(snapshot)?;

        // An edge, or an edge pair that fell between two polls
        let ended = snapshot.asserted != prev.asserted || snapshot.elapsed_ms < prev.elapsed_ms;
        if ended {
            let already = self.classified;
            self.classified = false;
            if already {
                if self.idle {
                    debug!("decoder: signal resumed");
                    self.idle = false;
                }
                return None;
            }
            let class = self.feed(prev.asserted, prev.elapsed_ms, text);
            if class != Classification::Noise {
                self.idle = false;
            }
            return Some(class);
        }

        // At most one timeout classification per interval
        if self.classified {
            return None;
        }
        let units = snapshot.elapsed_ms as f32 / self.speed.dit_ms;
        let word_gap = self.thresholds.char_gap;
        if units >= word_gap * self.thresholds.stuck_factor {
            self.classified = true;
            self.idle = true;
            let class = if snapshot.asserted {
                Classification::StuckHigh
            } else {
                Classification::StuckLow
            };
            warn!("decoder: {:?} after {} ms", class, snapshot.elapsed_ms);
            self.flush(text);
            return Some(class);
        }

        if !snapshot.asserted && units >= word_gap {
            self.classified = true;
            return Some(self.feed(false, snapshot.elapsed_ms, text));
        }

        None
    }

    /// Process one completed interval
    pub fn feed<W: Write>(&mut self, asserted: bool, duration_ms: u64, text: &mut W) -> Classification {
        let class = self.classify(asserted, duration_ms);
        let ms = duration_ms as f32;
        match class {
            Classification::Noise => {}
            Classification::Dit => {
                self.acc.push(Element::Dit);
                self.speed.observe_dit(ms);
            }
            Classification::Dash => {
                self.acc.push(Element::Dash);
                self.speed.observe_dash(ms);
            }
            Classification::SignGap => self.speed.observe_dit(ms),
            Classification::CharGap => self.flush(text),
            Classification::WordGap => {
                self.flush(text);
                self.append(' ', text);
            }
            Classification::StuckHigh | Classification::StuckLow => self.flush(text),
        }
        trace!("decoder: {:?} {} ms", class, duration_ms);
        class
    }

    /// Emit the accumulated character, if any
    pub fn flush<W: Write>(&mut self, text: &mut W) {
        if let Some(c) = self.acc.symbol().as_char() {
            self.append(c, text);
        }
        self.acc.reset();
    }

    fn append<W: Write>(&mut self, c: char, text: &mut W) {
        if c == ' ' && matches!(self.last_char, None | Some(' ')) {
            return;
        }
        if text.write_char(c).is_ok() {
            self.last_char = Some(c);
        }
    }

    pub fn speed(&self) -> DecoderSpeed {
        self.speed
    }

    pub fn set_speed(&mut self, wpm: f32, weighting: f32) -> Result<(), KeyerError> {
        let speed = SpeedParams::new(wpm, weighting).map_err(|e| {
            warn!("decoder speed {} wpm / weighting {} rejected", wpm, weighting);
            e
        })?;
        self.speed = DecoderSpeed::new(speed);
        info!("decoder speed {} wpm, weighting {}", wpm, weighting);
        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn accumulator(&self) -> CodeAccumulator {
        self.acc
    }

    /// True after a stuck signal until the next edge
    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// Drop the character in progress; speed and text are kept
    pub fn reset(&mut self) {
        self.acc.reset();
        self.last = None;
        self.classified = false;
        self.idle = false;
    }
}

#[cfg(feature = "std")]
pub use threaded::Decoder;

#[cfg(feature = "std")]
mod threaded {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard};
    use std::thread::{self, JoinHandle};

    struct State {
        core: DecoderCore,
        text: String,
    }

    struct Shared {
        view: Arc<SegmentView>,
        state: Mutex<State>,
        close: AtomicBool,
        poll_interval: Duration,
    }

    impl Shared {
        fn lock(&self) -> MutexGuard<'_, State> {
            self.state.lock().unwrap_or_else(|e| e.into_inner())
        }

        /// One poll; returns the classification and the new text length if
        /// text was appended
        fn step(&self) -> (Option<Classification>, Option<usize>) {
            let snapshot = self.view.snapshot();
            let mut state = self.lock();
            let State { core: decoder, text } = &mut *state;
            let before = text.len();
            let class = decoder.observe(snapshot, text);
            let after = text.len();
            (class, (after != before).then_some(after))
        }
    }

    /// Decoder polling a [`SegmentView`] on its own thread
    pub struct Decoder {
        shared: Arc<Shared>,
        worker: Option<JoinHandle<()>>,
    }

    impl Decoder {
        pub fn new(view: Arc<SegmentView>, config: DecoderConfig) -> Self {
            Self {
                shared: Arc::new(Shared {
                    view,
                    state: Mutex::new(State {
                        core: DecoderCore::new(&config),
                        text: String::new(),
                    }),
                    close: AtomicBool::new(false),
                    poll_interval: config.poll_interval,
                }),
                worker: None,
            }
        }

        /// Start the polling thread. `listener` is called with the text
        /// length after every append, outside the decoder lock.
        pub fn start<F>(&mut self, listener: F) -> Result<(), KeyerError>
        where
            F: Fn(usize) + Send + 'static,
        {
            if self.worker.is_some() {
                warn!("decoder already running");
                return Err(KeyerError::AlreadyRunning);
            }
            self.shared.close.store(false, Ordering::Release);
            let shared = Arc::clone(&self.shared);
            self.worker = Some(thread::spawn(move || {
                debug!("decoder thread started");
                while !shared.close.load(Ordering::Acquire) {
                    if let (_, Some(len)) = shared.step() {
                        listener(len);
                    }
                    thread::sleep(shared.poll_interval);
                }
                debug!("decoder thread stopped");
            }));
            info!("decoder started");
            Ok(())
        }

        /// Signal the thread to finish and wait for it
        pub fn stop(&mut self) {
            if let Some(worker) = self.worker.take() {
                self.shared.close.store(true, Ordering::Release);
                if worker.join().is_err() {
                    error!("decoder thread panicked");
                }
                info!("decoder stopped");
            }
        }

        pub fn is_running(&self) -> bool {
            self.worker.is_some()
        }

        /// Poll the view once from the calling thread
        pub fn poll_once(&self) -> Option<Classification> {
            self.shared.step().0
        }

        pub fn set_speed(&self, wpm: f32, weighting: f32) -> Result<(), KeyerError> {
            self.shared.lock().core.set_speed(wpm, weighting)
        }

        pub fn get_speed(&self) -> DecoderSpeed {
            self.shared.lock().core.speed()
        }

        /// Decoded text so far; not cleared by reading
        pub fn get_text(&self) -> String {
            self.shared.lock().text.clone()
        }

        /// True after a stuck signal until the next edge
        pub fn is_idle(&self) -> bool {
            self.shared.lock().core.is_idle()
        }

        pub fn reset(&self) {
            self.shared.lock().core.reset();
        }
    }

    impl Drop for Decoder {
        fn drop(&mut self) {
            self.stop();
        }
    }
}
