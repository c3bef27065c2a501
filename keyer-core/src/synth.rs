//! Sidetone synthesizer
//!
//! Renders the keyer's segments into a shaped sine tone. The render path
//! pulls a new segment only when the current one is exhausted, keeps the
//! oscillator phase running across edges and never allocates: all tables are
//! fixed-capacity and rebuilt only by [`Synthesizer::set_params`].

use core::f32::consts::{FRAC_PI_2, PI, TAU};
use core::ops::Deref;
use core::sync::atomic::{fence, AtomicBool, AtomicU32, AtomicU8, Ordering};

use heapless::Vec;
use portable_atomic::AtomicU64;

use crate::types::{KeyerError, Segment};

/// Longest supported tone cycle in samples
pub const CYCLE_CAPACITY: usize = 4096;
/// Longest supported rise or fall in samples
pub const ENVELOPE_CAPACITY: usize = 8192;
/// Lowest accepted output sample rate
pub const MIN_SAMPLE_RATE: u32 = 1000;

/// Producer of key segments, asked whenever the current one is used up
pub trait SegmentSource {
    fn next_segment(&mut self) -> Segment;
}

impl<S: SegmentSource + ?Sized> SegmentSource for &mut S {
    fn next_segment(&mut self) -> Segment {
        (**self).next_segment()
    }
}

/// Envelope applied at mark and space starts
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Shape {
    /// Two point step
    Sharp = 0,
    /// Linear ramp
    Ramp = 1,
    /// Raised cosine
    #[default]
    Cosine = 2,
}

impl Shape {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Shape::Sharp),
            1 => Some(Shape::Ramp),
            2 => Some(Shape::Cosine),
            _ => None,
        }
    }
}

/// Synthesizer parameters
#[derive(Copy, Clone, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SynthParams {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Requested tone frequency in Hz
    pub frequency: f32,
    /// Mark start envelope length in seconds
    pub rise_time_s: f32,
    /// Space start envelope length in seconds
    pub fall_time_s: f32,
    pub shape: Shape,
    /// Output gain, 0.0..=1.0
    pub volume: f32,
}

impl Default for SynthParams {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            frequency: 700.0,
            rise_time_s: 0.005,
            fall_time_s: 0.005,
            shape: Shape::Cosine,
            volume: 0.5,
        }
    }
}

impl SynthParams {
    /// Create validated parameters
    pub fn new(
        sample_rate: u32,
        frequency: f32,
        rise_time_s: f32,
        fall_time_s: f32,
        shape: Shape,
        volume: f32,
    ) -> Result<Self, KeyerError> {
        let params = Self {
            sample_rate,
            frequency,
            rise_time_s,
            fall_time_s,
            shape,
            volume,
        };
        params.validate()?;
        Ok(params)
    }

    /// Check every value and the table sizes they imply
    pub fn validate(&self) -> Result<(), KeyerError> {
        self.table_sizes().map(|_| ())
    }

    /// Samples per tone cycle nearest the requested frequency
    pub fn cycle_samples(&self) -> Result<usize, KeyerError> {
        if self.sample_rate < MIN_SAMPLE_RATE {
            return Err(KeyerError::InvalidSampleRate);
        }
        let nyquist = self.sample_rate as f32 / 2.0;
        if !self.frequency.is_finite() || self.frequency <= 0.0 || self.frequency >= nyquist {
            return Err(KeyerError::InvalidFrequency);
        }
        let samples = (self.sample_rate as f32 / self.frequency + 0.5) as usize;
        if samples > CYCLE_CAPACITY {
            return Err(KeyerError::TableTooLarge);
        }
        Ok(samples)
    }

    fn envelope_samples(&self, time_s: f32) -> Result<usize, KeyerError> {
        if !time_s.is_finite() || time_s < 0.0 {
            return Err(KeyerError::InvalidShapeTime);
        }
        let samples = match self.shape {
            Shape::Sharp => 2,
            Shape::Ramp | Shape::Cosine => (self.sample_rate as f32 * time_s) as usize + 1,
        };
        if samples > ENVELOPE_CAPACITY {
            return Err(KeyerError::TableTooLarge);
        }
        Ok(samples)
    }

    /// (cycle, rise, fall) table lengths
    fn table_sizes(&self) -> Result<(usize, usize, usize), KeyerError> {
        let cycle = self.cycle_samples()?;
        let rise = self.envelope_samples(self.rise_time_s)?;
        let fall = self.envelope_samples(self.fall_time_s)?;
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(KeyerError::InvalidVolume);
        }
        Ok((cycle, rise, fall))
    }
}

/// Sine without libm: range reduction to [-pi/2, pi/2] and a Taylor series
fn sine(x: f32) -> f32 {
    let turns = x / TAU;
    let k = if turns >= 0.0 {
        (turns + 0.5) as i32
    } else {
        (turns - 0.5) as i32
    };
    let mut x = x - k as f32 * TAU;
    if x > FRAC_PI_2 {
        x = PI - x;
    } else if x < -FRAC_PI_2 {
        x = -PI - x;
    }
    let x2 = x * x;
    x * (1.0
        - x2 / 6.0
            * (1.0 - x2 / 20.0 * (1.0 - x2 / 42.0 * (1.0 - x2 / 72.0 * (1.0 - x2 / 110.0)))))
}

fn cosine(x: f32) -> f32 {
    sine(x + FRAC_PI_2)
}

fn fill_envelope<const N: usize>(
    table: &mut Vec<f32, N>,
    shape: Shape,
    samples: usize,
    rising: bool,
) -> Result<(), KeyerError> {
    table.clear();
    for i in 0..samples {
        let progress = if samples > 1 {
            i as f32 / (samples - 1) as f32
        } else {
            1.0
        };
        let rise = match shape {
            Shape::Sharp | Shape::Ramp => progress,
            Shape::Cosine => 0.5 * (1.0 - cosine(PI * progress)),
        };
        let value = if rising { rise } else { 1.0 - rise };
        table.push(value).map_err(|_| KeyerError::TableTooLarge)?;
    }
    Ok(())
}

/// Value and elapsed time of the segment currently playing
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SegmentSnapshot {
    pub asserted: bool,
    /// Time since the last edge
    pub elapsed_ms: u64,
}

const ASSERTED_BIT: u64 = 1 << 63;

/// Latest rendered key value, readable from any context.
///
/// A plain snapshot, not a queue: readers see the most recent value and may
/// miss edges shorter than their polling interval.
pub struct SegmentView {
    word: AtomicU64,
}

impl SegmentView {
    pub const fn new() -> Self {
        Self {
            word: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> SegmentSnapshot {
        let word = self.word.load(Ordering::Relaxed);
        SegmentSnapshot {
            asserted: word & ASSERTED_BIT != 0,
            elapsed_ms: word & !ASSERTED_BIT,
        }
    }

    fn pack(asserted: bool, elapsed_ms: u64) -> u64 {
        let elapsed = elapsed_ms & !ASSERTED_BIT;
        if asserted {
            elapsed | ASSERTED_BIT
        } else {
            elapsed
        }
    }

    fn store(&self, word: u64) {
        self.word.store(word, Ordering::Relaxed);
    }
}

impl Default for SegmentView {
    fn default() -> Self {
        Self::new()
    }
}

/// Parameter cell written by the UI and applied by the render context.
///
/// Single writer. The generation counter is odd while a write is in
/// progress; a reader that sees it change skips the update until the next
/// buffer. The mute flag is a single word and is read on every buffer.
pub struct SynthSettings {
    generation: AtomicU32,
    muted: AtomicBool,
    sample_rate: AtomicU32,
    frequency: AtomicU32,
    rise_time_s: AtomicU32,
    fall_time_s: AtomicU32,
    shape: AtomicU8,
    volume: AtomicU32,
}

impl SynthSettings {
    pub fn new(params: SynthParams) -> Self {
        let settings = Self {
            generation: AtomicU32::new(0),
            muted: AtomicBool::new(false),
            sample_rate: AtomicU32::new(0),
            frequency: AtomicU32::new(0),
            rise_time_s: AtomicU32::new(0),
            fall_time_s: AtomicU32::new(0),
            shape: AtomicU8::new(0),
            volume: AtomicU32::new(0),
        };
        settings.store(&params);
        settings
    }

    /// Validate and publish new parameters
    pub fn publish(&self, params: SynthParams) -> Result<(), KeyerError> {
        params.validate().map_err(|e| {
            warn!("synthesizer parameters rejected: {:?}", e);
            e
        })?;
        self.generation.fetch_add(1, Ordering::Relaxed);
        fence(Ordering::Release);
        self.store(&params);
        self.generation.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Silence the output while the segment clock keeps running
    pub fn set_muted(&self, muted: bool) {
        if self.muted.swap(muted, Ordering::Relaxed) != muted {
            info!("sidetone {}", if muted { "muted" } else { "unmuted" });
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Most recently published parameters
    pub fn current(&self) -> SynthParams {
        self.load()
    }

    /// Number of completed publishes times two
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }

    fn store(&self, params: &SynthParams) {
        self.sample_rate.store(params.sample_rate, Ordering::Relaxed);
        self.frequency.store(params.frequency.to_bits(), Ordering::Relaxed);
        self.rise_time_s.store(params.rise_time_s.to_bits(), Ordering::Relaxed);
        self.fall_time_s.store(params.fall_time_s.to_bits(), Ordering::Relaxed);
        self.shape.store(params.shape as u8, Ordering::Relaxed);
        self.volume.store(params.volume.to_bits(), Ordering::Relaxed);
    }

    fn load(&self) -> SynthParams {
        SynthParams {
            sample_rate: self.sample_rate.load(Ordering::Relaxed),
            frequency: f32::from_bits(self.frequency.load(Ordering::Relaxed)),
            rise_time_s: f32::from_bits(self.rise_time_s.load(Ordering::Relaxed)),
            fall_time_s: f32::from_bits(self.fall_time_s.load(Ordering::Relaxed)),
            shape: Shape::from_u8(self.shape.load(Ordering::Relaxed)).unwrap_or_default(),
            volume: f32::from_bits(self.volume.load(Ordering::Relaxed)),
        }
    }

    /// Parameters newer than `seen`, if a consistent read succeeded
    fn read_newer(&self, seen: u32) -> Option<(u32, SynthParams)> {
        let before = self.generation.load(Ordering::Acquire);
        if before == seen || before & 1 == 1 {
            return None;
        }
        let params = self.load();
        fence(Ordering::Acquire);
        let after = self.generation.load(Ordering::Relaxed);
        (before == after).then_some((after, params))
    }
}

impl Default for SynthSettings {
    fn default() -> Self {
        Self::new(SynthParams::default())
    }
}

/// Waveform synthesizer.
///
/// `S` supplies segments (normally the keyer), `V` is the shared
/// [`SegmentView`] (`&SegmentView` or `Arc<SegmentView>`).
pub struct Synthesizer<S, V>
where
    S: SegmentSource,
    V: Deref<Target = SegmentView>,
{
    source: S,
    view: V,
    params: SynthParams,
    applied_generation: u32,
    sine: Vec<f32, CYCLE_CAPACITY>,
    rise: Vec<f32, ENVELOPE_CAPACITY>,
    fall: Vec<f32, ENVELOPE_CAPACITY>,
    asserted: bool,
    /// End of the current segment in samples since its edge, `None` while open
    segment_end: Option<u64>,
    /// Summed duration of the coalesced segments since the edge
    segment_ms: u64,
    sample_index: u64,
    sine_index: usize,
    level: f32,
    edge_level: f32,
    muted: bool,
    published: u64,
}

impl<S, V> Synthesizer<S, V>
where
    S: SegmentSource,
    V: Deref<Target = SegmentView>,
{
    pub fn new(source: S, view: V, params: SynthParams) -> Result<Self, KeyerError> {
        let mut synth = Self {
            source,
            view,
            params,
            applied_generation: 0,
            sine: Vec::new(),
            rise: Vec::new(),
            fall: Vec::new(),
            asserted: false,
            segment_end: None,
            segment_ms: 0,
            sample_index: 0,
            sine_index: 0,
            level: 0.0,
            edge_level: 0.0,
            muted: false,
            published: 0,
        };
        synth.set_params(params)?;
        synth.view.store(0);
        Ok(synth)
    }

    /// Recompute all tables; on error nothing changes
    pub fn set_params(&mut self, params: SynthParams) -> Result<(), KeyerError> {
        let (cycle, rise_len, fall_len) = params.table_sizes().map_err(|e| {
            warn!("synthesizer parameters rejected: {:?}", e);
            e
        })?;

        let mut sine = Vec::<f32, CYCLE_CAPACITY>::new();
        for i in 0..cycle {
            sine.push(sine_at(i, cycle))
                .map_err(|_| KeyerError::TableTooLarge)?;
        }
        let mut rise = Vec::<f32, ENVELOPE_CAPACITY>::new();
        fill_envelope(&mut rise, params.shape, rise_len, true)?;
        let mut fall = Vec::<f32, ENVELOPE_CAPACITY>::new();
        fill_envelope(&mut fall, params.shape, fall_len, false)?;

        // Keep the position in the current segment when the clock changes
        let old_rate = self.params.sample_rate as u64;
        let new_rate = params.sample_rate as u64;
        if old_rate != new_rate && old_rate != 0 {
            self.sample_index = self.sample_index * new_rate / old_rate;
            self.segment_end = self.segment_end.map(|end| end * new_rate / old_rate);
        }

        self.sine = sine;
        self.rise = rise;
        self.fall = fall;
        self.sine_index %= cycle;
        self.params = params;
        info!(
            "synthesizer: {} Hz tone ({} samples/cycle) at {} Hz, {:?} {}/{} samples",
            self.achieved_frequency(),
            cycle,
            params.sample_rate,
            params.shape,
            rise_len,
            fall_len
        );
        Ok(())
    }

    /// Apply parameters published through `settings` since the last call,
    /// and follow its mute flag. Returns true if new parameters took effect.
    pub fn apply_settings(&mut self, settings: &SynthSettings) -> bool {
        self.muted = settings.is_muted();
        let Some((generation, params)) = settings.read_newer(self.applied_generation) else {
            return false;
        };
        self.applied_generation = generation;
        self.set_params(params).is_ok()
    }

    pub fn params(&self) -> SynthParams {
        self.params
    }

    /// Frequency actually produced by the integer cycle length
    pub fn achieved_frequency(&self) -> f32 {
        self.params.sample_rate as f32 / self.sine.len().max(1) as f32
    }

    pub fn cycle_samples(&self) -> usize {
        self.sine.len()
    }

    pub fn rise_samples(&self) -> usize {
        self.rise.len()
    }

    pub fn fall_samples(&self) -> usize {
        self.fall.len()
    }

    /// Render silence while keeping the segment clock running
    pub fn set_muted(&mut self, muted: bool) {
        if muted != self.muted {
            info!("synthesizer {}", if muted { "muted" } else { "unmuted" });
        }
        self.muted = muted;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Shared segment view
    pub fn view(&self) -> &SegmentView {
        &self.view
    }

    pub fn snapshot(&self) -> SegmentSnapshot {
        self.view.snapshot()
    }

    /// Duration in ms of the segment currently playing, 0 while open
    pub fn segment_duration_ms(&self) -> u64 {
        if self.segment_end.is_some() {
            self.segment_ms
        } else {
            0
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Fill an interleaved buffer; every channel of a frame gets the same value
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        for frame in out.chunks_mut(channels.max(1)) {
            let value = self.next_sample();
            frame.fill(value);
        }
    }

    /// Fill a mono buffer
    pub fn render_mono(&mut self, out: &mut [f32]) {
        self.render(out, 1);
    }

    fn next_sample(&mut self) -> f32 {
        if self.segment_end.map_or(true, |end| self.sample_index >= end) {
            self.pull();
        }

        self.level = self.envelope();
        let tone = self.sine.get(self.sine_index).copied().unwrap_or(0.0);
        self.sine_index += 1;
        if self.sine_index >= self.sine.len() {
            self.sine_index = 0;
        }
        self.sample_index += 1;
        self.publish();

        if self.muted {
            0.0
        } else {
            tone * self.level * self.params.volume
        }
    }

    fn pull(&mut self) {
        let segment = self.source.next_segment();
        let samples = self.samples_for(segment.duration_ms);

        if segment.asserted == self.asserted {
            self.segment_ms += segment.duration_ms;
            self.segment_end = (!segment.is_open()).then_some(self.sample_index + samples);
        } else {
            self.edge_level = self.level;
            self.asserted = segment.asserted;
            self.sample_index = 0;
            self.segment_ms = segment.duration_ms;
            self.segment_end = (!segment.is_open()).then_some(samples);
        }
    }

    fn samples_for(&self, duration_ms: u64) -> u64 {
        if duration_ms == 0 {
            return 0;
        }
        (duration_ms * self.params.sample_rate as u64 / 1000).max(1)
    }

    fn envelope(&self) -> f32 {
        let table = if self.asserted { &self.rise } else { &self.fall };
        let shaped = match usize::try_from(self.sample_index)
            .ok()
            .and_then(|i| table.get(i))
        {
            Some(v) => *v,
            None if self.asserted => 1.0,
            None => 0.0,
        };
        if self.asserted {
            self.edge_level + (1.0 - self.edge_level) * shaped
        } else {
            shaped * self.edge_level
        }
    }

    fn publish(&mut self) {
        let elapsed_ms = self.sample_index * 1000 / self.params.sample_rate as u64;
        let word = SegmentView::pack(self.asserted, elapsed_ms);
        if word != self.published {
            self.published = word;
            self.view.store(word);
        }
    }
}

fn sine_at(index: usize, cycle: usize) -> f32 {
    sine(TAU * index as f32 / cycle as f32)
}
