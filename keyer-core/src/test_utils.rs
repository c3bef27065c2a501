//! Test utilities for keyer core functionality

pub use output_capture::{SegmentTrace, TimingAnalysis, TracedInterval};
pub use paddle_simulator::{PaddleEvent, PaddlePattern, ScriptedKeys};
pub use render::{render_pattern, render_traced};
pub use segment_script::SegmentScript;

pub mod paddle_simulator {
    //! Paddle input simulation for testing

    use std::sync::atomic::{AtomicU8, Ordering};
    use std::sync::Arc;

    use crate::hal::KeySource;
    use crate::types::LogicalKeyState;

    /// Key state change at a point in time
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct PaddleEvent {
        pub at_ms: u64,
        pub state: LogicalKeyState,
    }

    /// Timed sequence of key states
    #[derive(Debug, Clone)]
    pub struct PaddlePattern {
        pub events: Vec<PaddleEvent>,
        pub description: &'static str,
    }

    impl PaddlePattern {
        pub fn new(description: &'static str) -> Self {
            Self {
                events: Vec::new(),
                description,
            }
        }

        /// Add a state change; events must be added in time order
        pub fn at(mut self, at_ms: u64, state: LogicalKeyState) -> Self {
            self.events.push(PaddleEvent { at_ms, state });
            self
        }

        /// Hold one paddle for `hold_ms` from time 0
        pub fn hold(state: LogicalKeyState, hold_ms: u64) -> Self {
            Self::new("Hold")
                .at(0, state)
                .at(hold_ms, LogicalKeyState::Neither)
        }

        /// Squeeze both paddles, release dit at `dit_release_ms` and dash
        /// at `dash_release_ms`
        pub fn squeeze(dit_release_ms: u64, dash_release_ms: u64) -> Self {
            Self::new("Squeeze")
                .at(0, LogicalKeyState::Both)
                .at(dit_release_ms, LogicalKeyState::Right)
                .at(dash_release_ms, LogicalKeyState::Neither)
        }

        /// State in effect at `ms`
        pub fn state_at(&self, ms: u64) -> LogicalKeyState {
            self.events
                .iter()
                .take_while(|e| e.at_ms <= ms)
                .last()
                .map_or(LogicalKeyState::Neither, |e| e.state)
        }

        /// Time of the last event
        pub fn end_ms(&self) -> u64 {
            self.events.last().map_or(0, |e| e.at_ms)
        }
    }

    /// Key source the test sets directly, shareable with a keyer
    #[derive(Debug, Clone, Default)]
    pub struct ScriptedKeys {
        state: Arc<AtomicU8>,
    }

    impl ScriptedKeys {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set(&self, state: LogicalKeyState) {
            let bits = state.dit() as u8 | (state.dash() as u8) << 1;
            self.state.store(bits, Ordering::Relaxed);
        }

        pub fn release(&self) {
            self.set(LogicalKeyState::Neither);
        }
    }

    impl KeySource for ScriptedKeys {
        fn logical_state(&self) -> LogicalKeyState {
            let bits = self.state.load(Ordering::Relaxed);
            LogicalKeyState::from_contacts(bits & 1 != 0, bits & 2 != 0)
        }
    }
}

pub mod segment_script {
    //! Fixed segment sequences for driving the synthesizer

    use std::collections::VecDeque;

    use crate::synth::SegmentSource;
    use crate::types::Segment;

    /// Plays back a list of segments, then idles with open spaces
    #[derive(Debug, Clone, Default)]
    pub struct SegmentScript {
        segments: VecDeque<Segment>,
        pulls: usize,
    }

    impl SegmentScript {
        pub fn new(segments: impl IntoIterator<Item = Segment>) -> Self {
            Self {
                segments: segments.into_iter().collect(),
                pulls: 0,
            }
        }

        /// Script that is idle from the start
        pub fn idle() -> Self {
            Self::default()
        }

        /// Number of segments requested so far
        pub fn pulls(&self) -> usize {
            self.pulls
        }
    }

    impl SegmentSource for SegmentScript {
        fn next_segment(&mut self) -> Segment {
            self.pulls += 1;
            self.segments.pop_front().unwrap_or(Segment::space(0))
        }
    }
}

pub mod output_capture {
    //! Output capture and analysis for testing

    use crate::synth::SegmentSnapshot;

    /// One completed key-down or key-up interval
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TracedInterval {
        pub asserted: bool,
        pub duration_ms: u64,
    }

    /// Edge log built by polling the segment view
    #[derive(Debug, Default)]
    pub struct SegmentTrace {
        intervals: Vec<TracedInterval>,
        last: Option<SegmentSnapshot>,
    }

    impl SegmentTrace {
        pub fn new() -> Self {
            Self::default()
        }

        /// Record one poll
        pub fn observe(&mut self, snapshot: SegmentSnapshot) {
            if let Some(prev) = self.last {
                if prev.asserted != snapshot.asserted {
                    self.intervals.push(TracedInterval {
                        asserted: prev.asserted,
                        duration_ms: prev.elapsed_ms,
                    });
                }
            }
            self.last = Some(snapshot);
        }

        /// Close the interval still in progress
        pub fn finish(&mut self) {
            if let Some(prev) = self.last.take() {
                self.intervals.push(TracedInterval {
                    asserted: prev.asserted,
                    duration_ms: prev.elapsed_ms,
                });
            }
        }

        pub fn intervals(&self) -> &[TracedInterval] {
            &self.intervals
        }

        /// Key-down durations in order
        pub fn marks(&self) -> Vec<u64> {
            self.intervals
                .iter()
                .filter(|i| i.asserted)
                .map(|i| i.duration_ms)
                .collect()
        }

        /// Key-up durations between marks (leading and trailing spaces dropped)
        pub fn gaps(&self) -> Vec<u64> {
            let first = self.intervals.iter().position(|i| i.asserted);
            let last = self.intervals.iter().rposition(|i| i.asserted);
            match (first, last) {
                (Some(first), Some(last)) => self.intervals[first..=last]
                    .iter()
                    .filter(|i| !i.asserted)
                    .map(|i| i.duration_ms)
                    .collect(),
                _ => Vec::new(),
            }
        }

        /// Marks as `.`/`-`, split at twice the dit length
        pub fn to_morse_string(&self, dit_ms: u64) -> String {
            self.marks()
                .iter()
                .map(|ms| if *ms < 2 * dit_ms { '.' } else { '-' })
                .collect()
        }

        pub fn analyze_timing(&self, dit_ms: u64) -> TimingAnalysis {
            let (dits, dashes): (Vec<u64>, Vec<u64>) = self
                .marks()
                .into_iter()
                .partition(|ms| *ms < 2 * dit_ms);
            TimingAnalysis {
                expected_dit_ms: dit_ms,
                dit_durations: dits,
                dash_durations: dashes,
                gaps: self.gaps(),
            }
        }
    }

    /// Timing analysis results
    #[derive(Debug)]
    pub struct TimingAnalysis {
        pub expected_dit_ms: u64,
        pub dit_durations: Vec<u64>,
        pub dash_durations: Vec<u64>,
        pub gaps: Vec<u64>,
    }

    fn error_pct(values: &[u64], expected: f64) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let average = values.iter().map(|v| *v as f64).sum::<f64>() / values.len() as f64;
        ((average - expected).abs() / expected) * 100.0
    }

    impl TimingAnalysis {
        /// Dit timing error in percent
        pub fn dit_accuracy(&self) -> f64 {
            error_pct(&self.dit_durations, self.expected_dit_ms as f64)
        }

        /// Dash timing error in percent for the given weighting
        pub fn dash_accuracy(&self, weighting: f64) -> f64 {
            error_pct(&self.dash_durations, self.expected_dit_ms as f64 * weighting)
        }

        /// Element spacing error in percent, counting only gaps inside characters
        pub fn spacing_accuracy(&self) -> f64 {
            let inside: Vec<u64> = self
                .gaps
                .iter()
                .copied()
                .filter(|g| *g < 2 * self.expected_dit_ms)
                .collect();
            error_pct(&inside, self.expected_dit_ms as f64)
        }
    }
}

pub mod render {
    //! Rendering helpers that advance the synthesizer in 1 ms steps

    use core::ops::Deref;

    use super::output_capture::SegmentTrace;
    use super::paddle_simulator::{PaddlePattern, ScriptedKeys};
    use crate::synth::{SegmentSource, SegmentView, Synthesizer};

    fn samples_per_ms<S, V>(synth: &Synthesizer<S, V>) -> usize
    where
        S: SegmentSource,
        V: Deref<Target = SegmentView>,
    {
        (synth.params().sample_rate as usize / 1000).max(1)
    }

    /// Render `ms` milliseconds, polling the view into `trace` after each one
    pub fn render_traced<S, V>(synth: &mut Synthesizer<S, V>, ms: u64, trace: &mut SegmentTrace)
    where
        S: SegmentSource,
        V: Deref<Target = SegmentView>,
    {
        let mut chunk = vec![0.0; samples_per_ms(synth)];
        for _ in 0..ms {
            synth.render_mono(&mut chunk);
            trace.observe(synth.snapshot());
        }
    }

    /// Play `pattern` on `keys` while rendering `ms` milliseconds
    pub fn render_pattern<S, V>(
        synth: &mut Synthesizer<S, V>,
        keys: &ScriptedKeys,
        pattern: &PaddlePattern,
        ms: u64,
        trace: &mut SegmentTrace,
    ) where
        S: SegmentSource,
        V: Deref<Target = SegmentView>,
    {
        let mut chunk = vec![0.0; samples_per_ms(synth)];
        for t in 0..ms {
            keys.set(pattern.state_at(t));
            synth.render_mono(&mut chunk);
            trace.observe(synth.snapshot());
        }
    }
}
