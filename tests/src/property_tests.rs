//! Property tests for speed arithmetic, Morse tables and the decoder

#[cfg(test)]
mod tests {
    use keyer_core::fsm::Timing;
    use keyer_core::morse::{self, Symbol};
    use keyer_core::types::{MAX_WEIGHTING, MAX_WPM, MIN_WEIGHTING, MIN_WPM};
    use keyer_core::{
        transition, Classification, CodeAccumulator, DecoderConfig, DecoderCore, Element, Input,
        KeyerState, KeyingMode, LogicalKeyState, SpeedParams,
    };
    use proptest::prelude::*;

    const MAPPED: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789.,?'!/()&:;=+-_\"@";

    fn key_state() -> impl Strategy<Value = LogicalKeyState> {
        prop_oneof![
            Just(LogicalKeyState::Neither),
            Just(LogicalKeyState::Left),
            Just(LogicalKeyState::Right),
            Just(LogicalKeyState::Both),
        ]
    }

    fn paddle_mode() -> impl Strategy<Value = KeyingMode> {
        prop_oneof![
            Just(KeyingMode::IambicA),
            Just(KeyingMode::IambicB),
            Just(KeyingMode::FullyAutomaticBug),
            Just(KeyingMode::SemiAutomaticBug),
        ]
    }

    proptest! {
        #[test]
        fn prop_dash_over_dit_is_weighting(
            wpm in MIN_WPM..=MAX_WPM,
            weighting in MIN_WEIGHTING..=MAX_WEIGHTING,
        ) {
            let speed = SpeedParams::new(wpm, weighting).unwrap();
            let dit = speed.dit_time_ms();
            prop_assert!((dit - 60_000.0 / (wpm * 50.0)).abs() < 1e-3);
            prop_assert!((speed.dash_time_ms() / dit - weighting).abs() < 1e-4);
        }

        #[test]
        fn prop_out_of_range_speed_rejected(wpm in 0.0f32..MIN_WPM, weighting in 0.0f32..MIN_WEIGHTING) {
            prop_assert!(SpeedParams::new(wpm, 3.0).is_err());
            prop_assert!(SpeedParams::new(20.0, weighting).is_err());
            prop_assert!(SpeedParams::new(MAX_WPM + 1.0 + wpm, 3.0).is_err());
        }

        #[test]
        fn prop_timing_is_whole_and_nonzero(
            wpm in MIN_WPM..=MAX_WPM,
            weighting in MIN_WEIGHTING..=MAX_WEIGHTING,
        ) {
            let timing = Timing::from_speed(&SpeedParams::new(wpm, weighting).unwrap());
            prop_assert!(timing.dit_ms >= 1);
            prop_assert!(timing.dash_ms >= 2 * timing.dit_ms - 1);
            prop_assert!(timing.word_ms >= timing.space_ms);
        }

        #[test]
        fn prop_matched_decoder_classifies_sent_intervals(
            wpm in MIN_WPM..=MAX_WPM,
            weighting in 2.5f32..=MAX_WEIGHTING,
        ) {
            let timing = Timing::from_speed(&SpeedParams::new(wpm, weighting).unwrap());
            let core = DecoderCore::new(&DecoderConfig {
                wpm,
                weighting,
                ..DecoderConfig::default()
            });
            prop_assert_eq!(core.classify(true, timing.dit_ms), Classification::Dit);
            prop_assert_eq!(core.classify(true, timing.dash_ms), Classification::Dash);
            prop_assert_eq!(core.classify(false, timing.dit_ms), Classification::SignGap);
            prop_assert_eq!(
                core.classify(false, timing.dit_ms + timing.space_ms),
                Classification::CharGap
            );
            prop_assert_eq!(
                core.classify(false, timing.dit_ms + timing.word_ms),
                Classification::WordGap
            );
        }

        #[test]
        fn prop_morse_round_trip(index in 0..MAPPED.len()) {
            let c = MAPPED.as_bytes()[index] as char;
            let code = morse::encode(c).unwrap();

            let mut acc = CodeAccumulator::new();
            for i in 0..code.len {
                acc.push(code.element(i).unwrap());
            }
            prop_assert_eq!(acc.symbol(), Symbol::Char(c));
            prop_assert_eq!(morse::encode(c.to_ascii_lowercase()), Some(code));
        }

        #[test]
        fn prop_transition_is_pure(
            mode in paddle_mode(),
            keys in key_state(),
            memory in prop::option::of(prop_oneof![Just(Element::Dit), Just(Element::Dash)]),
            wpm in MIN_WPM..=MAX_WPM,
        ) {
            let speed = SpeedParams::new(wpm, 3.0).unwrap();
            for state in [KeyerState::Idle, KeyerState::DitSpace, KeyerState::DashMark] {
                let a = transition(state, memory, mode, Input::keys(keys), &speed);
                let b = transition(state, memory, mode, Input::keys(keys), &speed);
                prop_assert_eq!(a, b);
                if a.state.is_mark() && !a.state.is_untimed() {
                    prop_assert!(!a.segment.is_open());
                }
            }
        }

        #[test]
        fn prop_released_paddles_reach_idle(mode in paddle_mode(), keys in key_state()) {
            let speed = SpeedParams::default();
            let mut t = transition(KeyerState::Idle, None, mode, Input::keys(keys), &speed);
            for _ in 0..16 {
                if t.state == KeyerState::Idle {
                    break;
                }
                t = transition(t.state, t.memory, mode, Input::keys(LogicalKeyState::Neither), &speed);
            }
            prop_assert_eq!(t.state, KeyerState::Idle);
        }
    }
}
