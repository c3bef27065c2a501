//! Mode-specific paddle behavior, played through the synthesizer

#[cfg(test)]
mod tests {
    use crate::Rig;
    use keyer_core::test_utils::{render_pattern, PaddlePattern, SegmentTrace};
    use keyer_core::{KeyerError, KeyingMode, LogicalKeyState, Shape, SynthParams};
    use rstest::rstest;

    const DIT: u64 = 60;

    /// Squeeze both paddles from idle, releasing dit during the dash that
    /// follows the first dit
    #[rstest]
    #[case::mode_a(KeyingMode::IambicA, ".-")]
    #[case::mode_b(KeyingMode::IambicB, ".-.")]
    fn test_squeeze_release_during_dash(#[case] mode: KeyingMode, #[case] expected: &str) {
        println!("\n=== {:?}: squeeze, release both during the dash ===", mode);
        let mut rig = Rig::new(mode, 20.0);
        let trace = rig.play(&PaddlePattern::squeeze(150, 200), 1_000);

        println!("✓ sent {}", trace.to_morse_string(DIT));
        assert_eq!(trace.to_morse_string(DIT), expected);
    }

    #[rstest]
    #[case::mode_a(KeyingMode::IambicA, ".--")]
    #[case::mode_b(KeyingMode::IambicB, ".-.-")]
    fn test_squeeze_then_hold_dash(#[case] mode: KeyingMode, #[case] expected: &str) {
        let mut rig = Rig::new(mode, 20.0);
        let trace = rig.play(&PaddlePattern::squeeze(150, 400), 1_200);
        assert_eq!(trace.to_morse_string(DIT), expected);
    }

    #[rstest]
    #[case::iambic_a(KeyingMode::IambicA)]
    #[case::iambic_b(KeyingMode::IambicB)]
    #[case::full_bug(KeyingMode::FullyAutomaticBug)]
    #[case::semi_bug(KeyingMode::SemiAutomaticBug)]
    fn test_held_dit_paddle_repeats(#[case] mode: KeyingMode) {
        let mut rig = Rig::new(mode, 20.0);
        // Released mid-way through the fourth dit's space
        let trace = rig.play(&PaddlePattern::hold(LogicalKeyState::Left, 400), 1_000);

        assert_eq!(trace.to_morse_string(DIT), "....");
        let analysis = trace.analyze_timing(DIT);
        assert_eq!(analysis.dit_accuracy(), 0.0);
        assert_eq!(analysis.spacing_accuracy(), 0.0);
    }

    #[test]
    fn test_iambic_dash_weighting() {
        let mut rig = Rig::new(KeyingMode::IambicA, 20.0);
        rig.control.set_speed(20.0, 4.0).unwrap();
        let trace = rig.play(&PaddlePattern::hold(LogicalKeyState::Right, 250), 1_000);

        assert_eq!(trace.marks(), vec![240]);
        assert_eq!(trace.analyze_timing(DIT).dash_accuracy(4.0), 0.0);
    }

    #[test]
    fn test_straight_key_follows_hold_time() {
        let mut rig = Rig::new(KeyingMode::StraightKey, 20.0);
        let pattern = PaddlePattern::new("Straight key")
            .at(0, LogicalKeyState::Left)
            .at(250, LogicalKeyState::Neither)
            .at(400, LogicalKeyState::Right)
            .at(437, LogicalKeyState::Neither);
        let trace = rig.play(&pattern, 800);

        assert_eq!(trace.marks(), vec![250, 37]);
        assert_eq!(trace.gaps(), vec![150]);
    }

    #[test]
    fn test_semi_bug_dash_is_manual() {
        let mut rig = Rig::new(KeyingMode::SemiAutomaticBug, 20.0);
        let trace = rig.play(&PaddlePattern::hold(LogicalKeyState::Right, 333), 800);
        assert_eq!(trace.marks(), vec![333]);
    }

    #[test]
    fn test_full_bug_squeeze_repeats_first_sign() {
        let mut rig = Rig::new(KeyingMode::FullyAutomaticBug, 20.0);
        let trace = rig.play(&PaddlePattern::squeeze(230, 230), 800);
        // No alternation: both paddles behave like the dit paddle
        assert_eq!(trace.to_morse_string(DIT), "..");
    }

    #[test]
    fn test_mode_change_waits_for_idle() {
        let mut rig = Rig::new(KeyingMode::IambicB, 20.0);
        rig.keys.set(LogicalKeyState::Left);
        rig.run(30);
        assert_eq!(
            rig.control.set_mode(KeyingMode::StraightKey),
            Err(KeyerError::ModeChangeWhileBusy)
        );

        rig.keys.release();
        rig.run(300);
        assert!(rig.control.idle());
        rig.control.set_mode(KeyingMode::StraightKey).unwrap();

        let trace = rig.play(&PaddlePattern::hold(LogicalKeyState::Left, 100), 300);
        assert_eq!(trace.marks(), vec![100]);
    }

    #[test]
    fn test_speed_change_applies_at_next_sign() {
        let mut rig = Rig::new(KeyingMode::IambicA, 20.0);
        let pattern = PaddlePattern::hold(LogicalKeyState::Left, 1_000);
        let mut first = SegmentTrace::new();
        render_pattern(&mut rig.synth, &rig.keys, &pattern, 30, &mut first);

        rig.control.set_speed(30.0, 3.0).unwrap();
        let mut rest = SegmentTrace::new();
        render_pattern(&mut rig.synth, &rig.keys, &pattern, 300, &mut rest);
        rest.finish();

        // The dit in progress keeps its 20 WPM length
        assert_eq!(rest.marks()[0], 60);
        assert!(rest.marks()[1..].iter().all(|ms| *ms == 40));
    }

    #[rstest]
    #[case(Shape::Sharp)]
    #[case(Shape::Ramp)]
    #[case(Shape::Cosine)]
    fn test_shapes_keep_timing(#[case] shape: Shape) {
        let mut rig = Rig::new(KeyingMode::IambicB, 20.0);
        let params = SynthParams {
            shape,
            ..rig.synth.params()
        };
        rig.synth.set_params(params).unwrap();
        let trace = rig.play(&PaddlePattern::hold(LogicalKeyState::Right, 200), 600);
        assert_eq!(trace.marks(), vec![180]);
    }
}
