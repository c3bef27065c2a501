//! Keyboard text through keyer, synthesizer and decoder

#[cfg(test)]
mod tests {
    use crate::{matched_decoder, Rig, RIG_SAMPLE_RATE};
    use keyer_core::morse::PLACEHOLDER_CHAR;
    use keyer_core::{Classification, KeyingMode, Sent};
    use rstest::rstest;

    #[rstest]
    #[case(20.0, "PARIS")]
    #[case(12.0, "CQ DE TEST")]
    #[case(35.0, "73 TU")]
    fn test_keyboard_round_trip(#[case] wpm: f32, #[case] text: &str) {
        println!("\n=== Round trip {:?} at {} WPM ===", text, wpm);
        let mut rig = Rig::new(KeyingMode::Keyboard, wpm);
        let mut decoder = matched_decoder(wpm);
        let mut decoded = String::new();

        rig.control.send_text(text).unwrap();
        rig.decode_into(&mut decoder, &mut decoded, 2_000, 60_000);

        println!("✓ decoded {:?}", decoded);
        assert_eq!(decoded.trim_end(), text);

        let speed = decoder.speed();
        assert!(speed.weighting >= 2.8 && speed.weighting <= 4.8);
        assert!((speed.wpm - wpm).abs() / wpm < 0.1, "adapted to {} wpm", speed.wpm);
    }

    #[test]
    fn test_decoder_adapts_to_faster_sender() {
        let mut rig = Rig::new(KeyingMode::Keyboard, 30.0);
        let mut decoder = matched_decoder(20.0);
        let mut decoded = String::new();

        rig.control.send_text("SOS SOS SOS").unwrap();
        rig.decode_into(&mut decoder, &mut decoded, 2_000, 60_000);

        assert!(decoded.ends_with("SOS "), "decoded {:?}", decoded);
        assert!(decoder.speed().wpm > 25.0);
    }

    #[test]
    fn test_decoder_writes_into_fixed_buffer() {
        let mut rig = Rig::new(KeyingMode::Keyboard, 25.0);
        let mut decoder = matched_decoder(25.0);
        let mut decoded: heapless::String<8> = heapless::String::new();

        rig.control.send_text("HI").unwrap();
        rig.decode_into(&mut decoder, &mut decoded, 1_000, 10_000);
        assert_eq!(decoded.as_str(), "HI ");
    }

    #[test]
    fn test_unmapped_character_sends_placeholder() {
        let mut rig = Rig::new(KeyingMode::Keyboard, 25.0);
        let mut decoder = matched_decoder(25.0);
        let mut decoded = String::new();

        assert_eq!(
            rig.control.send('~'),
            Ok(Sent::Substituted {
                requested: '~',
                placeholder: PLACEHOLDER_CHAR,
            })
        );
        rig.decode_into(&mut decoder, &mut decoded, 1_000, 10_000);
        assert_eq!(decoded.trim_end(), PLACEHOLDER_CHAR.to_string());
    }

    #[test]
    fn test_keyboard_element_timing() {
        let mut rig = Rig::new(KeyingMode::Keyboard, 20.0);
        rig.control.send_text("ET").unwrap();
        let trace = rig.run(1_000);

        assert_eq!(trace.marks(), vec![60, 180]);
        // element space plus character space
        assert_eq!(trace.gaps(), vec![180]);
        assert_eq!(trace.to_morse_string(60), ".-");
    }

    #[test]
    fn test_snapshot_stable_without_render() {
        let mut rig = Rig::new(KeyingMode::Keyboard, 20.0);
        rig.control.send('A').unwrap();
        rig.run(75);

        let first = rig.view.snapshot();
        let second = rig.view.snapshot();
        assert_eq!(first, second);
        assert!(!first.asserted);
        assert_eq!(first.elapsed_ms, 15);
    }

    #[test]
    fn test_idle_keyer_never_emits_zero_length_mark() {
        let mut rig = Rig::new(KeyingMode::Keyboard, 20.0);
        let trace = rig.run(500);
        assert!(trace.marks().is_empty());
        assert_eq!(rig.synth.view().snapshot().elapsed_ms, 500);

        let mut buf = vec![0.0f32; RIG_SAMPLE_RATE as usize / 10];
        rig.synth.render_mono(&mut buf);
        assert!(buf.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_stuck_carrier_flushes_once() {
        let mut rig = Rig::new(KeyingMode::StraightKey, 20.0);
        let mut decoder = matched_decoder(20.0);
        let mut text = String::new();
        let mut chunk = vec![0.0f32; 8];
        let mut stuck = 0;

        rig.keys.set(keyer_core::LogicalKeyState::Left);
        // Word-gap boundary times the stuck factor is 2400 ms at 20 WPM
        for _ in 0..3_000 {
            rig.synth.render_mono(&mut chunk);
            if decoder.observe(rig.view.snapshot(), &mut text) == Some(Classification::StuckHigh) {
                stuck += 1;
            }
        }
        assert_eq!(stuck, 1);
        assert!(decoder.is_idle());

        rig.keys.release();
        for _ in 0..10 {
            rig.synth.render_mono(&mut chunk);
            decoder.observe(rig.view.snapshot(), &mut text);
        }
        assert!(!decoder.is_idle());
        assert!(text.is_empty());
    }
}
