//! Paddle contacts on embedded-hal pins, through to the keyer

#[cfg(test)]
mod tests {
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction};
    use keyer_core::test_utils::SegmentTrace;
    use keyer_core::{
        Keyer, KeyerConfig, KeyerControl, KeyingMode, LogicalKeyState, PaddleInput, PinPaddle,
        SegmentView, SynthParams, Synthesizer,
    };

    fn reads(levels: impl IntoIterator<Item = State>) -> Vec<Transaction> {
        levels.into_iter().map(Transaction::get).collect()
    }

    #[test]
    fn test_pins_are_active_low_and_debounced() {
        let input = PaddleInput::new();
        let dit = PinMock::new(&reads([State::Low, State::High, State::High, State::High]));
        let dash = PinMock::new(&reads([State::High, State::High, State::Low, State::Low]));
        let mut paddle = PinPaddle::new(dit, dash, &input);

        assert_eq!(paddle.poll(0), Ok(LogicalKeyState::Left));
        // Release 3 ms after the press is contact bounce
        assert_eq!(paddle.poll(3), Ok(LogicalKeyState::Left));
        assert_eq!(paddle.poll(20), Ok(LogicalKeyState::Right));
        assert_eq!(paddle.poll(25), Ok(LogicalKeyState::Right));

        let (mut dit, mut dash) = paddle.release();
        dit.done();
        dash.done();
    }

    #[test]
    fn test_pin_paddle_drives_keyer() {
        const MS: u64 = 300;
        let dit_levels = (0..MS).map(|t| if t < 130 { State::Low } else { State::High });
        let dash_levels = (0..MS).map(|_| State::High);

        let input = PaddleInput::new();
        let mut paddle = PinPaddle::new(
            PinMock::new(&reads(dit_levels)),
            PinMock::new(&reads(dash_levels)),
            &input,
        );

        let control = KeyerControl::new(KeyerConfig {
            mode: KeyingMode::IambicA,
            ..KeyerConfig::default()
        });
        let view = SegmentView::new();
        let params = SynthParams {
            sample_rate: 8_000,
            ..SynthParams::default()
        };
        let mut synth = Synthesizer::new(Keyer::new(&input, &control), &view, params).unwrap();

        let mut trace = SegmentTrace::new();
        let mut chunk = [0.0f32; 8];
        for t in 0..MS {
            paddle.poll(t as u32).unwrap();
            synth.render_mono(&mut chunk);
            trace.observe(view.snapshot());
        }
        trace.finish();

        assert_eq!(trace.marks(), vec![60, 60]);
        assert_eq!(control.marks_sent(), 2);

        let (mut dit, mut dash) = paddle.release();
        dit.done();
        dash.done();
    }
}
