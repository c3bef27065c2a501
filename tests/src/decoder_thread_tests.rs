//! Threaded decoder lifecycle and notification

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::Rig;
    use keyer_core::{Classification, Decoder, DecoderConfig, KeyerError, KeyingMode, SegmentView};
    use tokio::sync::watch;
    use tokio::time::timeout;

    fn config(wpm: f32) -> DecoderConfig {
        DecoderConfig {
            wpm,
            ..DecoderConfig::default()
        }
    }

    #[tokio::test]
    async fn test_decoder_thread_notifies_through_watch() {
        println!("\n=== Decoder thread with watch notifier ===");
        let mut rig = Rig::new(KeyingMode::Keyboard, 30.0);
        let mut decoder = Decoder::new(Arc::clone(&rig.view), config(30.0));
        let (tx, mut rx) = watch::channel(0usize);

        tokio_test::assert_ok!(decoder.start(move |len| {
            tx.send_replace(len);
        }));
        assert!(decoder.is_running());
        assert_eq!(decoder.start(|_| {}), Err(KeyerError::AlreadyRunning));

        rig.control.send_text("K").unwrap();
        // Render roughly in real time so the poll loop sees every edge
        let clock = tokio::task::spawn_blocking(move || {
            let mut chunk = [0.0f32; 8];
            for _ in 0..800 {
                rig.synth.render_mono(&mut chunk);
                std::thread::sleep(Duration::from_millis(1));
            }
        });

        let changed = timeout(Duration::from_secs(5), rx.changed()).await;
        assert!(matches!(changed, Ok(Ok(()))));
        println!("✓ notified, text length {}", *rx.borrow());

        clock.await.unwrap();
        decoder.stop();
        assert!(!decoder.is_running());
        assert_eq!(decoder.get_text(), "K ");
        assert_eq!(*rx.borrow(), 2);
    }

    #[tokio::test]
    async fn test_drop_joins_running_decoder() {
        let view = Arc::new(SegmentView::new());
        let mut decoder = Decoder::new(Arc::clone(&view), config(20.0));
        decoder.start(|_| {}).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(decoder);
        // Only the test's handle remains once the thread has exited
        assert_eq!(Arc::strong_count(&view), 1);
    }

    #[test]
    fn test_poll_once_from_caller() {
        let mut rig = Rig::new(KeyingMode::Keyboard, 20.0);
        let decoder = Decoder::new(Arc::clone(&rig.view), config(20.0));
        rig.control.send('T').unwrap();

        let mut chunk = [0.0f32; 8];
        let mut seen = Vec::new();
        for _ in 0..600 {
            rig.synth.render_mono(&mut chunk);
            if let Some(class) = decoder.poll_once() {
                seen.push(class);
            }
        }
        assert_eq!(seen, vec![Classification::Dash, Classification::WordGap]);
        assert_eq!(decoder.get_text(), "T ");
        assert!(!decoder.is_running());
    }

    #[test]
    fn test_speed_control() {
        let view = Arc::new(SegmentView::new());
        let decoder = Decoder::new(view, config(20.0));
        assert_eq!(decoder.get_speed().dit_ms, 60.0);

        decoder.set_speed(40.0, 3.0).unwrap();
        assert_eq!(decoder.get_speed().dit_ms, 30.0);
        assert_eq!(decoder.set_speed(400.0, 3.0), Err(KeyerError::InvalidSpeed));
        assert_eq!(decoder.get_speed().wpm, 40.0);

        decoder.reset();
        assert!(!decoder.is_idle());
        assert_eq!(decoder.get_text(), "");
    }
}
