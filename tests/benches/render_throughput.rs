//! Render path throughput: one 10 ms audio buffer per iteration

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use keyer_core::{
    DecoderConfig, DecoderCore, Keyer, KeyerConfig, KeyerControl, KeyingMode, NoKeys, SegmentView,
    Shape, SynthParams, Synthesizer,
};

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_10ms");
    for shape in [Shape::Sharp, Shape::Ramp, Shape::Cosine] {
        group.bench_with_input(BenchmarkId::from_parameter(format!("{:?}", shape)), &shape, |b, shape| {
            let control = KeyerControl::new(KeyerConfig {
                mode: KeyingMode::Keyboard,
                wpm: 40.0,
                weighting: 3.0,
            });
            let view = SegmentView::new();
            let params = SynthParams {
                shape: *shape,
                ..SynthParams::default()
            };
            let mut synth = Synthesizer::new(Keyer::new(NoKeys, &control), &view, params)
                .expect("default parameters are valid");
            let mut buf = vec![0.0f32; 480 * 2];

            b.iter(|| {
                if control.pending() == 0 {
                    let _ = control.send_text("PARIS ");
                }
                synth.render(black_box(&mut buf), 2);
            });
        });
    }
    group.finish();
}

fn bench_decoder_observe(c: &mut Criterion) {
    let control = KeyerControl::new(KeyerConfig {
        mode: KeyingMode::Keyboard,
        wpm: 25.0,
        weighting: 3.0,
    });
    let view = SegmentView::new();
    let params = SynthParams {
        sample_rate: 8_000,
        ..SynthParams::default()
    };
    let mut synth = Synthesizer::new(Keyer::new(NoKeys, &control), &view, params)
        .expect("parameters are valid");
    let mut decoder = DecoderCore::new(&DecoderConfig {
        wpm: 25.0,
        ..DecoderConfig::default()
    });
    let mut text = String::new();
    let mut chunk = [0.0f32; 8];

    c.bench_function("decoder_observe_1ms", |b| {
        b.iter(|| {
            if control.pending() == 0 {
                let _ = control.send_text("CQ TEST ");
            }
            synth.render_mono(&mut chunk);
            decoder.observe(black_box(view.snapshot()), &mut text);
            if text.len() > 1024 {
                text.clear();
            }
        });
    });
}

criterion_group!(benches, bench_render, bench_decoder_observe);
criterion_main!(benches);
