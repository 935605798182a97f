//! Payload serialization benchmarks.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use parallax_msgconv::metadata::{ClassifierMeta, FrameMeta, LabelInfo, ObjectMeta, RectParams, TextParams};
use parallax_msgconv::payload::PayloadType;
use parallax_msgconv::schema::render_frame;

fn frame_with_objects(count: usize) -> FrameMeta {
    (0..count).fold(FrameMeta::new(1, 0).with_frame_size(1920, 1080), |frame, i| {
        frame.with_object(
            ObjectMeta::new(i as u64, (i % 4) as i32, 0.75)
                .with_rect(RectParams::new(10 * i as u32, 20, 64, 128))
                .with_text(TextParams::new(format!("object {}", i), 10, 10))
                .with_label("vehicle")
                .with_classifier(ClassifierMeta::new(2).with_label(LabelInfo::new("sedan", 1, 0.8))),
        )
    })
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_frame");

    for num_objects in [0, 8, 64, 256] {
        let frame = frame_with_objects(num_objects);
        group.throughput(Throughput::Elements(num_objects.max(1) as u64));

        for payload_type in [PayloadType::Full, PayloadType::Minimal] {
            group.bench_with_input(
                BenchmarkId::new(payload_type.as_str(), num_objects),
                &frame,
                |b, frame| {
                    b.iter(|| {
                        let bytes = render_frame(frame, payload_type).expect("serializable");
                        std::hint::black_box(bytes);
                    });
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_render);
criterion_main!(benches);
