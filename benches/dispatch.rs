//! Witness dispatch and wire codec throughput.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use card_sync::transport::{decode, encode, Message};
use card_sync::witness::{
    FnHandler, Handled, WitnessDispatcher, WitnessFrame, WitnessHandlerRegistry, WitnessKind, WitnessRecord,
};

const STREAM: u64 = 1_000;

fn registry() -> WitnessHandlerRegistry<u64> {
    WitnessHandlerRegistry::<u64>::new()
        .with(FnHandler::new(WitnessKind::Damage, |w, total: &mut u64, _| {
            *total += w.int_list("amounts").iter().sum::<i64>() as u64;
            Ok(Handled::Consumed)
        }))
        .unwrap()
}

fn damage(sequence: u64) -> WitnessFrame {
    WitnessRecord::builder(WitnessKind::Damage)
        .var("cardRIDs", vec![sequence as i64, sequence as i64 + 1])
        .var("amounts", vec![2i64, 3])
        .build()
        .unwrap()
        .to_frame(sequence)
}

fn bench_in_order(c: &mut Criterion) {
    let frames: Vec<WitnessFrame> = (0..STREAM).map(damage).collect();

    c.bench_function("dispatch_in_order_1k", |b| {
        b.iter_batched(
            || WitnessDispatcher::new(registry(), 64),
            |mut dispatcher| {
                let mut total = 0u64;
                for frame in &frames {
                    dispatcher.receive(frame).unwrap();
                    dispatcher.pump(&mut total).unwrap();
                }
                black_box(total)
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_reordered(c: &mut Criterion) {
    // Pairwise swapped: every other frame waits in the reorder buffer.
    let mut frames: Vec<WitnessFrame> = (0..STREAM).map(damage).collect();
    for pair in frames.chunks_mut(2) {
        pair.reverse();
    }

    c.bench_function("dispatch_reordered_1k", |b| {
        b.iter_batched(
            || WitnessDispatcher::new(registry(), 64),
            |mut dispatcher| {
                let mut total = 0u64;
                for frame in &frames {
                    dispatcher.receive(frame).unwrap();
                    dispatcher.pump(&mut total).unwrap();
                }
                black_box(total)
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_codec(c: &mut Criterion) {
    let message = Message::Witness { frame: damage(42) };
    let bytes = encode(&message).unwrap();

    c.bench_function("encode_witness", |b| b.iter(|| encode(black_box(&message)).unwrap()));
    c.bench_function("decode_witness", |b| b.iter(|| decode(black_box(&bytes)).unwrap()));
}

criterion_group!(benches, bench_in_order, bench_reordered, bench_codec);
criterion_main!(benches);
