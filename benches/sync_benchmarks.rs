use criterion::{black_box, criterion_group, criterion_main, Criterion};
use paramlink::{
    channel, queue, MessageQueueConfig, NormalizedState, ParamChangeQueue, ParamDef,
    ParameterRegistry, SaveOrder, Utf8StringSerializer,
};
use std::sync::Arc;

const PARAMS: u32 = 64;

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("RtState.run_cycle()", |b| {
        let mut registry = ParameterRegistry::new();
        for id in 0..PARAMS {
            registry.register_plain(ParamDef::normalized(id), 0.0).unwrap();
        }
        let status = registry
            .register_outbound(
                ParamDef::typed::<String>(PARAMS).shared(),
                Utf8StringSerializer::new(),
                String::new(),
            )
            .unwrap();
        let mut sync = registry.build().unwrap();
        let (mut producer, mut receiver) = queue(&MessageQueueConfig::default());

        let mut changes: Vec<_> = (0..PARAMS).map(ParamChangeQueue::new).collect();
        let mut block = 0u32;

        b.iter(move || {
            block = block.wrapping_add(1);
            let value = (block % 100) as f64 / 100.0;
            for queue in changes.iter_mut() {
                queue.clear();
                queue.push(0, value);
            }
            let report = sync.rt.run_cycle(&changes, &mut producer, |rt| {
                if block % 10 == 0 {
                    rt.outbound_mut(&status).unwrap().modify(|s| {
                        s.clear();
                        s.push_str("tick");
                    });
                }
            });
            receiver.drain(|message| {
                black_box(message);
            });
            black_box(report)
        })
    });

    c.bench_function("exchange publish + consume", |b| {
        let order = Arc::new(SaveOrder::new((0..PARAMS).collect()));
        let state = NormalizedState::new(order);
        let mut into = state.clone();
        let (mut publisher, mut receiver) = channel(state.clone());

        b.iter(move || {
            publisher.publish(&state);
            black_box(receiver.consume(&mut into))
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
