//! Criterion benchmarks for the ligature-core update cycle
//!
//! Run with: cargo bench -p ligature-core
#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use ligature_core::{
    ModuleId, ModuleSubtree, Modulator, ParamId, Parameter, ParameterBridge, ParameterDetails, Session,
    SharedModulator,
};

const SAMPLE_RATE: f32 = 48000.0;
const MODULATOR_COUNTS: &[usize] = &[0, 1, 4, 16];

fn bench_update_value(c: &mut Criterion) {
    let mut group = c.benchmark_group("Parameter");

    for &count in MODULATOR_COUNTS {
        group.bench_with_input(BenchmarkId::new("update_value", count), &count, |b, &count| {
            let p = Parameter::shared(ParameterDetails::frequency(
                ParamId(1),
                "Cutoff",
                20.0,
                20_000.0,
                1_000.0,
            ));
            let modulators: Vec<Arc<SharedModulator>> =
                (0..count).map(|_| Arc::new(SharedModulator::default())).collect();
            for m in &modulators {
                let m: Arc<dyn Modulator> = Arc::clone(m) as Arc<dyn Modulator>;
                p.add_modulator(Arc::downgrade(&m), None);
            }
            let mut phase = 0.0f32;
            b.iter(|| {
                phase = (phase + 0.01) % 1.0;
                for m in &modulators {
                    m.set_signal(phase * 0.1);
                }
                black_box(p.update_value(black_box(SAMPLE_RATE)));
                black_box(p.internal_value::<f32>(SAMPLE_RATE, false))
            });
        });
    }

    // Nothing changed: the early-out path
    group.bench_function("update_value_clean", |b| {
        let p = Parameter::shared(ParameterDetails::continuous(ParamId(1), "Gain", 0.0, 1.0, 0.5));
        p.update_value(SAMPLE_RATE);
        b.iter(|| black_box(p.update_value(black_box(SAMPLE_RATE))));
    });

    group.bench_function("update_value_host_bound", |b| {
        let p = Parameter::shared(ParameterDetails::continuous(ParamId(1), "Gain", 0.0, 1.0, 0.5));
        let bridge = ParameterBridge::new(0);
        bridge.reset_parameter_link(Some(&p), true);
        let mut value = 0.0f32;
        b.iter(|| {
            value = (value + 0.001) % 1.0;
            bridge.set_value(value);
            black_box(p.update_value(black_box(SAMPLE_RATE)))
        });
    });

    group.finish();
}

fn bench_process_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("Session");

    for &modules in &[1usize, 8, 32] {
        group.bench_with_input(BenchmarkId::new("process_block", modules), &modules, |b, &modules| {
            let session = Session::default();
            let mut levels = Vec::new();
            for i in 0..modules {
                let module = session.create_module(
                    "gain",
                    vec![ParameterDetails::continuous(ParamId(1), "Level", 0.0, 1.0, 0.5)],
                );
                levels.push(Arc::clone(&module.parameters[0]));
                let _ = session.insert_module(ModuleId::ROOT, i, ModuleSubtree::leaf(module));
            }
            let mut value = 0.0f32;
            b.iter(|| {
                value = (value + 0.001) % 1.0;
                for level in &levels {
                    level.set_normalized_value(value);
                }
                black_box(session.process_block(black_box(SAMPLE_RATE)))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_update_value, bench_process_block);

criterion_main!(benches);
