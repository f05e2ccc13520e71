//! Benchmarks of updating the `groupUniqArray` states

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use data_block::array::{ArrayImpl, BinaryArray, Int64Array, ListArray};
use data_block::types::LogicalType;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uniq_agg::aggregate::create_group_uniq_array;
use uniq_agg::common::arena::Arena;

const NUM_GROUPS: usize = 16;

fn group_ids(size: usize, rng: &mut StdRng) -> Vec<usize> {
    (0..size).map(|_| rng.gen_range(0..NUM_GROUPS)).collect()
}

fn bench_fixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("UniqFixedInt64");
    let func = create_group_uniq_array(LogicalType::BigInt, None).unwrap();
    (10..=14).step_by(2).for_each(|log2_size| {
        let size = black_box(2usize.pow(log2_size));
        let mut rng = StdRng::seed_from_u64(42);
        let payload = ArrayImpl::from(Int64Array::from_values_iter(
            (0..size).map(|_| rng.gen_range(0..size as i64 / 4)),
        ));
        let ids = group_ids(size, &mut rng);

        group.bench_function(BenchmarkId::new("update", size), |b| {
            b.iter(|| {
                let mut states = func.init_states(NUM_GROUPS);
                func.update_states(&payload, &ids, &mut states, None)
                    .unwrap();
                states
            });
        });
    });
    group.finish();
}

fn bench_generic(c: &mut Criterion) {
    let mut group = c.benchmark_group("UniqGenericVarChar");
    (10..=14).step_by(2).for_each(|log2_size| {
        let size = black_box(2usize.pow(log2_size));
        let mut rng = StdRng::seed_from_u64(42);
        let strings = (0..size)
            .map(|_| format!("value-{}", rng.gen_range(0..size / 4)))
            .collect::<Vec<_>>();
        let payload = ArrayImpl::from(BinaryArray::from_strs(strings.iter().map(String::as_str)));
        let ids = group_ids(size, &mut rng);

        // Plain keys copy the raw bytes, serialized keys are written in the arena then
        // rolled back on duplicate. Compare the two
        let plain = create_group_uniq_array(LogicalType::VarChar, None).unwrap();
        group.bench_function(BenchmarkId::new("plain", size), |b| {
            b.iter(|| {
                let arena = Arena::new();
                let mut states = plain.init_states(NUM_GROUPS);
                plain
                    .update_states(&payload, &ids, &mut states, Some(&arena))
                    .unwrap();
                arena.used_bytes()
            });
        });

        let serialized = create_group_uniq_array(LogicalType::list(LogicalType::VarChar), None)
            .unwrap();
        // Each list holds one string
        let mut lists = ListArray::new(LogicalType::list(LogicalType::VarChar)).unwrap();
        strings.iter().for_each(|string| {
            lists
                .elements_mut()
                .append_raw_bytes(string.as_bytes())
                .unwrap();
            lists.finish_list();
        });
        let lists = ArrayImpl::from(lists);
        group.bench_function(BenchmarkId::new("serialized", size), |b| {
            b.iter(|| {
                let arena = Arena::new();
                let mut states = serialized.init_states(NUM_GROUPS);
                serialized
                    .update_states(&lists, &ids, &mut states, Some(&arena))
                    .unwrap();
                arena.used_bytes()
            });
        });
    });
    group.finish();
}

criterion_group!(benches, bench_fixed, bench_generic);
criterion_main!(benches);
