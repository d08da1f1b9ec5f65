// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::time::Instant;
use trajseg_core::{Constraints, ExecutionContext, ReproMode};
use trajseg_costs::CostMatrix;
use trajseg_offline::{CostStorage, Segmenter, SegmenterConfig, optimize};

fn regime_signal(n: usize) -> Vec<f64> {
    let levels = [0.1, 0.9, 0.4, 1.6];
    (0..n)
        .map(|idx| {
            let level = levels[(idx * levels.len() / n).min(levels.len() - 1)];
            let x = idx as f64;
            level + (x * 0.7).sin().abs() * 0.15
        })
        .collect()
}

fn bench_dp_sweep(c: &mut Criterion, n: usize, max_segments: usize) {
    let signal = regime_signal(n);
    let matrix = CostMatrix::build(&signal).expect("matrix should build");
    let constraints = Constraints::default();
    let mut group = c.benchmark_group("segment_sweep");

    for repro_mode in [ReproMode::Balanced, ReproMode::Fast] {
        let ctx = ExecutionContext::new(&constraints).with_repro_mode(repro_mode);
        group.bench_function(
            format!("dp_n{n}_k{max_segments}_{}", repro_mode.as_str()),
            |b| {
                b.iter(|| {
                    optimize(
                        black_box(&matrix),
                        black_box(max_segments),
                        &ctx,
                        1_000,
                        Instant::now(),
                    )
                    .expect("optimize should succeed")
                })
            },
        );
    }

    for cost_storage in [CostStorage::Dense, CostStorage::OnDemand] {
        let segmenter = Segmenter::new(SegmenterConfig {
            max_segments,
            cost_storage,
            ..SegmenterConfig::default()
        })
        .expect("valid config");
        let ctx = ExecutionContext::new(&constraints);
        group.bench_function(
            format!("pipeline_n{n}_k{max_segments}_{}", cost_storage.as_str()),
            |b| {
                b.iter(|| {
                    segmenter
                        .segment_signal(black_box(&signal), &ctx)
                        .expect("segmentation should succeed")
                })
            },
        );
    }

    group.finish();
}

fn benchmark_segment_sweep(c: &mut Criterion) {
    bench_dp_sweep(c, 200, 10);
    bench_dp_sweep(c, 1_000, 50);
}

criterion_group!(benches, benchmark_segment_sweep);
criterion_main!(benches);
