// SPDX-License-Identifier: PMPL-1.0-or-later
//! Performance benchmarks for the plan fingerprinting pipeline

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};

use planprint_core::{
    compare, extract_filter_stats, fingerprint, normalize, simplify, CanonicalizationConfig,
    NormalizerPolicy, PlanDocument, SimplifierPolicy,
};

/// Build a left-deep chain of hash joins over `joins + 1` filtered scans.
fn join_chain(joins: usize, noise: f64) -> PlanDocument {
    let scan = |i: usize| {
        json!({
            "Node Type": "Seq Scan",
            "Parent Relationship": "Outer",
            "Relation Name": format!("t{i}"),
            "Startup Cost": 0.0,
            "Total Cost": 1000.0 * noise,
            "Plan Rows": 1000,
            "Actual Rows": 900,
            "Actual Loops": 1,
            "Filter": format!("(c{i} > 10)"),
            "Rows Removed by Filter": 100,
            "Shared Hit Blocks": (i as f64 * noise) as u64
        })
    };

    let mut plan: Value = scan(0);
    for i in 1..=joins {
        plan = json!({
            "Node Type": "Hash Join",
            "Join Type": "Inner",
            "Hash Cond": format!("(t{}.id = t{i}.id)", i - 1),
            "Total Cost": 5000.0 * noise,
            "Actual Total Time": 12.0 * noise,
            "Plans": [
                plan,
                { "Node Type": "Hash", "Hash Buckets": 1024, "Plans": [scan(i)] }
            ]
        });
    }

    PlanDocument::from_value(&json!([{ "Plan": plan, "Execution Time": 40.0 * noise }]))
        .expect("benchmark plan should decode")
}

// ============================================================================
// Canonicalization Benchmarks
// ============================================================================

fn bench_canonicalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("canonicalize");
    let normalizer = NormalizerPolicy::default();
    let simplifier = SimplifierPolicy::default();

    for joins in [1, 8, 32] {
        let doc = join_chain(joins, 1.0);
        group.throughput(Throughput::Elements((joins * 3 + 1) as u64));

        group.bench_with_input(BenchmarkId::new("normalize", joins), &doc, |b, doc| {
            b.iter(|| black_box(normalize(doc, &normalizer)))
        });
        group.bench_with_input(BenchmarkId::new("simplify", joins), &doc, |b, doc| {
            b.iter(|| black_box(simplify(doc, &simplifier).unwrap()))
        });
    }

    group.finish();
}

// ============================================================================
// Fingerprint Benchmarks
// ============================================================================

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");
    let policy = NormalizerPolicy::default();

    for joins in [1, 8, 32] {
        let tree = normalize(&join_chain(joins, 1.0), &policy);
        group.bench_with_input(BenchmarkId::from_parameter(joins), &tree, |b, tree| {
            b.iter(|| black_box(fingerprint(tree).unwrap()))
        });
    }

    group.finish();
}

// ============================================================================
// Comparison Benchmarks
// ============================================================================

fn bench_compare(c: &mut Criterion) {
    let mut group = c.benchmark_group("compare");
    let config = CanonicalizationConfig::default();

    let a = join_chain(16, 1.0);
    let b = join_chain(16, 1.7);

    group.bench_function("compare_16_joins", |bench| {
        bench.iter(|| black_box(compare(&a, &b, &config).unwrap()))
    });
    group.bench_function("filter_stats_16_joins", |bench| {
        bench.iter(|| black_box(extract_filter_stats(&a).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, bench_canonicalize, bench_fingerprint, bench_compare);
criterion_main!(benches);
