//! Canonicalization pipeline benchmarks.
//!
//! Each stage is timed on decision trees of generated functions, so the
//! input size doubles with every variable.
//!
//! Run with:
//! ```bash
//! cargo bench --bench pipeline
//! ```

use abdd_rs::automaton::Automaton;
use abdd_rs::boxes::{box_order, BoxCatalogue};
use abdd_rs::fold::fold;
use abdd_rs::normalize::normalize;
use abdd_rs::pipeline::canonicalize;
use abdd_rs::unfold::unfold;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

// ============================================================================
// Helpers
// ============================================================================

/// x1 AND xn, with every middle variable a don't-care.
fn ends(n: u32) -> Automaton {
    Automaton::from_truth_table(n, |v| v[0] && v[v.len() - 1])
}

fn parity(n: u32) -> Automaton {
    Automaton::from_truth_table(n, |v| v.iter().filter(|&&b| b).count() % 2 == 1)
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_stages(c: &mut Criterion) {
    let catalogue = BoxCatalogue::standard();
    let order = box_order("bdd").unwrap_or(&["X"]);
    let mut group = c.benchmark_group("stages");

    for n in [4u32, 6, 8] {
        let tree = ends(n);
        group.throughput(Throughput::Elements(tree.num_states() as u64));

        group.bench_with_input(BenchmarkId::new("normalize", n), &tree, |b, tree| {
            b.iter(|| normalize(tree, n).unwrap())
        });

        let normalized = normalize(&tree, n).unwrap();
        group.bench_with_input(BenchmarkId::new("fold", n), &normalized, |b, aut| {
            b.iter(|| fold(aut, &catalogue, order, n).unwrap())
        });

        let folded = fold(&normalized, &catalogue, order, n).unwrap();
        group.bench_with_input(BenchmarkId::new("unfold", n), &folded, |b, aut| {
            b.iter(|| unfold(aut, &catalogue, n).unwrap())
        });
    }

    group.finish();
}

fn bench_box_orders(c: &mut Criterion) {
    let catalogue = BoxCatalogue::standard();
    let n = 6;
    let tree = parity(n);
    let mut group = c.benchmark_group("box_orders");
    group.sample_size(20);

    for name in ["bdd", "zbdd", "esr", "full"] {
        let Some(order) = box_order(name) else { continue };
        group.bench_with_input(BenchmarkId::new("canonicalize", name), &tree, |b, tree| {
            b.iter(|| canonicalize(tree, &catalogue, order, n).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_stages, bench_box_orders);
criterion_main!(benches);
