//! Font-size tiering benchmarks
//!
//! Compares the k-means and sorted-gap strategies on documents with a
//! growing number of spans, and measures full heading detection.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use secrank_core::{
    BBox, DecodedDocument, GapTiers, HeadingDetector, KMeansTiers, PageText, RawSpan, TierStrategy,
};

/// Deterministic pseudo-random font sizes between 6 and 36 points
fn font_sizes(count: usize, seed: u64) -> Vec<f32> {
    let mut s = seed;
    (0..count)
        .map(|_| {
            s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
            let unit = ((s >> 33) as f32) / (u32::MAX >> 1) as f32;
            (6.0 + unit * 30.0).round()
        })
        .collect()
}

fn synthetic_document(spans_per_page: usize, pages: u32) -> DecodedDocument {
    let sizes = font_sizes(spans_per_page * pages as usize, 7);
    let mut spans = Vec::with_capacity(sizes.len());
    for (i, size) in sizes.into_iter().enumerate() {
        let page = (i / spans_per_page) as u32 + 1;
        let y0 = 40.0 + (i % spans_per_page) as f32 * 14.0;
        spans.push(RawSpan {
            page,
            text: format!("Span number {i}"),
            size,
            font: if i % 5 == 0 { "Arial-BoldMT" } else { "ArialMT" }.to_string(),
            bbox: BBox::new(72.0, y0, 400.0, y0 + size),
        });
    }
    DecodedDocument {
        id: "bench.pdf".to_string(),
        pages: (1..=pages)
            .map(|number| PageText {
                number,
                width: 612.0,
                height: 792.0,
                text: String::new(),
            })
            .collect(),
        spans,
    }
}

fn bench_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("tier_assign");

    for count in [100, 1_000, 10_000] {
        let sizes = font_sizes(count, 42);

        group.bench_with_input(BenchmarkId::new("kmeans", count), &sizes, |b, sizes| {
            let strategy = KMeansTiers::default();
            b.iter(|| black_box(strategy.assign(black_box(sizes))));
        });

        group.bench_with_input(BenchmarkId::new("gaps", count), &sizes, |b, sizes| {
            let strategy = GapTiers::default();
            b.iter(|| black_box(strategy.assign(black_box(sizes))));
        });
    }

    group.finish();
}

fn bench_detect(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect_headings");
    let detector = HeadingDetector::default();

    for pages in [10u32, 50] {
        let doc = synthetic_document(40, pages);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{pages}_pages")), &doc, |b, doc| {
            b.iter(|| black_box(detector.detect(black_box(doc))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_strategies, bench_detect);
criterion_main!(benches);
