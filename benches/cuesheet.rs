//! Benchmarks for cue sheet rendering and slug sanitizing.
//!
//! Cue sheets are rendered once per export, but long sets (hundreds of
//! tracks) should stay well under a millisecond.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mv_core::{slugify, CueSheetEntry, MixDescriptors, VideoId};
use mv_export::cuesheet;

fn entries(n: usize) -> Vec<CueSheetEntry> {
    let mut clock = 0.0;
    (0..n)
        .map(|i| {
            let duration = 180.0 + (i % 7) as f64 * 13.25;
            let entry = CueSheetEntry {
                index: i + 1,
                video_id: VideoId(i as i64 + 1),
                title: format!("Track \"{i}\" (Extended Mix)"),
                description: None,
                start_time_secs: clock,
                end_time_secs: clock + duration,
                duration_secs: duration,
                file_name: format!("videos/{:02}_track-{i}.mp4", i + 1),
            };
            clock += duration;
            entry
        })
        .collect()
}

fn bench_render(c: &mut Criterion) {
    let descriptors = MixDescriptors {
        bpm: Some(126.0),
        key: Some("8A".into()),
        genre: Some("Tech House".into()),
        notes: None,
    };

    let mut group = c.benchmark_group("cuesheet_render");
    for n in [10usize, 100, 500] {
        let list = entries(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &list, |b, list| {
            b.iter(|| {
                cuesheet::render(
                    black_box("Friday Warmup"),
                    black_box("friday-warmup.mp4"),
                    black_box(list),
                    &descriptors,
                )
            })
        });
    }
    group.finish();
}

fn bench_timestamps(c: &mut Criterion) {
    c.bench_function("format_timestamp", |b| {
        b.iter(|| {
            for s in 0..1000 {
                black_box(cuesheet::format_timestamp(black_box(s as f64 * 1.37)));
            }
        })
    });
}

fn bench_slugify(c: &mut Criterion) {
    let mut group = c.benchmark_group("slugify");
    for title in [
        "Opener",
        "Peak Time -- Live @ Warehouse (2024 Edit)",
        "Ünïcödé   Tïtlé with ***lots*** of    punctuation!!!",
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(title.len()), title, |b, t| {
            b.iter(|| slugify(black_box(t), "track"))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_render, bench_timestamps, bench_slugify);
criterion_main!(benches);
