use std::sync::Arc;
use std::time::SystemTime;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use bw_compiler::{compile, CompileConfig};
use bw_core::types::{ContentType, FilterCategory, InstallationState};
use bw_core::{CompiledIndex, InstalledSubscription, SubscriptionCollection};

/// Synthetic list mixing host-anchored, path, regex and domain-scoped filters.
fn synthetic_list(filters: usize) -> String {
    let mut text = String::from("[Adblock Plus 2.0]\n! Title: Synthetic\n");
    for i in 0..filters {
        let line = match i % 5 {
            0 => format!("||ads{i}.example.com^\n"),
            1 => format!("/banner{i}/*$image\n"),
            2 => format!("||tracker{i}.net^$script,third-party\n"),
            3 => format!("/pixel{i}[0-9]+/\n"),
            _ => format!("||cdn{i}.org/ads^$domain=site{i}.com|~sub.site{i}.com\n"),
        };
        text.push_str(&line);
    }
    text.push_str("@@||ads0.example.com/allowed^\n");
    text
}

fn install(filters: usize) -> Arc<InstalledSubscription> {
    let config = CompileConfig {
        source_url: "https://bench.test/list.txt".to_owned(),
        ..CompileConfig::default()
    };
    let bytes = compile(&synthetic_list(filters), &config)
        .index()
        .expect("synthetic list should compile");
    let index = CompiledIndex::from_bytes(bytes).expect("snapshot should load");
    Arc::new(InstalledSubscription::new(
        Arc::new(index),
        InstallationState::Installed,
        SystemTime::UNIX_EPOCH,
    ))
}

const URLS: &[&str] = &[
    "https://ads10.example.com/slot.js",
    "https://www.news.test/article/2024/story.html",
    "https://tracker12.net/collect?id=abc",
    "https://static.cdn.test/img/banner21/x.png",
    "https://cdn14.org/ads/frame.html",
];

fn bench_has_url_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("has_url_filter");
    group.throughput(Throughput::Elements(URLS.len() as u64));

    for filters in [1_000usize, 10_000, 50_000] {
        let subscription = install(filters);
        group.bench_with_input(BenchmarkId::from_parameter(filters), &subscription, |b, subscription| {
            b.iter(|| {
                for url in URLS {
                    black_box(subscription.has_url_filter(
                        black_box(url),
                        "news.test",
                        ContentType::SCRIPT,
                        "",
                        FilterCategory::Blocking,
                    ));
                }
            })
        });
    }
    group.finish();
}

fn bench_classify_request(c: &mut Criterion) {
    let collection = SubscriptionCollection::new(vec![install(10_000)], "bench");
    let hierarchy = ["https://www.news.test/"];

    c.bench_function("classify_request/10000", |b| {
        b.iter(|| {
            for url in URLS {
                black_box(collection.classify_request(black_box(url), &hierarchy, ContentType::IMAGE, ""));
            }
        })
    });
}

fn bench_compile(c: &mut Criterion) {
    let text = synthetic_list(10_000);
    let config = CompileConfig::new("https://bench.test/list.txt");

    let mut group = c.benchmark_group("compile");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.sample_size(20);
    group.bench_function("10000", |b| b.iter(|| black_box(compile(black_box(&text), &config))));
    group.finish();
}

criterion_group!(benches, bench_has_url_filter, bench_classify_request, bench_compile);
criterion_main!(benches);
