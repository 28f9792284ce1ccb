//! Benchmark tests for m3u-core operations
//!
//! Run with: cargo bench -p m3u-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use m3u_core::continue_watching::resource_key;
use m3u_core::drm::clearkey_license;
use m3u_core::engine::EngineEvent;
use m3u_core::format::guess_from_url;
use m3u_core::session::SessionMachine;
use m3u_core::*;

// ============================================================================
// Helpers
// ============================================================================

const URLS: &[&str] = &[
    "http://provider.example.com/live/1",
    "http://cdn.example.com/live/channel.m3u8?token=abc",
    "https://cdn.example.com/vod/movie.mpd",
    "http://cdn.example.com/ss/Manifest.ism/manifest",
    "rtsp://camera.local:554/stream1",
    "http://xtream.example.com/series/user/pass/771.mkv",
];

fn malformed() -> EngineEvent {
    EngineEvent::Fault(PlaybackFault::new(
        ErrorCode::ParsingContainerMalformed,
        "bench",
    ))
}

// ============================================================================
// Format search
// ============================================================================

fn bench_url_guess(c: &mut Criterion) {
    let mut group = c.benchmark_group("URL Guess");

    for url in URLS {
        group.bench_with_input(BenchmarkId::new("guess_from_url", url), url, |b, url| {
            b.iter(|| black_box(guess_from_url(black_box(url))));
        });
    }

    group.finish();
}

fn bench_iterator_walk(c: &mut Criterion) {
    let mut group = c.benchmark_group("Format Iterator");

    group.bench_function("walk_default_priority", |b| {
        b.iter(|| {
            let iterator = FormatResolutionIterator::for_url(
                black_box(URLS[1]),
                &DEFAULT_PRIORITY,
                true,
            );
            let mut current = FormatHypothesis::Unspecified(URLS[1].to_string());
            while iterator.has_next(&current) {
                current = iterator.next(&current).unwrap();
            }
            black_box(current)
        });
    });

    group.bench_function("machine_exhaustion", |b| {
        let fault = malformed();
        b.iter(|| {
            let mut machine = SessionMachine::new();
            let iterator = FormatResolutionIterator::new(&DEFAULT_PRIORITY);
            machine.begin(URLS[0], iterator).unwrap();
            machine.installed();
            while machine.last_error().is_none() {
                machine.handle(&fault, ReconnectMode::No).unwrap();
            }
            black_box(machine.attempts())
        });
    });

    group.finish();
}

// ============================================================================
// Pipeline construction
// ============================================================================

fn bench_pipeline_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("Pipeline Build");
    let selector = SourceFactorySelector::default();
    let preferences = PreferenceSnapshot {
        cache_enabled: true,
        ..Default::default()
    };
    let drm = DrmDescriptor::new("widevine", "https://license.example.com/wv");

    for mime in &DEFAULT_PRIORITY {
        let hypothesis = FormatHypothesis::Trying(*mime);
        group.bench_with_input(
            BenchmarkId::new("build", mime.as_str()),
            &hypothesis,
            |b, hypothesis| {
                b.iter(|| {
                    black_box(
                        selector
                            .build(PipelineRequest {
                                url: URLS[0],
                                hypothesis,
                                user_agent: Some("Bench/1.0"),
                                drm: None,
                                preferences: &preferences,
                            })
                            .unwrap(),
                    )
                });
            },
        );
    }

    group.bench_function("build_with_drm", |b| {
        let hypothesis = FormatHypothesis::Trying(MimeType::Dash);
        b.iter(|| {
            black_box(
                selector
                    .build(PipelineRequest {
                        url: URLS[2],
                        hypothesis: &hypothesis,
                        user_agent: None,
                        drm: Some(&drm),
                        preferences: &preferences,
                    })
                    .unwrap(),
            )
        });
    });

    group.finish();
}

// ============================================================================
// DRM / continue watching
// ============================================================================

fn bench_clearkey(c: &mut Criterion) {
    let mut group = c.benchmark_group("ClearKey");

    for pairs in [1usize, 4, 16] {
        let material = (0..pairs)
            .map(|i| format!("{:032x}:{:032x}", i, i + 1000))
            .collect::<Vec<_>>()
            .join(",");
        group.bench_with_input(BenchmarkId::new("hex_to_jwk", pairs), &material, |b, m| {
            b.iter(|| black_box(clearkey_license(black_box(m)).unwrap()));
        });
    }

    group.finish();
}

fn bench_continue_watching(c: &mut Criterion) {
    let mut group = c.benchmark_group("Continue Watching");
    let policy = ContinueWatchingPolicy::default();
    let snapshot = PositionSnapshot {
        supports_media_item: true,
        is_live: false,
        is_seekable: true,
        duration_ms: Some(5_400_000),
        position_ms: 2_000_000,
    };

    group.bench_function("resource_key", |b| {
        b.iter(|| black_box(resource_key(black_box(URLS[5]))));
    });

    group.bench_function("is_resetting_supported", |b| {
        b.iter(|| black_box(policy.is_resetting_supported(black_box(&snapshot))));
    });

    group.finish();
}

criterion_group!(format_benches, bench_url_guess, bench_iterator_walk);

criterion_group!(pipeline_benches, bench_pipeline_build);

criterion_group!(policy_benches, bench_clearkey, bench_continue_watching);

criterion_main!(format_benches, pipeline_benches, policy_benches);
