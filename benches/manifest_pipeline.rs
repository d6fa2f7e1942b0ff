//! Benchmarks for the live manifest stitching pipeline.
//!
//! Exercises the hot path: parse -> build window -> detect cue breaks ->
//! reconcile -> splice -> rewrite URLs -> serialize. This runs for every
//! viewer's playlist request, on a cadence set by the segment duration
//! (~6s), so 10,000 concurrent viewers means ~1,667 pipeline executions/sec.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use cuepoint::coordinator::{CoordinationOutcome, InsertionMode};
use cuepoint::decision::{AdPod, AdPodItem, PodSource, PodTracking, VariantType};
use cuepoint::hls::cue;
use cuepoint::hls::parser;
use cuepoint::hls::ssai;
use cuepoint::hls::window::ManifestWindow;
use m3u8_rs::Playlist;

/// A realistic live HLS media playlist with SCTE-35 CUE-OUT/CUE-OUT-CONT/
/// CUE-IN markers over a sliding window.
fn generate_playlist(segment_count: usize, ad_break_count: usize, ad_break_duration: f32) -> String {
    let mut lines = vec![
        "#EXTM3U".to_string(),
        "#EXT-X-VERSION:7".to_string(),
        "#EXT-X-TARGETDURATION:6".to_string(),
        "#EXT-X-MEDIA-SEQUENCE:1000".to_string(),
        "#EXT-X-PROGRAM-DATE-TIME:2026-07-27T10:00:00.000Z".to_string(),
    ];

    let segments_per_ad_break = (ad_break_duration / 6.0).ceil() as usize;
    let total_ad_segments: usize = ad_break_count * segments_per_ad_break;
    let content_segments = segment_count.saturating_sub(total_ad_segments);
    let content_between_breaks =
        if ad_break_count > 0 { content_segments / (ad_break_count + 1) } else { content_segments };

    let mut seg_num = 0;
    for break_idx in 0..=ad_break_count {
        let count = if break_idx < ad_break_count {
            content_between_breaks
        } else {
            content_segments - (content_between_breaks * ad_break_count)
        };

        for _ in 0..count {
            lines.push("#EXTINF:6.006,".to_string());
            lines.push(format!("https://cdn.example.com/stream/segment_{}.ts", seg_num));
            seg_num += 1;
        }

        if break_idx < ad_break_count {
            lines.push(format!("#EXT-X-CUE-OUT:{}", ad_break_duration));
            lines.push("#EXTINF:6.006,".to_string());
            lines.push(format!("https://cdn.example.com/stream/segment_{}.ts", seg_num));
            seg_num += 1;

            for cont_idx in 1..segments_per_ad_break.saturating_sub(1) {
                let elapsed = (cont_idx as f32 + 1.0) * 6.0;
                lines.push(format!("#EXT-X-CUE-OUT-CONT:{}/{}", elapsed, ad_break_duration));
                lines.push("#EXTINF:6.006,".to_string());
                lines.push(format!("https://cdn.example.com/stream/segment_{}.ts", seg_num));
                seg_num += 1;
            }

            lines.push("#EXT-X-CUE-IN".to_string());
            lines.push("#EXTINF:6.006,".to_string());
            lines.push(format!("https://cdn.example.com/stream/segment_{}.ts", seg_num));
            seg_num += 1;
        }
    }

    lines.join("\n") + "\n"
}

fn generate_master_playlist(variant_count: usize) -> String {
    let mut lines = vec!["#EXTM3U".to_string()];

    let resolutions = [
        ("426x240", 400_000),
        ("640x360", 800_000),
        ("854x480", 1_400_000),
        ("1280x720", 2_800_000),
        ("1920x1080", 5_000_000),
        ("2560x1440", 8_000_000),
        ("3840x2160", 14_000_000),
    ];

    for i in 0..variant_count {
        let (res, bw) = resolutions[i % resolutions.len()];
        lines.push(format!("#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}", bw, res));
        lines.push(format!("variant_{}/playlist.m3u8", i));
    }

    lines.join("\n") + "\n"
}

/// A single-rendition ad pod whose one item covers the whole break duration,
/// same shape a pod-store descriptor resolves to.
fn generate_pod(duration_seconds: f64) -> AdPod {
    AdPod {
        pod_id: "bench-pod".to_string(),
        items: vec![AdPodItem {
            uri: "https://ads.example.com/bench-pod/video.ts".to_string(),
            bitrate_bps: 2_000_000,
            is_audio_only: false,
            duration_seconds,
        }],
        tracking: PodTracking::default(),
        source: PodSource::ObjectStore,
    }
}

fn outcome_for(break_id: &str, pod: AdPod, duration_seconds: f64) -> CoordinationOutcome {
    CoordinationOutcome {
        channel_key: "bench/bench".to_string(),
        break_id: break_id.to_string(),
        mode: InsertionMode::Ssai,
        pod,
        duration_seconds,
        content_segments_to_skip: None,
    }
}

// ── Benchmarks ──────────────────────────────────────────────────────

fn bench_parse_playlist(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_playlist");

    for segment_count in [6, 12, 30, 60] {
        let playlist_str = generate_playlist(segment_count, 1, 30.0);

        group.bench_with_input(BenchmarkId::new("segments", segment_count), &playlist_str, |b, input| {
            b.iter(|| {
                parser::parse_hls_playlist(black_box(input)).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_detect_cue_breaks(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect_cue_breaks");

    for (ad_breaks, label) in [(1, "1_break"), (3, "3_breaks"), (5, "5_breaks")] {
        let playlist_str = generate_playlist(30, ad_breaks, 30.0);
        let parsed = parser::parse_hls_playlist(&playlist_str).unwrap();
        let media = match parsed {
            Playlist::MediaPlaylist(mp) => mp,
            _ => panic!("Expected MediaPlaylist"),
        };

        group.bench_with_input(BenchmarkId::new("ad_breaks", label), &media, |b, input| {
            b.iter(|| {
                cue::detect_ad_breaks(black_box(input));
            });
        });
    }

    group.finish();
}

fn bench_build_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_window");

    for segment_count in [6, 30, 60] {
        let playlist_str = generate_playlist(segment_count, 1, 30.0);
        let parsed = parser::parse_hls_playlist(&playlist_str).unwrap();
        let media = match parsed {
            Playlist::MediaPlaylist(mp) => mp,
            _ => panic!("Expected MediaPlaylist"),
        };

        group.bench_with_input(
            BenchmarkId::new("segments", segment_count),
            &(playlist_str.clone(), media),
            |b, (raw, media)| {
                b.iter(|| {
                    ManifestWindow::build(black_box(raw), black_box(media));
                });
            },
        );
    }

    group.finish();
}

/// Splice an ad pod into the break window, the SSAI Rewriter's actual hot
/// path for every subsequent request of the same break.
fn bench_ssai_rewrite(c: &mut Criterion) {
    let mut group = c.benchmark_group("ssai_rewrite");

    for (ad_breaks, label) in [(1, "1_break"), (3, "3_breaks")] {
        let playlist_str = generate_playlist(30, ad_breaks, 30.0);
        let parsed = parser::parse_hls_playlist(&playlist_str).unwrap();
        let media = match parsed {
            Playlist::MediaPlaylist(mp) => mp,
            _ => panic!("Expected MediaPlaylist"),
        };
        let window = ManifestWindow::build(&playlist_str, &media);
        let breaks = cue::detect_ad_breaks(&media);
        let ad_break = breaks.first().cloned().unwrap();
        let pod = generate_pod(ad_break.duration);
        let outcome = outcome_for("bench-break", pod, ad_break.duration);

        group.bench_with_input(
            BenchmarkId::new("ad_breaks", label),
            &(media, window, ad_break, outcome),
            |b, (media, window, ad_break, outcome)| {
                b.iter(|| {
                    let mut media = media.clone();
                    ssai::rewrite(
                        black_box(&mut media),
                        black_box(window),
                        black_box(ad_break),
                        black_box(outcome),
                        2_000_000,
                        VariantType::Video,
                    )
                    .unwrap();
                });
            },
        );
    }

    group.finish();
}

fn bench_rewrite_urls(c: &mut Criterion) {
    let mut group = c.benchmark_group("rewrite_urls");

    for segment_count in [6, 30, 60] {
        let playlist_str = generate_playlist(segment_count, 0, 0.0);
        let parsed = parser::parse_hls_playlist(&playlist_str).unwrap();

        group.bench_with_input(BenchmarkId::new("segments", segment_count), &parsed, |b, input| {
            b.iter(|| {
                parser::rewrite_content_urls(
                    black_box(input.clone()),
                    "bench",
                    "bench",
                    "http://stitcher.example.com",
                    "https://cdn.example.com/stream",
                )
                .unwrap();
            });
        });
    }

    group.finish();
}

fn bench_rewrite_master(c: &mut Criterion) {
    let mut group = c.benchmark_group("rewrite_master");

    for variant_count in [3, 5, 7] {
        let playlist_str = generate_master_playlist(variant_count);
        let parsed = parser::parse_hls_playlist(&playlist_str).unwrap();

        group.bench_with_input(BenchmarkId::new("variants", variant_count), &parsed, |b, input| {
            b.iter(|| {
                parser::rewrite_master_urls(
                    black_box(input.clone()),
                    "bench",
                    "bench",
                    "http://stitcher.example.com",
                    "https://cdn.example.com/stream",
                )
                .unwrap();
            });
        });
    }

    group.finish();
}

fn bench_serialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialize_playlist");

    for segment_count in [6, 30, 60] {
        let playlist_str = generate_playlist(segment_count, 1, 30.0);
        let parsed = parser::parse_hls_playlist(&playlist_str).unwrap();

        group.bench_with_input(BenchmarkId::new("segments", segment_count), &parsed, |b, input| {
            b.iter(|| {
                parser::serialize_playlist(black_box(input.clone())).unwrap();
            });
        });
    }

    group.finish();
}

/// THE critical benchmark: everything a viewer's playlist request does,
/// short of the network fetch and the decision waterfall (both already
/// resolved by the time this runs, the second time a break is seen).
fn bench_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_pipeline");

    let scenarios = [
        ("6seg_1break", 6, 1, 30.0),
        ("15seg_1break", 15, 1, 30.0),
        ("60seg_3breaks", 60, 3, 30.0),
        ("12seg_0breaks", 12, 0, 0.0),
    ];

    for (label, segment_count, ad_break_count, ad_break_duration) in scenarios {
        let playlist_str = generate_playlist(segment_count, ad_break_count, ad_break_duration);

        group.bench_with_input(BenchmarkId::new("scenario", label), &playlist_str, |b, input| {
            b.iter(|| {
                full_pipeline(black_box(input));
            });
        });
    }

    group.finish();
}

fn full_pipeline(playlist_str: &str) -> String {
    let playlist = parser::parse_hls_playlist(playlist_str).unwrap();

    let Playlist::MediaPlaylist(mut media) = playlist else {
        return parser::serialize_playlist(playlist).unwrap();
    };

    let window = ManifestWindow::build(playlist_str, &media);
    let ad_breaks = cue::detect_ad_breaks(&media);

    if let Some(ad_break) = ad_breaks.first() {
        let pod = generate_pod(ad_break.duration);
        let outcome = outcome_for("bench-break", pod, ad_break.duration);
        let _ = ssai::rewrite(&mut media, &window, ad_break, &outcome, 2_000_000, VariantType::Video);
    }

    let playlist = Playlist::MediaPlaylist(media);
    let rewritten = parser::rewrite_content_urls(
        playlist,
        "bench",
        "bench",
        "http://stitcher.example.com",
        "https://cdn.example.com/stream",
    )
    .unwrap();

    parser::serialize_playlist(rewritten).unwrap()
}

criterion_group!(
    benches,
    bench_parse_playlist,
    bench_detect_cue_breaks,
    bench_build_window,
    bench_ssai_rewrite,
    bench_rewrite_urls,
    bench_rewrite_master,
    bench_serialize,
    bench_full_pipeline,
);
criterion_main!(benches);
