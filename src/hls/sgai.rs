//! Server-Guided Ad Insertion: `EXT-X-DATERANGE` interstitial injection.
//!
//! Grounded on the teacher's own `interstitial.rs` (PDT synthesis, DateRange
//! construction, CUE tag stripping) but reworked: the DateRange carries
//! `X-ASSET-URI` pointing straight at the bitrate-matched ad rendition
//! playlist chosen server-side, not an `X-ASSET-LIST` indirection the player
//! would have to resolve itself. A companion `#EXT-X-CUE-OUT`/`CUE-IN` pair
//! is emitted alongside the DateRange for players that only understand the
//! legacy markers.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, TimeZone};
use m3u8_rs::{DateRange, ExtTag, MediaPlaylist, QuotedOrUnquoted};
use tracing::info;

use crate::coordinator::CoordinationOutcome;
use crate::decision::VariantType;
use crate::hls::cue::AdBreak;

/// Synthetic base time used when the origin playlist has no
/// `EXT-X-PROGRAM-DATE-TIME`. DateRange `START-DATE` is interpreted relative
/// to the PDT timeline, so one must exist before injection.
fn synthetic_base_time() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .expect("UTC offset is valid")
        .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
        .single()
        .expect("2026-01-01 00:00:00 is a valid datetime")
}

/// Assigns synthetic PDTs, accumulating segment durations, if the playlist
/// carries none at all. A no-op when any segment already has one.
pub fn ensure_program_date_time(playlist: &mut MediaPlaylist) {
    let has_pdt = playlist.segments.iter().any(|s| s.program_date_time.is_some());
    if has_pdt {
        return;
    }

    info!("sgai: no EXT-X-PROGRAM-DATE-TIME found, synthesizing from epoch");

    let base = synthetic_base_time();
    let mut offset_ms: i64 = 0;
    for seg in playlist.segments.iter_mut() {
        seg.program_date_time = Some(base + chrono::Duration::milliseconds(offset_ms));
        offset_ms += (seg.duration * 1000.0) as i64;
    }
}

/// Walks forward from the nearest preceding PDT anchor to compute the PDT of
/// `target_index`. `None` only if nothing at or before it has PDT set.
pub fn compute_pdt_at(playlist: &MediaPlaylist, target_index: usize) -> Option<DateTime<FixedOffset>> {
    let (anchor_index, anchor_pdt) = playlist
        .segments
        .iter()
        .enumerate()
        .take(target_index + 1)
        .filter_map(|(i, seg)| seg.program_date_time.map(|pdt| (i, pdt)))
        .next_back()?;

    let offset_ms: i64 =
        playlist.segments[anchor_index..target_index].iter().map(|s| (s.duration * 1000.0) as i64).sum();

    Some(anchor_pdt + chrono::Duration::milliseconds(offset_ms))
}

/// Signs (or in the absence of a signing host, passes through) an ad
/// rendition URI for direct client fetch.
fn sign_asset_uri(signing_host: Option<&str>, rendition_uri: &str) -> String {
    match signing_host {
        Some(host) => format!("{}/sign?url={}", host.trim_end_matches('/'), urlencoding_minimal(rendition_uri)),
        None => rendition_uri.to_string(),
    }
}

/// Minimal percent-encoding for the one query value we build ourselves;
/// avoids pulling in a dedicated URL-encoding dependency for a single call
/// site (`url::Url` has no standalone query-component encoder).
fn urlencoding_minimal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// Injects a single interstitial DateRange (plus a companion CUE-OUT/IN
/// pair) for the one ad break the coordinator currently has a decision for.
/// Other breaks detected in the same window are left untouched — the
/// coordinator's state machine tracks exactly one break per channel at a
/// time, so there is never a second decision to attach.
///
/// `previous_announced_duration_seconds`, when the same break id was already
/// surfaced in an earlier request, prevents the DateRange's duration from
/// ever shrinking mid-break (§4.2).
pub fn inject_interstitial(
    playlist: &mut MediaPlaylist,
    ad_break: &AdBreak,
    outcome: &CoordinationOutcome,
    viewer_bitrate_bps: u32,
    variant_type: VariantType,
    signing_host: Option<&str>,
    previous_announced_duration_seconds: Option<f64>,
) {
    let start_index = ad_break.start_index;
    if start_index >= playlist.segments.len() {
        return;
    }

    let Some(start_date) = compute_pdt_at(playlist, start_index) else {
        info!(segment = start_index, "sgai: no PDT available, skipping interstitial injection");
        return;
    };

    let audio_only = matches!(variant_type, VariantType::AudioOnly);
    let rendition_uri = outcome
        .pod
        .select_rendition(viewer_bitrate_bps, audio_only)
        .map(|item| item.uri.clone())
        .unwrap_or_else(|| outcome.pod.items.first().map(|i| i.uri.clone()).unwrap_or_default());

    let asset_uri = sign_asset_uri(signing_host, &rendition_uri);

    let duration = previous_announced_duration_seconds
        .map(|prev| prev.max(outcome.duration_seconds))
        .unwrap_or(outcome.duration_seconds);

    let mut x_prefixed = HashMap::new();
    x_prefixed.insert("X-ASSET-URI".to_string(), QuotedOrUnquoted::Quoted(asset_uri));
    x_prefixed.insert("X-RESUME-OFFSET".to_string(), QuotedOrUnquoted::Unquoted("0".to_string()));
    x_prefixed.insert("X-RESTRICT".to_string(), QuotedOrUnquoted::Quoted("SKIP,JUMP".to_string()));
    x_prefixed.insert(
        "X-PLAYOUT-LIMIT".to_string(),
        QuotedOrUnquoted::Unquoted(format!("{}", duration.ceil() as u64)),
    );

    let daterange = DateRange {
        id: outcome.break_id.clone(),
        class: Some("com.apple.hls.interstitial".to_string()),
        start_date,
        end_date: None,
        duration: Some(duration),
        planned_duration: None,
        x_prefixed: Some(x_prefixed),
        end_on_next: false,
        other_attributes: None,
    };

    playlist.segments[start_index].daterange = Some(daterange);

    // Companion CUE-OUT/IN pair for players that don't parse interstitials.
    playlist.segments[start_index]
        .unknown_tags
        .push(ExtTag { tag: "X-CUE-OUT".to_string(), rest: Some(format!("{duration}")) });
    if ad_break.end_index > 0 && ad_break.end_index <= playlist.segments.len() {
        let cue_in_index = ad_break.end_index - 1;
        playlist.segments[cue_in_index].unknown_tags.push(ExtTag { tag: "X-CUE-IN".to_string(), rest: None });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::InsertionMode;
    use crate::decision::{AdPod, AdPodItem, PodSource, PodTracking};
    use crate::scte35::signal::{Scte35Signal, SignalSource};
    use m3u8_rs::MediaSegment;

    fn segment(duration: f32) -> MediaSegment {
        MediaSegment { uri: "seg.ts".to_string(), duration, ..Default::default() }
    }

    fn ad_break() -> AdBreak {
        AdBreak {
            start_index: 1,
            end_index: 3,
            duration: 30.0,
            signal: Scte35Signal {
                event_id: "brk-1".to_string(),
                is_start: true,
                duration_seconds: Some(30.0),
                segmentation_type_id: None,
                source: SignalSource::Attribute,
                section: None,
                crc_warning: false,
            },
        }
    }

    fn outcome() -> CoordinationOutcome {
        CoordinationOutcome {
            channel_key: "demo:demo".to_string(),
            break_id: "brk-1".to_string(),
            mode: InsertionMode::Sgai,
            pod: AdPod {
                pod_id: "p1".to_string(),
                items: vec![AdPodItem {
                    uri: "https://ads.example.com/p1/seg.m3u8".to_string(),
                    bitrate_bps: 1_500_000,
                    is_audio_only: false,
                    duration_seconds: 30.0,
                }],
                tracking: PodTracking::default(),
                source: PodSource::Slate,
            },
            duration_seconds: 30.0,
            content_segments_to_skip: None,
        }
    }

    #[test]
    fn injects_daterange_with_asset_uri_and_cue_pair() {
        let mut playlist = MediaPlaylist {
            segments: vec![segment(10.0), segment(10.0), segment(10.0), segment(10.0)],
            ..Default::default()
        };
        ensure_program_date_time(&mut playlist);

        inject_interstitial(&mut playlist, &ad_break(), &outcome(), 2_000_000, VariantType::Video, None, None);

        let dr = playlist.segments[1].daterange.as_ref().unwrap();
        assert_eq!(dr.id, "brk-1");
        assert_eq!(dr.duration, Some(30.0));
        let asset = dr.x_prefixed.as_ref().unwrap().get("X-ASSET-URI").unwrap();
        assert_eq!(asset.as_str(), "https://ads.example.com/p1/seg.m3u8");

        assert!(playlist.segments[1].unknown_tags.iter().any(|t| t.tag == "X-CUE-OUT"));
        assert!(playlist.segments[2].unknown_tags.iter().any(|t| t.tag == "X-CUE-IN"));
    }

    #[test]
    fn duration_never_shrinks_below_previous_announcement() {
        let mut playlist = MediaPlaylist { segments: vec![segment(10.0), segment(10.0), segment(10.0)], ..Default::default() };
        ensure_program_date_time(&mut playlist);

        inject_interstitial(&mut playlist, &ad_break(), &outcome(), 2_000_000, VariantType::Video, None, Some(45.0));

        let dr = playlist.segments[1].daterange.as_ref().unwrap();
        assert_eq!(dr.duration, Some(45.0));
    }

    #[test]
    fn signing_host_wraps_asset_uri() {
        let mut playlist = MediaPlaylist { segments: vec![segment(10.0), segment(10.0), segment(10.0)], ..Default::default() };
        ensure_program_date_time(&mut playlist);

        inject_interstitial(
            &mut playlist,
            &ad_break(),
            &outcome(),
            2_000_000,
            VariantType::Video,
            Some("https://sign.example.com"),
            None,
        );

        let dr = playlist.segments[1].daterange.as_ref().unwrap();
        let asset = dr.x_prefixed.as_ref().unwrap().get("X-ASSET-URI").unwrap();
        assert!(asset.as_str().starts_with("https://sign.example.com/sign?url="));
    }
}
