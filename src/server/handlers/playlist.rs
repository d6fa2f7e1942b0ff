use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use m3u8_rs::Playlist;
use tracing::{info, warn};

use crate::beacon::BeaconMetadata;
use crate::coordinator::{InsertionMode, ViewerContext};
use crate::decision::VariantType;
use crate::error::{CoreError, Result};
use crate::hls::cue::AdBreak;
use crate::hls::window::ManifestWindow;
use crate::hls::{cue, parser, sgai, ssai};
use crate::metrics;
use crate::scte35::signal::{Scte35Signal, SignalSource};
use crate::server::state::AppState;
use crate::server::url_validation::validate_origin_url;

/// Used when neither a `bitrate` query override nor the variant's own
/// encoded rendition is available (shouldn't happen once a viewer has gone
/// through the master playlist rewrite, but a request can always arrive
/// without one).
const DEFAULT_VIEWER_BITRATE_BPS: u32 = 2_000_000;

/// §6.1 window-bucketing width for `Cache-Control`/ETag uniformity.
const CACHE_WINDOW_SECS: u64 = 2;
const SEGMENT_CACHE_MAX_AGE: u64 = 60;

/// Overall CPU budget for a single viewer request (§5 cancellation): past
/// this, the coordinator returns the unmodified origin playlist rather than
/// a partial rewrite.
const REWRITE_DEADLINE: Duration = Duration::from_millis(300);

fn requested_mode(params: &HashMap<String, String>) -> Option<InsertionMode> {
    params
        .get("force")
        .or_else(|| params.get("mode"))
        .and_then(|v| match v.as_str() {
            "ssai" => Some(InsertionMode::Ssai),
            "sgai" => Some(InsertionMode::Sgai),
            _ => None,
        })
}

fn viewer_bitrate_bps(params: &HashMap<String, String>) -> u32 {
    params.get("bitrate").and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_VIEWER_BITRATE_BPS)
}

fn variant_type(params: &HashMap<String, String>) -> VariantType {
    match params.get("track").map(|s| s.as_str()) {
        Some("audio") => VariantType::AudioOnly,
        _ => VariantType::Video,
    }
}

/// Feature-detects an Apple-platform client from its User-Agent, the
/// fallback step of §4.4's insertion-mode priority chain. Apple markers
/// (CFNetwork, AppleCoreMedia, native iOS/Safari UA strings) lose to an
/// explicit hls.js or WebView marker, since those players run on Apple
/// hardware too but need SSAI.
fn is_apple_like(user_agent: &str) -> bool {
    let ua = user_agent.to_lowercase();
    let apple_markers = ua.contains("cfnetwork")
        || ua.contains("applecoremedia")
        || ua.contains("iphone")
        || ua.contains("ipad")
        || (ua.contains("macintosh") && ua.contains("safari") && !ua.contains("chrome"));
    let non_apple_markers = ua.contains("hls.js") || ua.contains("; wv)") || ua.contains("android");
    apple_markers && !non_apple_markers
}

fn cache_bucket(now: SystemTime) -> u64 {
    let secs = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    (secs / CACHE_WINDOW_SECS) * CACHE_WINDOW_SECS
}

/// Builds an `AdBreak` anchored at the start of the current window for cue
/// sources that don't carry a detected splice point of their own (manual cue,
/// time schedule). SCTE-35 breaks always have a real entry in `ad_breaks`;
/// this is only reached for the other two sources.
fn synthetic_ad_break(break_id: &str, duration_seconds: f64, segment_count: usize) -> AdBreak {
    AdBreak {
        start_index: 0,
        end_index: segment_count.min(1),
        duration: duration_seconds,
        signal: Scte35Signal {
            event_id: break_id.to_string(),
            is_start: true,
            duration_seconds: Some(duration_seconds),
            segmentation_type_id: None,
            source: SignalSource::Attribute,
            section: None,
            crc_warning: false,
        },
    }
}

fn playlist_response(body: String, etag_key: &str, bucket: u64, max_age: u64) -> Response {
    let etag = format!("\"{etag_key}-{bucket}\"");
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/vnd.apple.mpegurl".to_string()),
            (header::CACHE_CONTROL, format!("max-age={max_age}")),
            (header::ETAG, etag),
        ],
        body,
    )
        .into_response()
}

/// `GET /{org_slug}/{channel_slug}/{variant}.m3u8` (§6.1): the core viewer
/// entry point. Master playlists only get their variant URIs rewritten;
/// media playlists go through the full reconcile → rewrite → beacon
/// pipeline.
pub async fn serve_playlist(
    Path((org_slug, channel_slug, _variant)): Path<(String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Response> {
    let start = Instant::now();
    info!(org_slug, channel_slug, "serving playlist");

    let channel = state
        .channel_source
        .get(&org_slug, &channel_slug)
        .ok_or_else(|| CoreError::InvalidChannel(format!("{org_slug}/{channel_slug}")))?;

    let origin_url = match params.get("origin") {
        Some(origin) => {
            validate_origin_url(origin)?;
            origin.clone()
        }
        None => channel.origin_url.clone(),
    };

    info!(origin_url, "fetching playlist from origin");

    let response = state.http_client.get(&origin_url).send().await.map_err(|e| {
        metrics::record_origin_error();
        CoreError::OriginFetchError(e)
    })?;

    if !response.status().is_success() {
        metrics::record_origin_error();
        metrics::record_request("playlist", 502);
        metrics::record_duration("playlist", start);
        return Err(CoreError::OriginFetchError(response.error_for_status().unwrap_err()));
    }

    let content = response.text().await?;
    let playlist = parser::parse_hls_playlist(&content)?;
    let origin_base = origin_url.rsplit_once('/').map(|(base, _)| base).unwrap_or(&origin_url).to_string();
    let now = SystemTime::now();
    let bucket = cache_bucket(now);

    if matches!(&playlist, Playlist::MasterPlaylist(_)) {
        info!("processing master playlist, rewriting variant URLs");
        let rewritten = parser::rewrite_master_urls(playlist, &org_slug, &channel_slug, &state.config.base_url, &origin_base)?;
        let body = parser::serialize_playlist(rewritten)?;

        metrics::record_request("playlist", 200);
        metrics::record_duration("playlist", start);
        return Ok(playlist_response(body, "master", bucket, 1));
    }

    let Playlist::MediaPlaylist(mut media_playlist) = playlist else {
        return Err(CoreError::PlaylistParseError("playlist is neither master nor media".to_string()));
    };

    let window = ManifestWindow::build(&content, &media_playlist);
    let ad_breaks = cue::detect_ad_breaks(&media_playlist);
    if !ad_breaks.is_empty() {
        metrics::record_ad_breaks(ad_breaks.len());
    }

    let client_is_apple_like =
        headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok()).map(is_apple_like).unwrap_or(false);
    let bitrate_bps = viewer_bitrate_bps(&params);
    let v_type = variant_type(&params);

    let viewer = ViewerContext {
        viewer_bitrate_bps: bitrate_bps,
        variant_type: v_type,
        requested_mode: requested_mode(&params),
        client_is_apple_like,
    };

    let outcome = match tokio::time::timeout(
        REWRITE_DEADLINE,
        state.coordinator.reconcile(&channel, &ad_breaks, None, &viewer, now),
    )
    .await
    {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            warn!(channel = %org_slug, error = %e, "coordinator reconcile failed, passing through");
            None
        }
        Err(_) => {
            metrics::record_state_conflict();
            warn!(channel = %org_slug, "rewrite deadline exceeded, passing through");
            None
        }
    };

    let mut etag_key = "idle".to_string();

    if let Some(outcome) = outcome {
        etag_key = outcome.break_id.clone();
        let ad_break = ad_breaks
            .iter()
            .find(|b| b.signal.event_id == outcome.break_id)
            .cloned()
            .unwrap_or_else(|| synthetic_ad_break(&outcome.break_id, outcome.duration_seconds, media_playlist.segments.len()));

        let mut inserted = true;
        match outcome.mode {
            InsertionMode::Ssai => {
                match ssai::rewrite(&mut media_playlist, &window, &ad_break, &outcome, bitrate_bps, v_type) {
                    Ok(result) => {
                        state.coordinator.commit_skip_count(&outcome.channel_key, &outcome.break_id, result.skipped).await;
                    }
                    Err(e) => {
                        warn!(channel = %outcome.channel_key, break_id = %outcome.break_id, error = %e, "ssai rewrite failed, falling back to sgai");
                        let before = media_playlist.segments.iter().filter(|s| s.daterange.is_some()).count();
                        sgai::inject_interstitial(
                            &mut media_playlist,
                            &ad_break,
                            &outcome,
                            bitrate_bps,
                            v_type,
                            channel.signing_host.as_deref(),
                            None,
                        );
                        let after = media_playlist.segments.iter().filter(|s| s.daterange.is_some()).count();
                        inserted = after > before;
                    }
                }
            }
            InsertionMode::Sgai => {
                let before = media_playlist.segments.iter().filter(|s| s.daterange.is_some()).count();
                sgai::inject_interstitial(
                    &mut media_playlist,
                    &ad_break,
                    &outcome,
                    bitrate_bps,
                    v_type,
                    channel.signing_host.as_deref(),
                    None,
                );
                let after = media_playlist.segments.iter().filter(|s| s.daterange.is_some()).count();
                inserted = after > before;
            }
        }

        if inserted {
            let metadata = BeaconMetadata {
                bitrate_bps: Some(bitrate_bps),
                variant: Some(_variant.clone()),
                user_agent: headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok()).map(|s| s.to_string()),
                session_hint: None,
            };
            if let Some(msg) = crate::beacon::impression_message(&outcome.pod.tracking, &outcome.pod.pod_id, &outcome.channel_key, metadata) {
                state.beacon.enqueue(msg);
            }
        } else {
            warn!(channel = %outcome.channel_key, break_id = %outcome.break_id, "insertion produced no change, serving pass-through");
            let metadata = BeaconMetadata::default();
            if let Some(msg) = crate::beacon::error_message(&outcome.pod.tracking, &outcome.pod.pod_id, &outcome.channel_key, metadata) {
                state.beacon.enqueue(msg);
            }
        }
    }

    let rewritten = parser::rewrite_content_urls(
        Playlist::MediaPlaylist(media_playlist),
        &org_slug,
        &channel_slug,
        &state.config.base_url,
        &origin_base,
    )?;
    let body = parser::serialize_playlist(rewritten)?;

    metrics::record_request("playlist", 200);
    metrics::record_duration("playlist", start);
    metrics::set_active_channels(state.coordinator.active_channel_count());

    Ok(playlist_response(body, &etag_key, bucket, channel.default_ad_duration_sec.clamp(1.0, 10.0) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apple_like_detects_native_ios_player() {
        assert!(is_apple_like("AppleCoreMedia/1.0.0.21A5326a (iPhone; U; CPU OS 17_0 like Mac OS X)"));
    }

    #[test]
    fn apple_like_excludes_hls_js_on_macos() {
        assert!(!is_apple_like("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15) AppleWebKit/605.1.15 hls.js/1.5.0"));
    }

    #[test]
    fn apple_like_excludes_android_webview() {
        assert!(!is_apple_like("Mozilla/5.0 (Linux; Android 14; wv) AppleWebKit/537.36"));
    }

    #[test]
    fn cache_bucket_rounds_down_to_even_second() {
        assert_eq!(cache_bucket(UNIX_EPOCH + Duration::from_secs(1001)), 1000);
        assert_eq!(cache_bucket(UNIX_EPOCH + Duration::from_secs(1000)), 1000);
    }

    #[test]
    fn requested_mode_prefers_force_over_mode() {
        let mut params = HashMap::new();
        params.insert("force".to_string(), "sgai".to_string());
        params.insert("mode".to_string(), "ssai".to_string());
        assert_eq!(requested_mode(&params), Some(InsertionMode::Sgai));
    }
}
