//! Detects ad-break splice points in a media playlist from whichever cue
//! form the source uses: `EXT-X-DATERANGE` SCTE-35 attributes (preferred),
//! inline `SCTE35-CMD`/`SCTE35-OUT` unknown tags, or legacy
//! `EXT-X-CUE-OUT`/`EXT-X-CUE-IN` markers as a last resort.

use m3u8_rs::MediaPlaylist;
use tracing::{debug, info, warn};

use crate::scte35::signal::{self, Scte35Signal};

/// A detected ad break, anchored to its position in the current manifest
/// window.
#[derive(Debug, Clone)]
pub struct AdBreak {
    /// Starting segment index (inclusive).
    pub start_index: usize,
    /// Ending segment index (exclusive). Equal to the playlist length when
    /// the break hasn't closed yet in this window.
    pub end_index: usize,
    /// Duration of the ad break in seconds, resolved via the fallback chain.
    pub duration: f64,
    pub signal: Scte35Signal,
}

/// Scans a media playlist's segments for splice-out/in markers and returns
/// the ad breaks found, in playlist order.
///
/// Legacy `CUE-OUT`/`CUE-IN` tags (m3u8-rs strips the `#EXT-` prefix, so the
/// tag name seen here is `X-CUE-OUT` etc.) are recognized only when no
/// DATERANGE or inline SCTE-35 signal covers the same segment, since a
/// stream carrying both would otherwise double-count the same break.
pub fn detect_ad_breaks(playlist: &MediaPlaylist) -> Vec<AdBreak> {
    let mut ad_breaks = Vec::new();
    let mut open_break: Option<(usize, Scte35Signal)> = None;
    let mut legacy_break: Option<(usize, f64)> = None;

    for (index, segment) in playlist.segments.iter().enumerate() {
        if let Some(dr) = &segment.daterange {
            if let Some(attr) = signal::recognize_daterange(dr) {
                let (sig, validation) = signal::from_attribute_signal(attr);
                for w in &validation.warnings {
                    debug!(segment = index, warning = %w, "scte-35 signal warning");
                }
                if !validation.is_usable() {
                    warn!(segment = index, errors = ?validation.critical_errors, "rejecting unusable scte-35 signal");
                    continue;
                }

                if sig.is_start {
                    if open_break.is_none() {
                        open_break = Some((index, sig));
                    }
                } else if let Some((start_idx, start_sig)) = open_break.take() {
                    info!(segment = index, "closing ad break opened at segment #{}", start_idx);
                    let duration = start_sig.duration_seconds.unwrap_or(0.0);
                    ad_breaks.push(AdBreak { start_index: start_idx, end_index: index, duration, signal: start_sig });
                }
                continue;
            }
        }

        for tag in &segment.unknown_tags {
            if let Some(payload) = inline_scte35_payload(&tag.tag, tag.rest.as_deref()) {
                match signal::from_binary_payload(format!("inline-{index}"), payload) {
                    Ok((sig, validation)) => {
                        if !validation.is_usable() {
                            warn!(segment = index, errors = ?validation.critical_errors, "rejecting unusable inline scte-35 payload");
                            continue;
                        }
                        if sig.is_start {
                            if open_break.is_none() {
                                open_break = Some((index, sig));
                            }
                        } else if let Some((start_idx, start_sig)) = open_break.take() {
                            let duration = start_sig.duration_seconds.unwrap_or(0.0);
                            ad_breaks.push(AdBreak { start_index: start_idx, end_index: index, duration, signal: start_sig });
                        }
                    }
                    Err(e) => warn!(segment = index, error = %e, "failed to decode inline scte-35 payload"),
                }
                continue;
            }

            if is_cue_in(&tag.tag) {
                if let Some((start_idx, duration)) = legacy_break.take() {
                    if open_break.is_none() {
                        ad_breaks.push(legacy_ad_break(start_idx, index, duration));
                    }
                }
            } else if let Some(duration) = parse_cue_out(&tag.tag, tag.rest.as_deref()) {
                if legacy_break.is_none() && open_break.is_none() {
                    legacy_break = Some((index, duration as f64));
                }
            }
        }
    }

    if let Some((start_idx, start_sig)) = open_break {
        warn!(segment = start_idx, "ad break left open at end of manifest window");
        let duration = start_sig.duration_seconds.unwrap_or(0.0);
        ad_breaks.push(AdBreak { start_index: start_idx, end_index: playlist.segments.len(), duration, signal: start_sig });
    } else if let Some((start_idx, duration)) = legacy_break {
        ad_breaks.push(legacy_ad_break(start_idx, playlist.segments.len(), duration));
    }

    ad_breaks
}

fn legacy_ad_break(start_index: usize, end_index: usize, duration: f64) -> AdBreak {
    AdBreak {
        start_index,
        end_index,
        duration,
        signal: Scte35Signal {
            event_id: format!("legacy-cue-{start_index}"),
            is_start: true,
            duration_seconds: Some(duration),
            segmentation_type_id: None,
            source: signal::SignalSource::Attribute,
            section: None,
            crc_warning: false,
        },
    }
}

fn inline_scte35_payload<'a>(tag_name: &str, rest: Option<&'a str>) -> Option<&'a str> {
    if tag_name == "SCTE35-CMD" || tag_name == "SCTE35-OUT" || tag_name == "OATCLS-SCTE35" {
        rest
    } else {
        None
    }
}

fn is_cue_in(tag_name: &str) -> bool {
    tag_name == "X-CUE-IN" || tag_name == "CUE-IN"
}

fn parse_cue_out(tag_name: &str, rest: Option<&str>) -> Option<f32> {
    if !(tag_name == "X-CUE-OUT" || tag_name == "CUE-OUT") {
        return None;
    }
    let rest = rest?;
    if let Some(eq_pos) = rest.find('=') {
        let duration_str = &rest[eq_pos + 1..];
        if let Ok(duration) = duration_str.trim().parse::<f32>() {
            return Some(duration);
        }
    }
    rest.trim().parse::<f32>().ok()
}

/// Returns true if `segment_index` falls inside any detected ad break.
pub fn is_in_ad_break(segment_index: usize, ad_breaks: &[AdBreak]) -> bool {
    ad_breaks.iter().any(|ab| segment_index >= ab.start_index && segment_index < ab.end_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use m3u8_rs::{ExtTag, MediaSegment};

    fn create_segment(uri: &str) -> MediaSegment {
        MediaSegment { uri: uri.to_string(), duration: 10.0, ..Default::default() }
    }

    fn create_segment_with_tag(tag: &str, rest: Option<&str>) -> MediaSegment {
        MediaSegment {
            uri: "segment.ts".to_string(),
            duration: 10.0,
            unknown_tags: vec![ExtTag { tag: tag.to_string(), rest: rest.map(|s| s.to_string()) }],
            ..Default::default()
        }
    }

    #[test]
    fn detects_legacy_cue_out_in_pair() {
        let playlist = MediaPlaylist {
            segments: vec![
                create_segment("seg0.ts"),
                create_segment_with_tag("X-CUE-OUT", Some("30")),
                create_segment("seg2.ts"),
                create_segment("seg3.ts"),
                create_segment_with_tag("X-CUE-IN", None),
                create_segment("seg5.ts"),
            ],
            ..Default::default()
        };

        let ad_breaks = detect_ad_breaks(&playlist);
        assert_eq!(ad_breaks.len(), 1);
        assert_eq!(ad_breaks[0].start_index, 1);
        assert_eq!(ad_breaks[0].end_index, 4);
        assert_eq!(ad_breaks[0].duration, 30.0);
    }

    #[test]
    fn detects_multiple_legacy_breaks() {
        let playlist = MediaPlaylist {
            segments: vec![
                create_segment("seg0.ts"),
                create_segment_with_tag("X-CUE-OUT", Some("30")),
                create_segment("seg2.ts"),
                create_segment_with_tag("X-CUE-IN", None),
                create_segment("seg4.ts"),
                create_segment_with_tag("X-CUE-OUT", Some("60")),
                create_segment("seg6.ts"),
                create_segment_with_tag("X-CUE-IN", None),
            ],
            ..Default::default()
        };

        let ad_breaks = detect_ad_breaks(&playlist);
        assert_eq!(ad_breaks.len(), 2);
        assert_eq!(ad_breaks[0].duration, 30.0);
        assert_eq!(ad_breaks[1].duration, 60.0);
    }

    #[test]
    fn unclosed_break_ends_at_window_boundary() {
        let playlist = MediaPlaylist {
            segments: vec![
                create_segment("seg0.ts"),
                create_segment_with_tag("X-CUE-OUT", Some("30")),
                create_segment("seg2.ts"),
            ],
            ..Default::default()
        };

        let ad_breaks = detect_ad_breaks(&playlist);
        assert_eq!(ad_breaks.len(), 1);
        assert_eq!(ad_breaks[0].end_index, 3);
    }

    #[test]
    fn is_in_ad_break_bounds() {
        let ad_breaks = vec![AdBreak {
            start_index: 2,
            end_index: 5,
            duration: 30.0,
            signal: legacy_ad_break(2, 5, 30.0).signal,
        }];

        assert!(!is_in_ad_break(1, &ad_breaks));
        assert!(is_in_ad_break(2, &ad_breaks));
        assert!(is_in_ad_break(4, &ad_breaks));
        assert!(!is_in_ad_break(5, &ad_breaks));
    }
}
