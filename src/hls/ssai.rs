//! Server-Side Ad Insertion: segment replacement with `EXT-X-DISCONTINUITY`
//! markers (§4.2).
//!
//! Splices the bitrate-matched ad rendition into the break window: prefix
//! segments are left untouched, a discontinuity opens the ad block, ad
//! segments carry their actual (pod-reported) durations and no PDT, a
//! second discontinuity closes it, and playback resumes at a real PDT
//! found within a bounded lookahead — never a synthesized one, since that
//! would silently fabricate a resume point instead of falling back to
//! pass-through.

use m3u8_rs::{ExtTag, MediaPlaylist, MediaSegment};

use crate::coordinator::CoordinationOutcome;
use crate::decision::VariantType;
use crate::error::CoreError;
use crate::hls::cue::AdBreak;
use crate::hls::window::ManifestWindow;

/// Segments beyond this many past the break's nominal end are searched for
/// a real resume PDT before giving up (§4.2 step 7).
const MAX_RESUME_LOOKAHEAD: usize = 30;

#[derive(Debug, Clone, Copy)]
pub struct SsaiResult {
    /// Count of original content segments dropped to make room for the ad
    /// block. Callers persist this via
    /// `ChannelCoordinator::commit_skip_count` after the first successful
    /// rewrite of a break.
    pub skipped: usize,
}

/// Rewrites `playlist` in place, replacing the content segments spanned by
/// `ad_break` with the ad rendition selected in `outcome`. Returns the
/// number of content segments skipped, or an error if the break can't be
/// safely spliced — callers should fall back to pass-through (or SGAI) on
/// error rather than serve a partial rewrite.
pub fn rewrite(
    playlist: &mut MediaPlaylist,
    window: &ManifestWindow,
    ad_break: &AdBreak,
    outcome: &CoordinationOutcome,
    viewer_bitrate_bps: u32,
    variant_type: VariantType,
) -> Result<SsaiResult, CoreError> {
    let start_index = ad_break.start_index;
    if start_index >= playlist.segments.len() {
        return Err(CoreError::WindowError("ad break start index past end of manifest window".to_string()));
    }

    // Step 2: first rewrite of this break picks the skip count; later ones
    // reuse whatever was persisted, even if this window's own CUE-IN
    // position would suggest a different count.
    let skipped = outcome
        .content_segments_to_skip
        .unwrap_or_else(|| ad_break.end_index.saturating_sub(start_index).max(1));
    let resume_index = (start_index + skipped).min(playlist.segments.len());

    // Step 7: abort rather than fabricate a resume point.
    if resume_index < playlist.segments.len() && window.next_real_pdt(playlist, resume_index, MAX_RESUME_LOOKAHEAD).is_none() {
        return Err(CoreError::WindowError("no resume PDT found within lookahead bound, aborting SSAI rewrite".to_string()));
    }

    let audio_only = matches!(variant_type, VariantType::AudioOnly);
    let rendition = outcome
        .pod
        .select_rendition(viewer_bitrate_bps, audio_only)
        .ok_or(CoreError::DecisionEmpty)?;

    let contract_duration = outcome.duration_seconds;
    let actual_duration = outcome.pod.total_duration_seconds();
    if (contract_duration - actual_duration).abs() > 0.5 {
        tracing::info!(
            contract_duration,
            actual_duration,
            "ad pod duration does not match the cue's announced duration, using actual"
        );
    }

    let mut ad_segments = Vec::new();
    for item in outcome.pod.items.iter().filter(|i| i.is_audio_only == audio_only) {
        ad_segments.push(MediaSegment {
            uri: item.uri.clone(),
            duration: item.duration_seconds as f32,
            discontinuity: false,
            program_date_time: None,
            ..Default::default()
        });
    }
    if ad_segments.is_empty() {
        ad_segments.push(MediaSegment {
            uri: rendition.uri.clone(),
            duration: rendition.duration_seconds as f32,
            program_date_time: None,
            ..Default::default()
        });
    }
    ad_segments[0].discontinuity = true;
    ad_segments[0]
        .unknown_tags
        .push(ExtTag { tag: "X-AD-BREAK-ID".to_string(), rest: Some(outcome.break_id.clone()) });

    let mut rebuilt = Vec::with_capacity(playlist.segments.len() + ad_segments.len());
    rebuilt.extend(playlist.segments[..start_index].iter().cloned());
    rebuilt.extend(ad_segments);
    if resume_index < playlist.segments.len() {
        let mut resumed = playlist.segments[resume_index].clone();
        resumed.discontinuity = true;
        rebuilt.push(resumed);
        rebuilt.extend(playlist.segments[resume_index + 1..].iter().cloned());
    }

    let discontinuities_added = 2;
    playlist.discontinuity_sequence += discontinuities_added;
    playlist.segments = rebuilt;

    Ok(SsaiResult { skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::InsertionMode;
    use crate::decision::{AdPod, AdPodItem, PodSource, PodTracking};
    use crate::scte35::signal::{Scte35Signal, SignalSource};
    use chrono::{FixedOffset, TimeZone};

    fn segment(duration: f32, pdt: Option<chrono::DateTime<FixedOffset>>) -> MediaSegment {
        MediaSegment { uri: "s.ts".to_string(), duration, program_date_time: pdt, ..Default::default() }
    }

    fn ad_break() -> AdBreak {
        AdBreak {
            start_index: 2,
            end_index: 4,
            duration: 20.0,
            signal: Scte35Signal {
                event_id: "brk-1".to_string(),
                is_start: true,
                duration_seconds: Some(20.0),
                segmentation_type_id: None,
                source: SignalSource::Attribute,
                section: None,
                crc_warning: false,
            },
        }
    }

    fn outcome(skip: Option<usize>) -> CoordinationOutcome {
        CoordinationOutcome {
            channel_key: "demo:demo".to_string(),
            break_id: "brk-1".to_string(),
            mode: InsertionMode::Ssai,
            pod: AdPod {
                pod_id: "p1".to_string(),
                items: vec![AdPodItem {
                    uri: "https://ads.example.com/p1/seg0.ts".to_string(),
                    bitrate_bps: 1_500_000,
                    is_audio_only: false,
                    duration_seconds: 20.0,
                }],
                tracking: PodTracking::default(),
                source: PodSource::Slate,
            },
            duration_seconds: 20.0,
            content_segments_to_skip: skip,
        }
    }

    fn playlist_with_resume_pdt() -> MediaPlaylist {
        let base = FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        MediaPlaylist {
            segments: vec![
                segment(10.0, Some(base)),
                segment(10.0, None),
                segment(10.0, None),
                segment(10.0, None),
                segment(10.0, Some(base + chrono::Duration::seconds(40))),
                segment(10.0, None),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn splices_ad_segments_with_discontinuities() {
        let mut playlist = playlist_with_resume_pdt();
        let window = ManifestWindow::build("raw", &playlist);
        let result = rewrite(&mut playlist, &window, &ad_break(), &outcome(None), 2_000_000, VariantType::Video).unwrap();

        assert_eq!(result.skipped, 2);
        assert!(playlist.segments.iter().any(|s| s.discontinuity));
        assert!(playlist.segments.iter().any(|s| s.uri.contains("ads.example.com")));
        assert_eq!(playlist.discontinuity_sequence, 2);
    }

    #[test]
    fn reuses_persisted_skip_count_over_recomputed_one() {
        let mut playlist = playlist_with_resume_pdt();
        let window = ManifestWindow::build("raw", &playlist);
        let result = rewrite(&mut playlist, &window, &ad_break(), &outcome(Some(3)), 2_000_000, VariantType::Video).unwrap();
        assert_eq!(result.skipped, 3);
    }

    #[test]
    fn aborts_when_no_resume_pdt_within_lookahead() {
        let mut playlist = MediaPlaylist {
            segments: vec![segment(10.0, None), segment(10.0, None), segment(10.0, None), segment(10.0, None)],
            ..Default::default()
        };
        let window = ManifestWindow::build("raw", &playlist);
        let err = rewrite(&mut playlist, &window, &ad_break(), &outcome(None), 2_000_000, VariantType::Video).unwrap_err();
        assert!(matches!(err, CoreError::WindowError(_)));
    }
}
