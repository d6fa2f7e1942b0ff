//! Master-playlist bitrate/audio-only ladder extraction (§4.2).
//!
//! A variant is video iff it carries a `RESOLUTION` attribute or its
//! `CODECS` list names a video codec (avc, hvc/hev, vp); everything else is
//! audio-only. The "video bitrates" ladder used for ad bitrate matching
//! drops audio-only variants and anything under 200 kbps (trick-play /
//! audio-description renditions), but audio-only variants are kept in a
//! separate ladder so audio-only ad matching still has something to match
//! against.

use m3u8_rs::{MasterPlaylist, VariantStream};

const MIN_VIDEO_BITRATE_BPS: u32 = 200_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantKind {
    Video,
    AudioOnly,
}

#[derive(Debug, Clone)]
pub struct BitrateLadder {
    /// Video-variant bitrates, sorted ascending, ≥ 200 kbps.
    pub video_bitrates_bps: Vec<u32>,
    /// Audio-only-variant bitrates, sorted ascending.
    pub audio_only_bitrates_bps: Vec<u32>,
}

impl BitrateLadder {
    pub fn is_empty(&self) -> bool {
        self.video_bitrates_bps.is_empty() && self.audio_only_bitrates_bps.is_empty()
    }
}

fn classify(variant: &VariantStream) -> VariantKind {
    if variant.resolution.is_some() {
        return VariantKind::Video;
    }
    let codecs = variant.codecs.as_deref().unwrap_or_default().to_lowercase();
    if codecs.split(',').any(|c| {
        let c = c.trim();
        c.starts_with("avc") || c.starts_with("hvc") || c.starts_with("hev") || c.starts_with("vp")
    }) {
        return VariantKind::Video;
    }
    VariantKind::AudioOnly
}

/// Extracts the video and audio-only bitrate ladders from a master
/// playlist's variant streams.
pub fn extract_ladder(master: &MasterPlaylist) -> BitrateLadder {
    let mut video_bitrates_bps = Vec::new();
    let mut audio_only_bitrates_bps = Vec::new();

    for variant in &master.variants {
        let bitrate = variant.bandwidth as u32;
        match classify(variant) {
            VariantKind::Video if bitrate >= MIN_VIDEO_BITRATE_BPS => video_bitrates_bps.push(bitrate),
            VariantKind::Video => {}
            VariantKind::AudioOnly => audio_only_bitrates_bps.push(bitrate),
        }
    }

    video_bitrates_bps.sort_unstable();
    audio_only_bitrates_bps.sort_unstable();
    BitrateLadder { video_bitrates_bps, audio_only_bitrates_bps }
}

/// Picks the viewer's effective bitrate for ad matching: the variant
/// bandwidth nearest at-or-below the one the client is currently on, or the
/// lowest available if the client is below every rung.
pub fn nearest_rung(ladder: &[u32], current_bitrate_bps: u32) -> Option<u32> {
    ladder.iter().rev().find(|&&b| b <= current_bitrate_bps).copied().or_else(|| ladder.first().copied())
}
