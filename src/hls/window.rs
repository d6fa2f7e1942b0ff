//! Request-scoped manifest window: a single forward pass that resolves
//! every segment's effective PDT once, plus a splice-point lookup. Built
//! fresh per request and discarded afterwards (§5) — the cache key is the
//! manifest's content hash, so a caller holding one across an async
//! boundary can cheaply confirm it's still looking at the same window.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, FixedOffset};
use m3u8_rs::MediaPlaylist;

pub struct ManifestWindow {
    pub manifest_hash: u64,
    pdts: Vec<Option<DateTime<FixedOffset>>>,
}

impl ManifestWindow {
    /// Builds the window from a playlist's raw text (for the hash) and its
    /// parsed segments (for the PDT pass). Forward-fills PDT from the
    /// nearest preceding anchor, same rule as `sgai::compute_pdt_at`, but
    /// computed once for every index instead of per lookup.
    pub fn build(raw_manifest: &str, playlist: &MediaPlaylist) -> Self {
        let mut hasher = DefaultHasher::new();
        raw_manifest.hash(&mut hasher);
        let manifest_hash = hasher.finish();

        let mut pdts = Vec::with_capacity(playlist.segments.len());
        let mut anchor: Option<(usize, DateTime<FixedOffset>)> = None;

        for (i, seg) in playlist.segments.iter().enumerate() {
            if let Some(pdt) = seg.program_date_time {
                anchor = Some((i, pdt));
                pdts.push(Some(pdt));
                continue;
            }
            match anchor {
                Some((anchor_idx, anchor_pdt)) => {
                    let offset_ms: i64 =
                        playlist.segments[anchor_idx..i].iter().map(|s| (s.duration * 1000.0) as i64).sum();
                    pdts.push(Some(anchor_pdt + chrono::Duration::milliseconds(offset_ms)));
                }
                None => pdts.push(None),
            }
        }

        Self { manifest_hash, pdts }
    }

    pub fn pdt_at(&self, index: usize) -> Option<DateTime<FixedOffset>> {
        self.pdts.get(index).copied().flatten()
    }

    pub fn segment_count(&self) -> usize {
        self.pdts.len()
    }

    /// First segment index whose PDT is ≥ `target`, the SSAI splice-point
    /// rule (§4.2 step 1). Segments without a resolvable PDT are skipped.
    pub fn index_at_or_after(&self, target: DateTime<FixedOffset>) -> Option<usize> {
        self.pdts.iter().position(|pdt| matches!(pdt, Some(p) if *p >= target))
    }

    /// Searches forward from `from_index` for a real (non-synthesized)
    /// resume PDT, bounded by `max_lookahead` segments. Only anchors
    /// actually present in the source playlist count — a synthesized PDT
    /// would make every break "resolve" and defeats the point of the bound.
    pub fn next_real_pdt(
        &self,
        playlist: &MediaPlaylist,
        from_index: usize,
        max_lookahead: usize,
    ) -> Option<(usize, DateTime<FixedOffset>)> {
        playlist
            .segments
            .iter()
            .enumerate()
            .skip(from_index)
            .take(max_lookahead)
            .find_map(|(i, seg)| seg.program_date_time.map(|pdt| (i, pdt)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use m3u8_rs::MediaSegment;

    fn segment(duration: f32) -> MediaSegment {
        MediaSegment { uri: "s.ts".to_string(), duration, ..Default::default() }
    }

    #[test]
    fn forward_fills_pdt_from_single_anchor() {
        let base = FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        use chrono::TimeZone;
        let mut seg0 = segment(10.0);
        seg0.program_date_time = Some(base);
        let playlist = MediaPlaylist { segments: vec![seg0, segment(10.0), segment(10.0)], ..Default::default() };

        let window = ManifestWindow::build("raw", &playlist);
        assert_eq!(window.pdt_at(0), Some(base));
        assert_eq!((window.pdt_at(2).unwrap() - base).num_seconds(), 20);
    }

    #[test]
    fn index_at_or_after_finds_splice_point() {
        use chrono::TimeZone;
        let base = FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut seg0 = segment(10.0);
        seg0.program_date_time = Some(base);
        let playlist = MediaPlaylist { segments: vec![seg0, segment(10.0), segment(10.0)], ..Default::default() };
        let window = ManifestWindow::build("raw", &playlist);

        let target = base + chrono::Duration::seconds(15);
        assert_eq!(window.index_at_or_after(target), Some(2));
    }

    #[test]
    fn next_real_pdt_ignores_synthesized_gaps() {
        use chrono::TimeZone;
        let base = FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut seg0 = segment(10.0);
        seg0.program_date_time = Some(base);
        let mut seg3 = segment(10.0);
        seg3.program_date_time = Some(base + chrono::Duration::seconds(40));
        let playlist =
            MediaPlaylist { segments: vec![seg0, segment(10.0), segment(10.0), seg3], ..Default::default() };

        let found = playlist_next_real(&playlist, 1, 10);
        assert_eq!(found.map(|(i, _)| i), Some(3));
    }

    fn playlist_next_real(
        playlist: &MediaPlaylist,
        from_index: usize,
        max_lookahead: usize,
    ) -> Option<(usize, DateTime<FixedOffset>)> {
        let window = ManifestWindow::build("raw", playlist);
        window.next_real_pdt(playlist, from_index, max_lookahead)
    }
}
