use crate::error::{CoreError, Result};
use m3u8_rs::{parse_playlist_res, Playlist};
use tracing::info;

/// Parse HLS playlist from string content
pub fn parse_hls_playlist(content: &str) -> Result<Playlist> {
    info!("parsing HLS playlist");

    match parse_playlist_res(content.as_bytes()) {
        Ok(playlist) => Ok(playlist),
        Err(e) => {
            let error_msg = format!("failed to parse playlist: {:?}", e);
            Err(CoreError::PlaylistParseError(error_msg))
        }
    }
}

/// Rewrite content segment URLs to route through the `{org}/{channel}/{segment}`
/// pass-through proxy (§6.1). Ad insertion itself is handled separately by
/// the HLS Rewriter; this only keeps segment fetches flowing through this
/// service instead of pointing straight at the origin.
///
/// For segments with absolute URLs (starting with http), the origin is
/// derived from the segment's own URL. For relative URLs, the provided
/// `origin_base` is used as the origin.
pub fn rewrite_content_urls(
    mut playlist: Playlist,
    org_slug: &str,
    channel_slug: &str,
    base_url: &str,
    origin_base: &str,
) -> Result<Playlist> {
    info!(org_slug, channel_slug, "rewriting content URLs");

    if let Playlist::MediaPlaylist(ref mut media_playlist) = playlist {
        for segment in media_playlist.segments.iter_mut() {
            // Skip segments already routed through this service (ad renditions).
            if segment.uri.starts_with(base_url) {
                continue;
            }

            if segment.uri.starts_with("http") {
                let (seg_origin, segment_name) = segment.uri.rsplit_once('/').unwrap_or(("", &segment.uri));
                segment.uri =
                    format!("{base_url}/{org_slug}/{channel_slug}/{segment_name}?origin={seg_origin}");
            } else {
                segment.uri =
                    format!("{base_url}/{org_slug}/{channel_slug}/{}?origin={origin_base}", segment.uri);
            }
        }
    }

    Ok(playlist)
}

/// Rewrite master playlist variant-stream URLs to route each rendition back
/// through this channel's own playlist endpoint, so every quality level
/// gets stitched identically.
///
/// Example transformation:
/// - Input:  `720p/playlist.m3u8`
/// - Output: `{base_url}/{org}/{channel}/720p.m3u8?origin={origin_base}/720p/playlist.m3u8`
pub fn rewrite_master_urls(
    mut playlist: Playlist,
    org_slug: &str,
    channel_slug: &str,
    base_url: &str,
    origin_base: &str,
) -> Result<Playlist> {
    info!(org_slug, channel_slug, "rewriting master playlist URLs");

    if let Playlist::MasterPlaylist(ref mut master) = playlist {
        for (i, variant) in master.variants.iter_mut().enumerate() {
            let original_uri = variant.uri.clone();
            let bandwidth = variant.bandwidth;

            let absolute_url = if variant.uri.starts_with("http") {
                variant.uri.clone()
            } else {
                format!("{}/{}", origin_base, variant.uri)
            };

            // `bitrate` rides along so the subsequent media-playlist request
            // knows the viewer's rendition without a second round trip.
            variant.uri = format!(
                "{base_url}/{org_slug}/{channel_slug}/variant-{i}.m3u8?origin={absolute_url}&bitrate={bandwidth}"
            );

            info!("rewrote variant: {} -> {}", original_uri, variant.uri);
        }

        for (i, alt) in master.alternatives.iter_mut().enumerate() {
            if let Some(ref mut uri) = alt.uri {
                let original_uri = uri.clone();

                let absolute_url =
                    if uri.starts_with("http") { uri.clone() } else { format!("{}/{}", origin_base, uri) };

                *uri = format!("{base_url}/{org_slug}/{channel_slug}/alt-{i}.m3u8?origin={absolute_url}");

                info!("rewrote alternative media: {} -> {}", original_uri, uri);
            }
        }

        info!(
            "rewrote {} variant(s) and {} alternative(s) in master playlist",
            master.variants.len(),
            master.alternatives.len()
        );
    }

    Ok(playlist)
}

/// Serialize playlist to string
pub fn serialize_playlist(playlist: Playlist) -> Result<String> {
    let mut output = Vec::new();
    playlist
        .write_to(&mut output)
        .map_err(|e| CoreError::RewriteError(format!("failed to write playlist: {}", e)))?;

    String::from_utf8(output)
        .map_err(|e| CoreError::RewriteError(format!("playlist output was not valid UTF-8: {}", e)))
}
