use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::info;

/// Demo HLS playlist for exercising the ad insertion pipeline without a real
/// origin.
///
/// Serves a synthetic HLS media playlist built from a real test stream (Mux's
/// public test stream) with SCTE-35 CUE-OUT/CUE-IN markers injected to create
/// an ad break opportunity.
///
/// Usage:
///   1. Start the server: `DEV_MODE=true cargo run`
///   2. Point a channel's `origin_url` at `http://localhost:3000/demo/playlist.m3u8`
///   3. Request `http://localhost:3000/{org}/{channel}/{variant}.m3u8?origin=...`
pub async fn serve_demo_playlist() -> Response {
    info!("serving demo HLS playlist with CUE markers");

    // Real, reachable test segments from the Mux public test stream. Each
    // segment uses a different sub-path (url_462, url_463, ...) matching the
    // actual Mux stream layout. The CUE markers open a 30-second ad break at
    // segments 5-7.
    let playlist = r#"#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:10
#EXT-X-MEDIA-SEQUENCE:0

#EXTINF:10.0,
https://test-streams.mux.dev/x36xhzz/url_0/url_462/193039199_mp4_h264_aac_hd_7.ts
#EXTINF:10.0,
https://test-streams.mux.dev/x36xhzz/url_0/url_463/193039199_mp4_h264_aac_hd_7.ts
#EXTINF:10.0,
https://test-streams.mux.dev/x36xhzz/url_0/url_464/193039199_mp4_h264_aac_hd_7.ts
#EXTINF:10.0,
https://test-streams.mux.dev/x36xhzz/url_0/url_465/193039199_mp4_h264_aac_hd_7.ts
#EXTINF:10.0,
https://test-streams.mux.dev/x36xhzz/url_0/url_466/193039199_mp4_h264_aac_hd_7.ts

#EXT-X-CUE-OUT:30
#EXTINF:10.0,
https://test-streams.mux.dev/x36xhzz/url_0/url_467/193039199_mp4_h264_aac_hd_7.ts
#EXT-X-CUE-OUT-CONT:10/30
#EXTINF:10.0,
https://test-streams.mux.dev/x36xhzz/url_0/url_468/193039199_mp4_h264_aac_hd_7.ts
#EXT-X-CUE-OUT-CONT:20/30
#EXTINF:10.0,
https://test-streams.mux.dev/x36xhzz/url_0/url_469/193039199_mp4_h264_aac_hd_7.ts
#EXT-X-CUE-IN

#EXTINF:10.0,
https://test-streams.mux.dev/x36xhzz/url_0/url_470/193039199_mp4_h264_aac_hd_7.ts
#EXTINF:10.0,
https://test-streams.mux.dev/x36xhzz/url_0/url_471/193039199_mp4_h264_aac_hd_7.ts
#EXTINF:10.0,
https://test-streams.mux.dev/x36xhzz/url_0/url_472/193039199_mp4_h264_aac_hd_7.ts

#EXT-X-ENDLIST
"#;

    info!("demo playlist: 11 segments, 1 ad break (30s) at segments 5-7");

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")],
        playlist,
    )
        .into_response()
}
