use crate::{
    error::{CoreError, Result},
    metrics,
    server::state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Pass-through segment proxy: `GET /{org_slug}/{channel_slug}/{segment}`
/// (§6.1). `origin` carries the origin base the manifest rewrite encoded;
/// 1 retry with 500ms backoff on fetch failure.
pub async fn serve_segment(
    Path((org_slug, channel_slug, segment)): Path<(String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> Result<Response> {
    let start = Instant::now();
    info!(org_slug, channel_slug, segment, "serving segment");

    let channel = state
        .channel_source
        .get(&org_slug, &channel_slug)
        .ok_or_else(|| CoreError::InvalidChannel(format!("{org_slug}/{channel_slug}")))?;

    let origin_base = params.get("origin").map(|s| s.as_str()).unwrap_or(&channel.origin_url);
    let segment_url = format!("{}/{}", origin_base, segment);

    info!(segment_url, "fetching segment from origin");

    // Fetch segment with retry logic (1 retry, 500ms backoff)
    let max_attempts = 2;
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match state.http_client.get(&segment_url).send().await {
            Ok(response) if response.status().is_success() => {
                let content_type = response
                    .headers()
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("video/MP2T")
                    .to_string();

                let bytes = response.bytes().await?;

                metrics::record_request("segment", 200);
                metrics::record_duration("segment", start);

                return Ok((
                    StatusCode::OK,
                    [
                        (header::CONTENT_TYPE, content_type.as_str()),
                        (header::CACHE_CONTROL, "max-age=60"),
                    ],
                    Body::from(bytes.to_vec()),
                )
                    .into_response());
            }
            Ok(response) => {
                warn!(status = %response.status(), attempt, max_attempts, "segment fetch returned non-success status");
                last_error = Some(response.error_for_status().unwrap_err());
            }
            Err(e) => {
                warn!(error = %e, attempt, max_attempts, "segment fetch failed");
                last_error = Some(e);
            }
        }

        if attempt < max_attempts {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    metrics::record_origin_error();
    metrics::record_request("segment", 502);
    metrics::record_duration("segment", start);

    Err(CoreError::OriginFetchError(last_error.expect("should have an error after all retries failed")))
}
