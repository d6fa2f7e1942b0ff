use std::time::{Duration, SystemTime};

use axum::{extract::{Path, State}, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::coordinator::{ChannelRegistry, ManualCue, ViewerContext};
use crate::decision::{AdPod, AdPodItem, PodSource, PodTracking, VariantType};
use crate::error::{CoreError, Result};
use crate::server::state::AppState;

/// Default bitrate assumed for the decision waterfall a manual cue triggers.
/// No viewer is attached to this request; [`AdPod::select_rendition`]'s
/// nearest-below-with-fallback logic means the exact value only matters when
/// the resolved pod has more than one video rendition.
const MANUAL_CUE_REFERENCE_BITRATE_BPS: u32 = 2_000_000;

#[derive(Debug, Deserialize)]
pub struct CueRequest {
    pub duration_sec: Option<f64>,
    pub pod_id: Option<String>,
    pub pod_url: Option<String>,
    #[serde(default)]
    pub stop: bool,
}

#[derive(Debug, Serialize)]
pub struct CueResponse {
    pub channel_key: String,
    pub break_id: Option<String>,
    pub mode: Option<&'static str>,
}

fn adhoc_pod(pod_url: &str, duration_sec: f64) -> AdPod {
    AdPod {
        pod_id: format!("manual-{}", uuid::Uuid::new_v4()),
        items: vec![AdPodItem {
            uri: pod_url.to_string(),
            bitrate_bps: MANUAL_CUE_REFERENCE_BITRATE_BPS,
            is_audio_only: false,
            duration_seconds: duration_sec,
        }],
        tracking: PodTracking::default(),
        source: PodSource::Cached,
    }
}

/// `POST /{org_slug}/{channel_slug}/cue` (§6.1): operator-triggered insertion,
/// the highest-priority cue source the coordinator considers. `stop: true`
/// forcibly clears any in-flight break instead of opening one.
pub async fn trigger_cue(
    Path((org_slug, channel_slug)): Path<(String, String)>,
    State(state): State<AppState>,
    Json(body): Json<CueRequest>,
) -> Result<impl IntoResponse> {
    let channel = state
        .channel_source
        .get(&org_slug, &channel_slug)
        .ok_or_else(|| CoreError::InvalidChannel(format!("{org_slug}/{channel_slug}")))?;
    let channel_key = ChannelRegistry::channel_key(&org_slug, &channel_slug);

    if body.stop {
        info!(channel = %channel_key, "manual cue requested break clear");
        state.coordinator.force_clear(&channel_key).await;
        return Ok((
            StatusCode::OK,
            Json(CueResponse { channel_key, break_id: None, mode: None }),
        ));
    }

    let duration_sec = body
        .duration_sec
        .ok_or_else(|| CoreError::ValidationError("duration_sec is required unless stop is set".to_string()))?;
    if duration_sec <= 0.0 {
        return Err(CoreError::ValidationError("duration_sec must be positive".to_string()));
    }

    let forced_pod = match (&body.pod_id, &body.pod_url) {
        (Some(_), Some(_)) => {
            return Err(CoreError::ValidationError("specify only one of pod_id or pod_url".to_string()));
        }
        (Some(pod_id), None) => {
            let pod = state
                .pod_store
                .lookup(pod_id, PodSource::ObjectStore)
                .await
                .ok_or_else(|| CoreError::ValidationError(format!("pod {pod_id} not found")))?;
            Some(pod)
        }
        (None, Some(pod_url)) => Some(adhoc_pod(pod_url, duration_sec)),
        (None, None) => None,
    };

    let now = SystemTime::now();
    let manual_cue = ManualCue {
        id: format!("manual-{}", uuid::Uuid::new_v4()),
        duration_seconds: duration_sec,
        expires_at: now + Duration::from_secs_f64(duration_sec),
        forced_pod,
    };

    let viewer = ViewerContext {
        viewer_bitrate_bps: MANUAL_CUE_REFERENCE_BITRATE_BPS,
        variant_type: VariantType::Video,
        requested_mode: None,
        client_is_apple_like: false,
    };

    let outcome = state.coordinator.reconcile(&channel, &[], Some(manual_cue), &viewer, now).await?;

    match outcome {
        Some(outcome) => {
            info!(channel = %channel_key, break_id = %outcome.break_id, "manual cue opened break");
            let mode = match outcome.mode {
                crate::coordinator::InsertionMode::Ssai => "ssai",
                crate::coordinator::InsertionMode::Sgai => "sgai",
            };
            Ok((
                StatusCode::OK,
                Json(CueResponse { channel_key, break_id: Some(outcome.break_id), mode: Some(mode) }),
            ))
        }
        None => Err(CoreError::InternalError("manual cue did not open a break".to_string())),
    }
}
