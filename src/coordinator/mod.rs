//! Channel Coordinator (C4): per-`(org, channel)` state machine reconciling
//! whatever cue source is active against the persisted `AdBreakState`,
//! invoking the Decision Engine at most once per break, and choosing an
//! insertion mode for the HLS Rewriter to apply (§4.4).

pub mod registry;
pub mod state;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::config::{ChannelConfig, StitchingMode};
use crate::decision::{AdPod, DecisionEngine, DecisionRequest, VariantType};
use crate::error::CoreError;
use crate::hls::cue::AdBreak;
use crate::metrics;

pub use registry::ChannelRegistry;
pub use state::{AdBreakState, CueSource, InsertionMode};

/// An operator- or test-supplied cue that overrides automatic detection.
/// Highest priority cue source (§4.4).
#[derive(Debug, Clone)]
pub struct ManualCue {
    pub id: String,
    pub duration_seconds: f64,
    pub expires_at: SystemTime,
    /// A pod resolved ahead of time (operator named a `pod_id`/`pod_url`
    /// directly in the cue request) bypasses the waterfall entirely.
    pub forced_pod: Option<AdPod>,
}

/// Per-viewer-request inputs the coordinator needs beyond channel config
/// and the detected cues.
#[derive(Debug, Clone)]
pub struct ViewerContext {
    pub viewer_bitrate_bps: u32,
    pub variant_type: VariantType,
    /// `mode=ssai|sgai` query override, highest priority in the insertion
    /// mode chain (testing/debugging only, §4.4).
    pub requested_mode: Option<InsertionMode>,
    /// Feature-detected client hint: Apple-platform markers present and no
    /// hls.js/WebView markers. Only consulted when neither a query override
    /// nor a channel-configured mode apply.
    pub client_is_apple_like: bool,
}

/// What the HLS Rewriter needs to apply a break to the manifest it's
/// currently serving.
#[derive(Debug, Clone)]
pub struct CoordinationOutcome {
    pub channel_key: String,
    pub break_id: String,
    pub mode: InsertionMode,
    pub pod: AdPod,
    pub duration_seconds: f64,
    /// Set once the break's first successful SSAI rewrite has reported its
    /// skip count; `None` means this is the first rewrite, and the caller
    /// should report it back via [`ChannelCoordinator::commit_skip_count`].
    pub content_segments_to_skip: Option<usize>,
}

enum CueCandidate {
    Manual(ManualCue),
    Scte35 { id: String, duration_seconds: f64 },
    TimeSchedule { id: String, duration_seconds: f64 },
}

impl CueCandidate {
    fn id(&self) -> &str {
        match self {
            CueCandidate::Manual(m) => &m.id,
            CueCandidate::Scte35 { id, .. } => id,
            CueCandidate::TimeSchedule { id, .. } => id,
        }
    }

    fn duration_seconds(&self) -> f64 {
        match self {
            CueCandidate::Manual(m) => m.duration_seconds,
            CueCandidate::Scte35 { duration_seconds, .. } => *duration_seconds,
            CueCandidate::TimeSchedule { duration_seconds, .. } => *duration_seconds,
        }
    }

    fn source(&self) -> CueSource {
        match self {
            CueCandidate::Manual(_) => CueSource::Manual,
            CueCandidate::Scte35 { .. } => CueSource::Scte35,
            CueCandidate::TimeSchedule { .. } => CueSource::TimeSchedule,
        }
    }
}

/// Tolerance window around a time-schedule boundary a request is allowed to
/// land in and still count as "the schedule fired". Wider than a single
/// instant so a manifest poll cadence of a few seconds doesn't miss it.
const TIME_SCHEDULE_TOLERANCE: Duration = Duration::from_secs(4);

fn determine_active_cue(
    channel: &ChannelConfig,
    ad_breaks: &[AdBreak],
    manual_cue: Option<ManualCue>,
    now: SystemTime,
) -> Option<CueCandidate> {
    if let Some(manual) = manual_cue {
        if now < manual.expires_at {
            return Some(CueCandidate::Manual(manual));
        }
    }

    if channel.scte35_auto_insert {
        if let Some(first) = ad_breaks.first() {
            return Some(CueCandidate::Scte35 {
                id: first.signal.event_id.clone(),
                duration_seconds: first.duration.max(channel.default_ad_duration_sec as f64),
            });
        }
    }

    if channel.time_based_auto_insert && channel.time_schedule_interval_sec > 0 {
        let epoch_secs = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        let interval = channel.time_schedule_interval_sec as u64;
        let phase = epoch_secs % interval;
        if phase < TIME_SCHEDULE_TOLERANCE.as_secs() {
            let bucket = epoch_secs / interval;
            return Some(CueCandidate::TimeSchedule {
                id: format!("time-{bucket}"),
                duration_seconds: channel.default_ad_duration_sec as f64,
            });
        }
    }

    None
}

fn select_insertion_mode(channel: &ChannelConfig, viewer: &ViewerContext) -> InsertionMode {
    if let Some(mode) = viewer.requested_mode {
        return mode;
    }
    match channel.mode {
        StitchingMode::Ssai => InsertionMode::Ssai,
        StitchingMode::Sgai => InsertionMode::Sgai,
        StitchingMode::Auto => {
            if viewer.client_is_apple_like {
                InsertionMode::Sgai
            } else {
                InsertionMode::Ssai
            }
        }
    }
}

/// Orchestrates the per-viewer-request reconciliation described in §4.4.
/// `registry` owns the single-writer lock and durable `AdBreakState`;
/// `decision_engine` is invoked at most once per break (plus refreshes past
/// the 30s staleness window).
#[derive(Clone)]
pub struct ChannelCoordinator {
    registry: ChannelRegistry,
    decision_engine: DecisionEngine,
}

impl ChannelCoordinator {
    pub fn new(registry: ChannelRegistry, decision_engine: DecisionEngine) -> Self {
        Self { registry, decision_engine }
    }

    /// Reconciles channel ad-break state against the cues detected in the
    /// current manifest window. Returns `None` when no break is active
    /// (IDLE, pass-through).
    pub async fn reconcile(
        &self,
        channel: &ChannelConfig,
        ad_breaks: &[AdBreak],
        manual_cue: Option<ManualCue>,
        viewer: &ViewerContext,
        now: SystemTime,
    ) -> Result<Option<CoordinationOutcome>, CoreError> {
        let channel_key = ChannelRegistry::channel_key(&channel.org_slug, &channel.channel_slug);
        let _lock = self.registry.lock(&channel_key).await;

        let mut existing = self.registry.get(&channel_key).await;
        if let Some(state) = &existing {
            if state.has_ended(now) {
                info!(channel = %channel_key, break_id = %state.id, "ad break ended, clearing state");
                self.registry.clear(&channel_key).await;
                existing = None;
            }
        }

        let active_cue = determine_active_cue(channel, ad_breaks, manual_cue, now);

        let mut state = match (existing, active_cue) {
            (Some(state), _) => state,
            (None, Some(cue)) => {
                let forced_pod = match &cue {
                    CueCandidate::Manual(m) => m.forced_pod.clone(),
                    _ => None,
                };
                let request = DecisionRequest {
                    channel_key: channel_key.clone(),
                    duration_seconds: cue.duration_seconds(),
                    viewer_bitrate_bps: viewer.viewer_bitrate_bps,
                    variant_type: viewer.variant_type,
                    tier: channel.tier as u8,
                };
                let pod = self
                    .decision_engine
                    .decide(channel, &request, forced_pod)
                    .await
                    .map_err(|e| match e {
                        crate::decision::DecisionError::Timeout => CoreError::DecisionTimeout,
                        crate::decision::DecisionError::Empty => CoreError::DecisionEmpty,
                    })?;

                let new_state =
                    AdBreakState::new(cue.id().to_string(), cue.source(), None, cue.duration_seconds(), pod, now);
                info!(channel = %channel_key, break_id = %new_state.id, source = ?new_state.cue_source, "opened ad break");
                metrics::record_ad_breaks(1);
                new_state
            }
            (None, None) => return Ok(None),
        };

        if let Some(cue) = determine_active_cue(channel, ad_breaks, None, now) {
            if !state.already_processed(cue.id()) {
                state.mark_processed(cue.id());
            }
        }

        let mode = match state.mode {
            Some(mode) => mode,
            None => {
                let mode = select_insertion_mode(channel, viewer);
                state.mode = Some(mode);
                mode
            }
        };

        if state.decision_is_stale(now) {
            let request = DecisionRequest {
                channel_key: channel_key.clone(),
                duration_seconds: state.duration_sec,
                viewer_bitrate_bps: viewer.viewer_bitrate_bps,
                variant_type: viewer.variant_type,
                tier: channel.tier as u8,
            };
            match self.decision_engine.decide(channel, &request, None).await {
                Ok(pod) => {
                    state.decision = pod;
                    state.decision_calculated_at_ms = now;
                }
                Err(e) => warn!(channel = %channel_key, error = %e, "decision refresh failed, keeping stale pod"),
            }
        }

        let outcome = CoordinationOutcome {
            channel_key: channel_key.clone(),
            break_id: state.id.clone(),
            mode,
            pod: state.decision.clone(),
            duration_seconds: state.duration_sec,
            content_segments_to_skip: state.content_segments_to_skip,
        };

        // Always persist: the lock scopes a read-modify-write, and the
        // request may have created or advanced processed-event tracking
        // even when no field above changed.
        self.registry.put(&channel_key, state).await;

        Ok(Some(outcome))
    }

    /// Records the segment-skip count computed by the first successful SSAI
    /// rewrite of a break. Subsequent calls for the same break compare
    /// against the persisted value and only log a mismatch — the persisted
    /// count always wins, per §4.4's "never overwrite mid-break" rule.
    pub async fn commit_skip_count(&self, channel_key: &str, break_id: &str, skipped: usize) {
        let _lock = self.registry.lock(channel_key).await;
        let Some(mut state) = self.registry.get(channel_key).await else { return };
        if state.id != break_id {
            return;
        }
        match state.content_segments_to_skip {
            None => {
                state.content_segments_to_skip = Some(skipped);
                self.registry.put(channel_key, state).await;
            }
            Some(existing) if existing != skipped => {
                warn!(channel_key, break_id, existing, recomputed = skipped, "skip count mismatch");
                metrics::record_skip_count_mismatch();
            }
            Some(_) => {}
        }
    }

    /// Forcibly clears a channel's break state (operator override).
    pub async fn force_clear(&self, channel_key: &str) {
        let _lock = self.registry.lock(channel_key).await;
        self.registry.clear(channel_key).await;
    }

    pub fn active_channel_count(&self) -> usize {
        self.registry.active_count()
    }
}
