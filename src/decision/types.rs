//! Shapes returned by the decision waterfall, independent of which step
//! produced them.

use serde::{Deserialize, Serialize};

use crate::decision::vast::TrackingEvent;

/// A single renditioned ad asset within a pod, ready for bitrate matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdPodItem {
    pub uri: String,
    pub bitrate_bps: u32,
    pub is_audio_only: bool,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodTracking {
    pub impression_urls: Vec<String>,
    pub tracking_events: Vec<TrackingEvent>,
    pub error_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PodSource {
    Cached,
    Vast,
    ObjectStore,
    Slate,
}

/// The outcome of a successful waterfall pass: a pod of renditions plus the
/// trackers to fire as the viewer progresses through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdPod {
    pub pod_id: String,
    pub items: Vec<AdPodItem>,
    pub tracking: PodTracking,
    pub source: PodSource,
}

impl AdPod {
    /// Selects the rendition whose bitrate is nearest-below `viewer_bitrate_bps`,
    /// restricted to audio-only items when `audio_only` is set. Per §4.2,
    /// returns `None` (never a mismatched pod) if no eligible item exists.
    pub fn select_rendition(&self, viewer_bitrate_bps: u32, audio_only: bool) -> Option<&AdPodItem> {
        let eligible: Vec<&AdPodItem> = self
            .items
            .iter()
            .filter(|item| item.is_audio_only == audio_only)
            .collect();

        if eligible.is_empty() {
            return None;
        }

        eligible
            .iter()
            .filter(|item| item.bitrate_bps <= viewer_bitrate_bps)
            .max_by_key(|item| item.bitrate_bps)
            .or_else(|| eligible.iter().min_by_key(|item| item.bitrate_bps))
            .copied()
    }

    pub fn total_duration_seconds(&self) -> f64 {
        self.items.iter().map(|i| i.duration_seconds).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantType {
    Video,
    AudioOnly,
}

#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub channel_key: String,
    pub duration_seconds: f64,
    pub viewer_bitrate_bps: u32,
    pub variant_type: VariantType,
    pub tier: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecisionError {
    Timeout,
    Empty,
}

impl std::fmt::Display for DecisionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionError::Timeout => write!(f, "decision waterfall exceeded its time budget"),
            DecisionError::Empty => write!(f, "decision waterfall produced no eligible pod"),
        }
    }
}
