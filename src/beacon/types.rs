//! Beacon message shape (§4.5): one message per tracker event fired for a
//! request, carrying every URL registered for that event name so the
//! consumer can fan them out together.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BeaconEvent {
    Impression,
    Start,
    FirstQuartile,
    Midpoint,
    ThirdQuartile,
    Complete,
    Click,
    Error,
}

impl BeaconEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            BeaconEvent::Impression => "imp",
            BeaconEvent::Start => "start",
            BeaconEvent::FirstQuartile => "q1",
            BeaconEvent::Midpoint => "mid",
            BeaconEvent::ThirdQuartile => "q3",
            BeaconEvent::Complete => "complete",
            BeaconEvent::Click => "click",
            BeaconEvent::Error => "error",
        }
    }

    /// Maps a VAST tracking event name (as stored in `TrackingEvent::event`)
    /// to the beacon event it corresponds to. `None` for names the pipeline
    /// doesn't dispatch (VAST allows vendor-specific event names beyond the
    /// quartile set).
    pub fn from_vast_name(name: &str) -> Option<Self> {
        match name {
            "start" => Some(BeaconEvent::Start),
            "firstQuartile" => Some(BeaconEvent::FirstQuartile),
            "midpoint" => Some(BeaconEvent::Midpoint),
            "thirdQuartile" => Some(BeaconEvent::ThirdQuartile),
            "complete" => Some(BeaconEvent::Complete),
            "click" | "clickthrough" => Some(BeaconEvent::Click),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeaconMetadata {
    pub bitrate_bps: Option<u32>,
    pub variant: Option<String>,
    pub user_agent: Option<String>,
    pub session_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconMessage {
    pub event: BeaconEvent,
    pub ad_id: String,
    pub channel_key: String,
    pub tracker_urls: Vec<String>,
    pub metadata: BeaconMetadata,
}

impl BeaconMessage {
    /// `adId+event+sessionHint`, the dedup key named in §4.5. Two cues for
    /// the same ad/event/viewer collapse to the same key so a rolling
    /// manifest window that re-surfaces a cue doesn't re-fire its beacons.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.ad_id,
            self.event.as_str(),
            self.metadata.session_hint.as_deref().unwrap_or("-")
        )
    }
}
