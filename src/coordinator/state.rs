//! `AdBreakState`: the one piece of cross-request mutable state a channel's
//! coordinator owns. Everything needed to reconcile a viewer request without
//! re-running the decision waterfall lives here (§4.4, §5).

use std::collections::HashSet;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::decision::AdPod;

/// Which signal drove the current break, in priority order (manual highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CueSource {
    Manual,
    Scte35,
    TimeSchedule,
}

/// The stitching strategy committed to for a break, once chosen. Stays fixed
/// for the break's lifetime even if a later request would feature-detect
/// differently — switching mid-break would tear a manifest that's already
/// mid-rewrite for existing viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsertionMode {
    Ssai,
    Sgai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdBreakState {
    /// Stable cue id: the DATERANGE id, splice_event_id, or a manual-cue id.
    pub id: String,
    pub cue_source: CueSource,
    pub mode: Option<InsertionMode>,
    /// PDT of the break's start, when known from the origin manifest.
    pub start_pdt: Option<String>,
    #[serde(with = "epoch_millis")]
    pub started_at_ms: SystemTime,
    #[serde(with = "epoch_millis")]
    pub ends_at_ms: SystemTime,
    pub duration_sec: f64,
    pub ad_actual_duration_sec: f64,
    /// Filled on the first successful SSAI rewrite of this break; reused
    /// verbatim on every subsequent request so skip counts never drift.
    pub content_segments_to_skip: Option<usize>,
    pub decision: AdPod,
    #[serde(with = "epoch_millis")]
    pub decision_calculated_at_ms: SystemTime,
    pub processed_event_ids: HashSet<String>,
}

/// Decisions older than this are refreshed on the next request (§4.4).
pub const DECISION_STALE_AFTER: Duration = Duration::from_secs(30);

/// Grace window tacked onto a break's natural end before the coordinator
/// reclaims its state, so a slightly-late request still finds it.
pub const BREAK_END_GRACE: Duration = Duration::from_secs(5);

impl AdBreakState {
    pub fn new(
        id: String,
        cue_source: CueSource,
        start_pdt: Option<String>,
        duration_sec: f64,
        decision: AdPod,
        now: SystemTime,
    ) -> Self {
        let ad_actual_duration_sec = decision.total_duration_seconds();
        let mut processed_event_ids = HashSet::new();
        processed_event_ids.insert(id.clone());
        Self {
            id,
            cue_source,
            mode: None,
            start_pdt,
            started_at_ms: now,
            ends_at_ms: now + Duration::from_secs_f64(duration_sec) + BREAK_END_GRACE,
            duration_sec,
            ad_actual_duration_sec,
            content_segments_to_skip: None,
            decision,
            decision_calculated_at_ms: now,
            processed_event_ids,
        }
    }

    pub fn has_ended(&self, now: SystemTime) -> bool {
        now >= self.ends_at_ms
    }

    pub fn decision_is_stale(&self, now: SystemTime) -> bool {
        now.duration_since(self.decision_calculated_at_ms).unwrap_or_default() > DECISION_STALE_AFTER
    }

    pub fn already_processed(&self, cue_id: &str) -> bool {
        self.processed_event_ids.contains(cue_id)
    }

    pub fn mark_processed(&mut self, cue_id: &str) {
        self.processed_event_ids.insert(cue_id.to_string());
    }
}

mod epoch_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = time.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64;
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_millis(millis))
    }
}
