//! Builds `BeaconMessage`s from a pod's tracking URLs. Grounded on
//! `ad::tracking::events_for_segment`'s quartile threshold-crossing math —
//! the producer reuses it rather than re-deriving when quartiles fire.

use std::collections::HashMap;

use crate::ad::tracking::events_for_segment;
use crate::beacon::types::{BeaconEvent, BeaconMessage, BeaconMetadata};
use crate::decision::PodTracking;

/// One impression message for every impression URL in the pod, fired on the
/// first successful insertion of a break (§4.5: "at minimum: imp").
pub fn impression_message(
    tracking: &PodTracking,
    ad_id: &str,
    channel_key: &str,
    metadata: BeaconMetadata,
) -> Option<BeaconMessage> {
    if tracking.impression_urls.is_empty() {
        return None;
    }
    Some(BeaconMessage {
        event: BeaconEvent::Impression,
        ad_id: ad_id.to_string(),
        channel_key: channel_key.to_string(),
        tracker_urls: tracking.impression_urls.clone(),
        metadata,
    })
}

/// Quartile/start/complete messages for whichever tracking events cross
/// their threshold on this segment, grouped one message per event name.
/// Callers drive this per ad segment served when trackers are embedded
/// per-segment rather than timer-driven (§4.5 leaves the choice to the
/// caller).
pub fn segment_messages(
    tracking: &PodTracking,
    ad_id: &str,
    channel_key: &str,
    segment_index: usize,
    total_segments: usize,
    metadata: BeaconMetadata,
) -> Vec<BeaconMessage> {
    let fired = events_for_segment(segment_index, total_segments, &tracking.tracking_events);

    let mut by_event: HashMap<&str, Vec<String>> = HashMap::new();
    for event in fired {
        by_event.entry(event.event.as_str()).or_default().push(event.url.clone());
    }

    by_event
        .into_iter()
        .filter_map(|(name, urls)| {
            BeaconEvent::from_vast_name(name).map(|event| BeaconMessage {
                event,
                ad_id: ad_id.to_string(),
                channel_key: channel_key.to_string(),
                tracker_urls: urls,
                metadata: metadata.clone(),
            })
        })
        .collect()
}

/// Error-tracker messages, fired when VAST or ad-segment fetch fails.
pub fn error_message(tracking: &PodTracking, ad_id: &str, channel_key: &str, metadata: BeaconMetadata) -> Option<BeaconMessage> {
    if tracking.error_urls.is_empty() {
        return None;
    }
    Some(BeaconMessage {
        event: BeaconEvent::Error,
        ad_id: ad_id.to_string(),
        channel_key: channel_key.to_string(),
        tracker_urls: tracking.error_urls.clone(),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::vast::TrackingEvent;

    fn tracking() -> PodTracking {
        PodTracking {
            impression_urls: vec!["https://t/imp1".to_string(), "https://t/imp2".to_string()],
            tracking_events: vec![
                TrackingEvent { event: "start".to_string(), url: "https://t/start".to_string() },
                TrackingEvent { event: "complete".to_string(), url: "https://t/complete".to_string() },
            ],
            error_urls: vec!["https://t/error".to_string()],
        }
    }

    #[test]
    fn impression_message_bundles_all_urls() {
        let msg = impression_message(&tracking(), "ad-1", "ch:demo", BeaconMetadata::default()).unwrap();
        assert_eq!(msg.event, BeaconEvent::Impression);
        assert_eq!(msg.tracker_urls.len(), 2);
    }

    #[test]
    fn segment_messages_fire_start_on_first_segment() {
        let messages = segment_messages(&tracking(), "ad-1", "ch:demo", 0, 4, BeaconMetadata::default());
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].event, BeaconEvent::Start);
    }

    #[test]
    fn segment_messages_fire_complete_on_last_segment() {
        let messages = segment_messages(&tracking(), "ad-1", "ch:demo", 3, 4, BeaconMetadata::default());
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].event, BeaconEvent::Complete);
    }

    #[test]
    fn no_impression_message_when_pod_has_no_impression_urls() {
        let empty = PodTracking::default();
        assert!(impression_message(&empty, "ad-1", "ch:demo", BeaconMetadata::default()).is_none());
    }
}
