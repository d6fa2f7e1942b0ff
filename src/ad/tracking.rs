use crate::decision::vast::TrackingEvent;
use crate::metrics;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Determine which tracking events should fire for this segment
///
/// Uses "threshold crossing" logic: an event fires on the first segment
/// whose progress crosses the quartile boundary. This ensures all VAST
/// quartile events fire even for short ads (2–3 segments).
///
/// Quartile thresholds: start=0%, firstQuartile=25%, midpoint=50%,
/// thirdQuartile=75%, complete=last segment.
///
/// # Arguments
/// * `segment_index` - Index of the segment being served (0-based)
/// * `total_segments` - Total number of segments in the ad
/// * `tracking_events` - All available tracking events from VAST
///
/// # Returns
/// Vector of tracking events that should fire for this segment
pub fn events_for_segment(
    segment_index: usize,
    total_segments: usize,
    tracking_events: &[TrackingEvent],
) -> Vec<&TrackingEvent> {
    if total_segments == 0 {
        return Vec::new();
    }

    let progress = if total_segments == 1 {
        1.0 // Single segment = 100%
    } else {
        segment_index as f64 / (total_segments - 1) as f64
    };

    // Previous segment's progress (for detecting threshold crossings)
    let prev_progress = if segment_index == 0 || total_segments == 1 {
        -1.0 // Sentinel: no previous segment
    } else {
        (segment_index - 1) as f64 / (total_segments - 1) as f64
    };

    let mut events = Vec::new();

    for event in tracking_events {
        let should_fire = match event.event.as_str() {
            "start" => segment_index == 0,
            "firstQuartile" => progress >= 0.25 && prev_progress < 0.25,
            "midpoint" => progress >= 0.50 && prev_progress < 0.50,
            "thirdQuartile" => progress >= 0.75 && prev_progress < 0.75,
            "complete" => segment_index == total_segments - 1,
            _ => false, // Ignore unknown events
        };

        if should_fire {
            events.push(event);
        }
    }

    events
}

/// Fire a tracking beacon (fire-and-forget)
///
/// Spawns a background task. Does not block the caller.
/// No retries -- best effort as per VAST spec.
///
/// **Concurrency note:** Beacons are spawned via `tokio::spawn` without an
/// explicit concurrency limit. The `reqwest::Client` connection pool provides
/// natural backpressure (default: ~100 idle connections per host). Under peak
/// load with many concurrent ad breaks, this is sufficient. A `Semaphore`-based
/// limit can be added if telemetry shows connection exhaustion.
///
/// # Arguments
/// * `client` - HTTP client for beacon request
/// * `url` - Tracking beacon URL
/// * `event_name` - Name of the event being tracked (for logging/metrics)
pub fn fire_beacon(client: Client, url: String, event_name: String) {
    tokio::spawn(async move {
        match client
            .get(&url)
            .timeout(Duration::from_secs(2))
            .send()
            .await
        {
            Ok(resp) => {
                let status = resp.status();
                debug!("Tracking beacon: {} -> {} ({})", event_name, url, status);
                info!("Tracking beacon: {} ({})", event_name, status);
                metrics::record_tracking_event(&event_name, "success");
            }
            Err(e) => {
                debug!("Tracking beacon URL: {}", url);
                warn!("Tracking beacon failed: {} ({})", event_name, e);
                metrics::record_tracking_event(&event_name, "error");
            }
        }
    });
}

/// Fire impression beacons for an ad
///
/// Impressions are fired when the first segment of an ad is served.
///
/// # Arguments
/// * `client` - HTTP client
/// * `impression_urls` - List of impression tracking URLs from VAST
pub fn fire_impressions(client: Client, impression_urls: &[String]) {
    for url in impression_urls {
        fire_beacon(client.clone(), url.clone(), "impression".to_string());
    }
}

/// Fire error beacon
///
/// Called when VAST fetch or ad segment fetch fails.
///
/// # Arguments
/// * `client` - HTTP client
/// * `error_url` - Error tracking URL from VAST
pub fn fire_error(client: Client, error_url: &str) {
    fire_beacon(client, error_url.to_string(), "error".to_string());
}
