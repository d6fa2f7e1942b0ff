use metrics::{counter, gauge, histogram};
use std::time::Instant;

// ── Metric names ────────────────────────────────────────────────────────

/// Total HTTP requests by endpoint and status
pub const REQUESTS_TOTAL: &str = "cuepoint_requests_total";
/// Request duration in seconds
pub const REQUEST_DURATION: &str = "cuepoint_request_duration_seconds";
/// Currently active channel coordinators (one per (org, channel) with state)
pub const ACTIVE_CHANNELS: &str = "cuepoint_active_channels";
/// Ad breaks detected across all requests
pub const AD_BREAKS_DETECTED: &str = "cuepoint_ad_breaks_detected";
/// VAST requests by result (success, error, timeout, empty)
pub const VAST_REQUESTS: &str = "cuepoint_vast_requests_total";
/// Slate fallback activations
pub const SLATE_FALLBACKS: &str = "cuepoint_slate_fallbacks_total";
/// Origin fetch errors
pub const ORIGIN_FETCH_ERRORS: &str = "cuepoint_origin_fetch_errors_total";
/// Persisted skip count disagreeing with a freshly recomputed one
pub const SKIP_COUNT_MISMATCHES: &str = "cuepoint_skip_count_mismatches_total";
/// Beacon dispatch attempts by terminal result (success, client_error, dlq)
pub const BEACON_DISPATCH: &str = "cuepoint_beacon_dispatch_total";
/// Beacons that exhausted retries and were published to the DLQ
pub const BEACON_DLQ: &str = "cuepoint_beacon_dlq_total";
/// Decision-engine waterfall timeouts
pub const DECISION_TIMEOUTS: &str = "cuepoint_decision_timeouts_total";
/// Requests that hit the per-channel single-writer lock past its timeout
pub const STATE_CONFLICTS: &str = "cuepoint_state_conflicts_total";

// ── Recording helpers ───────────────────────────────────────────────────

/// Record an incoming request
pub fn record_request(endpoint: &str, status: u16) {
    counter!(REQUESTS_TOTAL, "endpoint" => endpoint.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Record request duration
pub fn record_duration(endpoint: &str, start: Instant) {
    let duration = start.elapsed().as_secs_f64();
    histogram!(REQUEST_DURATION, "endpoint" => endpoint.to_string()).record(duration);
}

/// Update active channel-coordinator count
pub fn set_active_channels(count: usize) {
    gauge!(ACTIVE_CHANNELS).set(count as f64);
}

/// Record detected ad breaks
pub fn record_ad_breaks(count: usize) {
    counter!(AD_BREAKS_DETECTED).increment(count as u64);
}

/// Record a VAST request result
pub fn record_vast_request(result: &str) {
    counter!(VAST_REQUESTS, "result" => result.to_string()).increment(1);
}

/// Record a slate fallback activation
pub fn record_slate_fallback() {
    counter!(SLATE_FALLBACKS).increment(1);
}

/// Record an origin fetch error
pub fn record_origin_error() {
    counter!(ORIGIN_FETCH_ERRORS).increment(1);
}

/// Record a skip-count disagreement between persisted and recomputed values
pub fn record_skip_count_mismatch() {
    counter!(SKIP_COUNT_MISMATCHES).increment(1);
}

/// Record a beacon dispatch outcome: "success", "client_error", or "dlq"
pub fn record_beacon_dispatch(result: &str) {
    counter!(BEACON_DISPATCH, "result" => result.to_string()).increment(1);
}

/// Record a beacon exhausting retries and landing in the DLQ
pub fn record_beacon_dlq() {
    counter!(BEACON_DLQ).increment(1);
}

/// Record a decision-engine waterfall timeout
pub fn record_decision_timeout() {
    counter!(DECISION_TIMEOUTS).increment(1);
}

/// Record a request that gave up waiting on the per-channel lock
pub fn record_state_conflict() {
    counter!(STATE_CONFLICTS).increment(1);
}
