//! Per-URL HTTP dispatch with retry/backoff (§4.5): a 2xx is success, 4xx is
//! terminal, 5xx or a network error retries with backoff up to a bounded
//! attempt count before the caller DLQs it. Redirect following (≤ 3 hops) is
//! configured on the shared `reqwest::Client`, not per call.

use std::time::Duration;

use reqwest::Client;
use tracing::warn;

/// Spacing between retry attempts after the first try. Two entries means
/// two retries, matching §4.5's "2 retries, 30-90s delays" example.
pub const DEFAULT_RETRY_DELAYS: [Duration; 2] = [Duration::from_secs(30), Duration::from_secs(90)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success,
    ClientError,
    Exhausted,
}

/// Dispatches a single tracker URL, retrying on 5xx/network error per
/// `retry_delays`. Tests pass near-zero delays to exercise the retry loop
/// without actually waiting tens of seconds.
pub async fn dispatch_url(client: &Client, url: &str, retry_delays: &[Duration]) -> DispatchOutcome {
    let mut attempt = 0usize;
    loop {
        match client.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() || status.is_redirection() {
                    return DispatchOutcome::Success;
                }
                if status.is_client_error() {
                    warn!(url, %status, "beacon dispatch: terminal client error");
                    return DispatchOutcome::ClientError;
                }
                warn!(url, %status, attempt, "beacon dispatch: server error, will retry if attempts remain");
            }
            Err(error) => {
                warn!(url, %error, attempt, "beacon dispatch: network error, will retry if attempts remain");
            }
        }

        if attempt >= retry_delays.len() {
            return DispatchOutcome::Exhausted;
        }
        tokio::time::sleep(retry_delays[attempt]).await;
        attempt += 1;
    }
}
