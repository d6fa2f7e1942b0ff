//! Asynchronous beacon pipeline (C5): at-least-once HTTP dispatch of
//! impression/quartile/error trackers, deduplicated and retried independently
//! of the viewer request that triggered them (§4.5). `enqueue` never blocks
//! the manifest-rewrite path; failures here are logged and DLQ'd, never
//! surfaced as a viewer-facing error.

pub mod dedup;
pub mod dispatch;
pub mod producer;
pub mod types;

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use reqwest::Client;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::metrics;
pub use dedup::{DedupStore, DEFAULT_DEDUP_TTL};
pub use dispatch::{dispatch_url, DispatchOutcome, DEFAULT_RETRY_DELAYS};
pub use producer::{error_message, impression_message, segment_messages};
pub use types::{BeaconEvent, BeaconMessage, BeaconMetadata};

/// A beacon that exhausted its retry budget, recorded for operator
/// inspection rather than dropped silently.
#[derive(Debug, Clone)]
pub struct DlqEntry {
    pub event: BeaconEvent,
    pub ad_id: String,
    pub channel_key: String,
    pub url: String,
    pub attempts: usize,
}

/// Producer handle plus the background consumer it feeds. Cloning shares the
/// same queue and dedup store — one pipeline per process, not per channel.
#[derive(Clone)]
pub struct BeaconPipeline {
    sender: mpsc::Sender<BeaconMessage>,
    dlq: Arc<Mutex<Vec<DlqEntry>>>,
}

const QUEUE_CAPACITY: usize = 4096;

impl BeaconPipeline {
    /// Spawns the consumer task and returns a pipeline handle. `retry_delays`
    /// is threaded through so tests can replace the production 30-90s
    /// backoff with near-zero delays.
    pub fn spawn(client: Client, dedup_ttl: Duration, retry_delays: Vec<Duration>) -> Self {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let dlq = Arc::new(Mutex::new(Vec::new()));
        let dedup = DedupStore::new(dedup_ttl);

        tokio::spawn(Self::consume(receiver, client, dedup, retry_delays, dlq.clone()));

        Self { sender, dlq }
    }

    /// Enqueues a message for dispatch. Logs and drops on a full or closed
    /// queue rather than blocking the caller's request path — beacon
    /// delivery is at-least-once for messages that get in, but enqueue
    /// itself is best-effort under backpressure.
    pub fn enqueue(&self, message: BeaconMessage) {
        if let Err(error) = self.sender.try_send(message) {
            warn!(%error, "beacon queue full or closed, dropping message");
        }
    }

    pub fn dlq_len(&self) -> usize {
        self.dlq.lock().expect("dlq mutex poisoned").len()
    }

    pub fn drain_dlq(&self) -> Vec<DlqEntry> {
        std::mem::take(&mut *self.dlq.lock().expect("dlq mutex poisoned"))
    }

    async fn consume(
        mut receiver: mpsc::Receiver<BeaconMessage>,
        client: Client,
        dedup: DedupStore,
        retry_delays: Vec<Duration>,
        dlq: Arc<Mutex<Vec<DlqEntry>>>,
    ) {
        // Same periodic-sweep shape as the session-cleanup task in
        // `server::start` — purge stale dedup entries on a timer rather
        // than on every lookup, so a quiet pipeline doesn't grow unbounded.
        let mut purge_interval = tokio::time::interval(Duration::from_secs(60));

        loop {
            tokio::select! {
                message = receiver.recv() => {
                    let Some(message) = message else { break };
                    if !dedup.check_and_insert(&message.dedup_key(), SystemTime::now()) {
                        info!(dedup_key = %message.dedup_key(), "beacon dispatch: skipping duplicate");
                        continue;
                    }

                    let client = client.clone();
                    let retry_delays = retry_delays.clone();
                    let dlq = dlq.clone();
                    tokio::spawn(async move {
                        Self::dispatch_message(&client, message, &retry_delays, &dlq).await;
                    });
                }
                _ = purge_interval.tick() => {
                    dedup.purge_expired(SystemTime::now());
                }
            }
        }
    }

    async fn dispatch_message(
        client: &Client,
        message: BeaconMessage,
        retry_delays: &[Duration],
        dlq: &Arc<Mutex<Vec<DlqEntry>>>,
    ) {
        for url in &message.tracker_urls {
            let outcome = dispatch_url(client, url, retry_delays).await;
            match outcome {
                DispatchOutcome::Success => metrics::record_beacon_dispatch("success"),
                DispatchOutcome::ClientError => metrics::record_beacon_dispatch("client_error"),
                DispatchOutcome::Exhausted => {
                    metrics::record_beacon_dispatch("dlq");
                    metrics::record_beacon_dlq();
                    dlq.lock().expect("dlq mutex poisoned").push(DlqEntry {
                        event: message.event,
                        ad_id: message.ad_id.clone(),
                        channel_key: message.channel_key.clone(),
                        url: url.clone(),
                        attempts: retry_delays.len() + 1,
                    });
                }
            }
        }
    }
}
