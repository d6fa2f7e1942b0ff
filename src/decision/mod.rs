//! Ad decision waterfall: given a duration, viewer bitrate, variant type,
//! and channel tier, resolves an `AdPod` by trying, in order, a cached
//! decision, VAST, object-store pods, then the channel's slate pod (§4.3).

pub mod pod_store;
pub mod types;
pub mod vast;
pub mod vast_resolver;

use std::time::Duration;

use tracing::{info, warn};

pub use pod_store::PodStore;
pub use types::{AdPod, AdPodItem, DecisionError, DecisionRequest, PodSource, PodTracking, VariantType};
pub use vast_resolver::VastResolver;

use crate::config::ChannelConfig;
use crate::metrics;

const DECISION_TIMEOUT: Duration = Duration::from_millis(150);

#[derive(Clone)]
pub struct DecisionEngine {
    vast_resolver: VastResolver,
    pod_store: PodStore,
}

impl DecisionEngine {
    pub fn new(vast_resolver: VastResolver, pod_store: PodStore) -> Self {
        Self { vast_resolver, pod_store }
    }

    /// Runs the waterfall for a single ad break decision. `cached` is the
    /// AdBreakState's existing decision, if any and still fresh — callers
    /// own the ≤30s freshness check since that's a property of the break,
    /// not of this engine.
    pub async fn decide(
        &self,
        channel: &ChannelConfig,
        request: &DecisionRequest,
        cached: Option<AdPod>,
    ) -> Result<AdPod, DecisionError> {
        if let Some(pod) = cached {
            return Ok(pod);
        }

        let audio_only = matches!(request.variant_type, VariantType::AudioOnly);

        let waterfall = async {
            if let Some(vast_url) = &channel.vast_endpoint {
                let resolved_url = vast_url
                    .replace("[DURATION]", &format!("{}", request.duration_seconds as u32))
                    .replace("[CACHEBUSTING]", &format!("{}", std::process::id()));
                if let Some(pod) = self.vast_resolver.resolve(&resolved_url, request.tier as u8, audio_only).await {
                    info!(channel = %request.channel_key, "resolved ad pod via VAST");
                    return Some(pod);
                }
                warn!(channel = %request.channel_key, "VAST step produced no usable pod, falling through");
            }

            if let Some(pod_id) = &channel.default_pod_id {
                if let Some(pod) = self.pod_store.lookup(pod_id, PodSource::ObjectStore).await {
                    if !audio_only || pod.items.iter().any(|i| i.is_audio_only) {
                        info!(channel = %request.channel_key, "resolved ad pod via object store");
                        return Some(pod);
                    }
                }
                warn!(channel = %request.channel_key, "object-store pod step produced no usable pod, falling through");
            }

            if let Some(pod) = self.pod_store.lookup(&channel.slate_pod_id, PodSource::Slate).await {
                if !audio_only || pod.items.iter().any(|i| i.is_audio_only) {
                    info!(channel = %request.channel_key, "resolved ad pod via slate");
                    metrics::record_slate_fallback();
                    return Some(pod);
                }
            }

            None
        };

        match tokio::time::timeout(DECISION_TIMEOUT, waterfall).await {
            Ok(Some(pod)) => Ok(pod),
            Ok(None) => {
                metrics::record_vast_request("empty");
                Err(DecisionError::Empty)
            }
            Err(_) => {
                metrics::record_decision_timeout();
                Err(DecisionError::Timeout)
            }
        }
    }
}

impl std::fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionEngine").finish_non_exhaustive()
    }
}
