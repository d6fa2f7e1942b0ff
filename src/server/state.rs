use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;

use crate::beacon::BeaconPipeline;
use crate::config::{ChannelConfigSource, Config, StateStoreKind, StaticChannelConfigSource};
use crate::coordinator::{ChannelCoordinator, ChannelRegistry};
use crate::decision::{DecisionEngine, PodStore, VastResolver};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Shared HTTP client for connection pooling; used for origin fetches,
    /// VAST resolution, pod-store lookups, and beacon dispatch.
    pub http_client: Client,
    pub channel_source: Arc<dyn ChannelConfigSource>,
    pub coordinator: ChannelCoordinator,
    pub beacon: BeaconPipeline,
    /// Exposed directly (beyond the copy the decision engine owns) so the
    /// manual-cue endpoint can resolve a `pod_id` without going through the
    /// full waterfall.
    pub pod_store: PodStore,
    pub started_at: Instant,
}

impl AppState {
    /// Builds the full collaborator graph (§4/§6) from a loaded [`Config`]:
    /// the channel registry's storage backend, the decision engine's VAST
    /// resolver and pod store, the coordinator wrapping both, and the beacon
    /// pipeline's background dispatcher.
    pub async fn new(config: Config) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .expect("failed to build HTTP client");

        let state_ttl = Duration::from_secs(config.state_ttl_secs);
        let registry = match config.state_store {
            StateStoreKind::Memory => ChannelRegistry::new_memory(state_ttl),
            #[cfg(feature = "valkey")]
            StateStoreKind::Valkey => {
                let url = config.valkey_url.as_deref().expect("VALKEY_URL is required when STATE_STORE=valkey");
                ChannelRegistry::new_valkey(url, state_ttl).await.expect("failed to connect to Valkey")
            }
            #[cfg(not(feature = "valkey"))]
            StateStoreKind::Valkey => {
                panic!("STATE_STORE=valkey requires the 'valkey' feature flag");
            }
        };

        let vast_resolver = VastResolver::new(http_client.clone());
        let pod_store =
            PodStore::new(http_client.clone(), config.pod_store_base_url.clone(), config.pod_store_prefix.clone());
        let decision_engine = DecisionEngine::new(vast_resolver, pod_store.clone());
        let coordinator = ChannelCoordinator::new(registry, decision_engine);

        let beacon =
            BeaconPipeline::spawn(http_client.clone(), crate::beacon::DEFAULT_DEDUP_TTL, crate::beacon::DEFAULT_RETRY_DELAYS.to_vec());

        let channel_source: Arc<dyn ChannelConfigSource> =
            Arc::new(StaticChannelConfigSource::new(config.default_channel.clone()));

        Self {
            config: Arc::new(config),
            http_client,
            channel_source,
            coordinator,
            beacon,
            pod_store,
            started_at: Instant::now(),
        }
    }
}
