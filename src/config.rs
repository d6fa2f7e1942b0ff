use std::env;

/// How the HLS Rewriter should signal ad breaks for a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StitchingMode {
    /// Feature-detect per request (§4.4 insertion mode selection).
    Auto,
    /// Segment replacement with EXT-X-DISCONTINUITY.
    Ssai,
    /// EXT-X-DATERANGE interstitial injection.
    Sgai,
}

impl StitchingMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(StitchingMode::Auto),
            "ssai" => Some(StitchingMode::Ssai),
            "sgai" => Some(StitchingMode::Sgai),
            _ => None,
        }
    }
}

/// Where AdBreakState and beacon-dedup state are persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateStoreKind {
    /// In-process DashMap. Fine for a single instance or tests.
    Memory,
    /// Valkey/Redis-backed, shared across instances (feature = "valkey").
    Valkey,
}

/// Ad provider selection for the Decision Engine's non-VAST branches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdProviderType {
    /// Pre-configured object-store pod, no VAST round trip.
    Static,
    /// VAST waterfall first, falling back to the object-store pod / slate.
    Vast,
}

/// Bitrate ladder detection strategy for a channel's variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitrateLadderMode {
    Auto,
    Manual,
}

/// Per-`(org_slug, channel_slug)` configuration. Owned by the admin
/// collaborator (§6.3) in a real deployment; the core only ever reads it
/// through a [`ChannelConfigSource`] and never mutates it directly.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    pub org_slug: String,
    pub channel_slug: String,
    pub origin_url: String,
    pub mode: StitchingMode,
    pub ad_provider_type: AdProviderType,
    pub vast_endpoint: Option<String>,
    pub ad_pod_base_url: String,
    pub signing_host: Option<String>,
    /// Pod id for the object-store waterfall step (§4.3 step 3). `None`
    /// skips straight from VAST to the slate pod.
    pub default_pod_id: Option<String>,
    pub slate_pod_id: String,
    pub scte35_auto_insert: bool,
    pub time_based_auto_insert: bool,
    pub time_schedule_interval_sec: u32,
    pub default_ad_duration_sec: f32,
    pub ad_segment_duration: f32,
    pub bitrate_ladder: BitrateLadderMode,
    pub tier: u16,
}

/// Read-only source of channel configuration. The real implementation lives
/// behind the admin API (out of scope per §1); this trait is the seam the
/// core codes against, with a single-channel, env-seeded default for local
/// runs and tests.
pub trait ChannelConfigSource: Send + Sync {
    fn get(&self, org_slug: &str, channel_slug: &str) -> Option<ChannelConfig>;
}

/// A fixed single-channel source, configured entirely from the process
/// environment. Stands in for the admin-API-backed source in dev mode and
/// in tests.
pub struct StaticChannelConfigSource {
    channel: ChannelConfig,
}

impl StaticChannelConfigSource {
    pub fn new(channel: ChannelConfig) -> Self {
        Self { channel }
    }
}

impl ChannelConfigSource for StaticChannelConfigSource {
    fn get(&self, org_slug: &str, channel_slug: &str) -> Option<ChannelConfig> {
        if org_slug == self.channel.org_slug && channel_slug == self.channel.channel_slug {
            Some(self.channel.clone())
        } else {
            None
        }
    }
}

/// Process-wide configuration loaded from environment variables.
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub base_url: String,
    pub is_dev: bool,
    pub state_store: StateStoreKind,
    pub valkey_url: Option<String>,
    /// TTL for AdBreakState past its natural `endsAtMs`, in seconds; also
    /// doubles as the durable-KV session TTL for the memory backend's
    /// background reaper.
    pub state_ttl_secs: u64,
    /// Base URL the object-store pod lookup (decision engine step 3/4)
    /// resolves pod descriptors under.
    pub pod_store_base_url: String,
    /// Path prefix under `pod_store_base_url` pod descriptors live at.
    pub pod_store_prefix: String,
    /// The single demo/dev channel. A production deployment would resolve
    /// `ChannelConfig` per request via the admin collaborator instead.
    pub default_channel: ChannelConfig,
    pub auth: AuthConfig,
}

/// Bearer-JWT validation material for the viewer-facing playlist/segment
/// routes (§6.1). Exactly one of the two key types is configured per
/// deployment; `required = false` (the dev-mode default) skips validation
/// entirely rather than rejecting every request with no keys configured.
#[derive(Clone)]
pub struct AuthConfig {
    pub required: bool,
    pub hmac_secret: Option<String>,
    pub rsa_public_key_pem: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("required", &self.required)
            .field("hmac_secret", &self.hmac_secret.as_ref().map(|_| "<redacted>"))
            .field("rsa_public_key_pem", &self.rsa_public_key_pem.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    /// In DEV mode, provides sensible defaults. In PROD mode, most vars are required.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let is_dev = env::var("DEV_MODE")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        let port = if is_dev {
            env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse()?
        } else {
            env::var("PORT")
                .map_err(|_| "PORT is required in production")?
                .parse()?
        };

        let base_url = if is_dev {
            env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
        } else {
            env::var("BASE_URL").map_err(|_| "BASE_URL is required in production")?
        };

        let origin_url = if is_dev {
            env::var("ORIGIN_URL").unwrap_or_else(|_| "https://example.com".to_string())
        } else {
            env::var("ORIGIN_URL").map_err(|_| "ORIGIN_URL is required in production")?
        };

        let state_store = match env::var("STATE_STORE")
            .unwrap_or_else(|_| "memory".to_string())
            .to_lowercase()
            .as_str()
        {
            "valkey" | "redis" => StateStoreKind::Valkey,
            _ => StateStoreKind::Memory,
        };
        let valkey_url = env::var("VALKEY_URL").ok();
        if state_store == StateStoreKind::Valkey && valkey_url.is_none() && !is_dev {
            return Err("VALKEY_URL is required when STATE_STORE=valkey".into());
        }

        let state_ttl_secs = env::var("STATE_TTL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()
            .unwrap_or(300);

        let vast_endpoint = env::var("VAST_ENDPOINT").ok();
        let ad_provider_type = match env::var("AD_PROVIDER_TYPE")
            .unwrap_or_else(|_| "auto".to_string())
            .to_lowercase()
            .as_str()
        {
            "vast" => AdProviderType::Vast,
            "static" => AdProviderType::Static,
            _ => {
                if vast_endpoint.is_some() {
                    AdProviderType::Vast
                } else {
                    AdProviderType::Static
                }
            }
        };

        let mode = env::var("STITCHING_MODE")
            .ok()
            .and_then(|s| StitchingMode::parse(&s))
            .unwrap_or(StitchingMode::Auto);

        let ad_pod_base_url = env::var("AD_POD_BASE_URL")
            .unwrap_or_else(|_| "https://hls.src.tedm.io/content/ts_h264_480p_1s".to_string());

        let ad_segment_duration = env::var("AD_SEGMENT_DURATION")
            .unwrap_or_else(|_| "1.0".to_string())
            .parse()
            .unwrap_or(1.0);

        let slate_pod_id = env::var("SLATE_POD_ID").unwrap_or_else(|_| "default-slate".to_string());

        let default_ad_duration_sec = env::var("DEFAULT_AD_DURATION_SEC")
            .unwrap_or_else(|_| "30.0".to_string())
            .parse()
            .unwrap_or(30.0);

        let default_channel = ChannelConfig {
            org_slug: env::var("DEV_ORG_SLUG").unwrap_or_else(|_| "demo".to_string()),
            channel_slug: env::var("DEV_CHANNEL_SLUG").unwrap_or_else(|_| "demo".to_string()),
            origin_url,
            mode,
            ad_provider_type,
            vast_endpoint,
            ad_pod_base_url,
            signing_host: env::var("SIGNING_HOST").ok(),
            default_pod_id: env::var("DEFAULT_POD_ID").ok(),
            slate_pod_id,
            scte35_auto_insert: env::var("SCTE35_AUTO_INSERT")
                .map(|v| v != "false")
                .unwrap_or(true),
            time_based_auto_insert: env::var("TIME_BASED_AUTO_INSERT")
                .map(|v| v == "true")
                .unwrap_or(false),
            time_schedule_interval_sec: env::var("TIME_SCHEDULE_INTERVAL_SEC")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .unwrap_or(600),
            default_ad_duration_sec,
            ad_segment_duration,
            bitrate_ladder: BitrateLadderMode::Auto,
            tier: 0,
        };

        let pod_store_base_url = env::var("AD_POD_STORE_URL")
            .unwrap_or_else(|_| "https://pods.example.com".to_string());
        let pod_store_prefix = env::var("AD_POD_STORE_PREFIX").unwrap_or_else(|_| "v1/pods".to_string());

        let hmac_secret = env::var("JWT_HMAC_SECRET").ok();
        let rsa_public_key_pem = env::var("JWT_RSA_PUBLIC_KEY_PEM").ok();
        let auth_required = match env::var("AUTH_REQUIRED") {
            Ok(v) => v == "true",
            Err(_) => !is_dev && (hmac_secret.is_some() || rsa_public_key_pem.is_some()),
        };
        if auth_required && hmac_secret.is_none() && rsa_public_key_pem.is_none() {
            return Err("AUTH_REQUIRED=true but neither JWT_HMAC_SECRET nor JWT_RSA_PUBLIC_KEY_PEM is set".into());
        }
        let auth = AuthConfig { required: auth_required, hmac_secret, rsa_public_key_pem };

        Ok(Config {
            port,
            base_url,
            is_dev,
            state_store,
            valkey_url,
            state_ttl_secs,
            pod_store_base_url,
            pod_store_prefix,
            default_channel,
            auth,
        })
    }
}
