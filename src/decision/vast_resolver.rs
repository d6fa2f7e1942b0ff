//! VAST waterfall step: fetches, resolves wrapper chains up to 5 deep, and
//! hydrates an [`AdPod`] from the inline creatives found.
//!
//! Parsed VAST responses are cached content-addressed by URL hash with a
//! 5-minute TTL, so concurrent viewers hitting the same break don't each
//! trigger their own ad-server round trip (§4.3).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use reqwest::Client;
use tracing::{info, warn};

use crate::decision::types::{AdPod, AdPodItem, PodSource, PodTracking};
use crate::decision::vast::{self, VastAdType};
use crate::metrics;

const MAX_WRAPPER_DEPTH: u32 = 5;
const CACHE_TTL: Duration = Duration::from_secs(300);
const REQUEST_TIMEOUT: Duration = Duration::from_millis(2_000);

#[derive(Clone)]
struct CacheEntry {
    pod: AdPod,
    cached_at: Instant,
}

#[derive(Clone)]
pub struct VastResolver {
    http_client: Client,
    cache: Arc<DashMap<u64, CacheEntry>>,
}

impl VastResolver {
    pub fn new(http_client: Client) -> Self {
        Self { http_client, cache: Arc::new(DashMap::new()) }
    }

    fn url_hash(url: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        url.hash(&mut hasher);
        hasher.finish()
    }

    /// Resolves `vast_url` (with `[DURATION]`/`[CACHEBUSTING]` macros already
    /// substituted) into an `AdPod`, filtered to `tier`. Returns `None` when
    /// the waterfall step should move on to the next one.
    pub async fn resolve(&self, vast_url: &str, tier: u8, audio_only: bool) -> Option<AdPod> {
        let key = Self::url_hash(vast_url);
        if let Some(entry) = self.cache.get(&key) {
            if entry.cached_at.elapsed() < CACHE_TTL {
                metrics::record_vast_request("cache_hit");
                return Some(entry.pod.clone());
            }
        }

        let ads = self.fetch_chain(vast_url, 0).await?;
        if ads.is_empty() {
            metrics::record_vast_request("empty");
            return None;
        }

        let mut items = Vec::new();
        let mut tracking = PodTracking::default();

        for ad in ads {
            if let Some(ad_tier) = ad.tier {
                if ad_tier != 0 && ad_tier != tier {
                    continue;
                }
            }
            if let VastAdType::InLine(inline) = ad.ad_type {
                tracking.impression_urls.extend(inline.impression_urls);
                if let Some(err) = inline.error_url {
                    tracking.error_urls.push(err);
                }
                for creative in inline.creatives {
                    let Some(linear) = creative.linear else { continue };
                    tracking.tracking_events.extend(linear.tracking_events.clone());
                    let Some(media_file) = vast::select_best_media_file(&linear.media_files) else { continue };
                    let is_audio_only = media_file.mime_type.starts_with("audio/");
                    items.push(AdPodItem {
                        uri: media_file.url.clone(),
                        bitrate_bps: media_file.bitrate.unwrap_or(0) * 1000,
                        is_audio_only,
                        duration_seconds: linear.duration as f64,
                    });
                }
            }
        }

        if audio_only && !items.iter().any(|i| i.is_audio_only) {
            metrics::record_vast_request("no_audio_only_item");
            return None;
        }

        if items.is_empty() {
            metrics::record_vast_request("empty");
            return None;
        }

        items.sort_by_key(|i| i.bitrate_bps);
        metrics::record_vast_request("success");

        let pod = AdPod { pod_id: format!("vast-{key:x}"), items, tracking, source: PodSource::Vast };
        self.cache.insert(key, CacheEntry { pod: pod.clone(), cached_at: Instant::now() });
        Some(pod)
    }

    fn fetch_chain<'a>(
        &'a self,
        url: &'a str,
        depth: u32,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Option<Vec<vast::VastAd>>> + Send + 'a>> {
        Box::pin(async move {
            if depth > MAX_WRAPPER_DEPTH {
                warn!(depth, "VAST wrapper chain exceeded max depth");
                return None;
            }

            let xml = self.fetch_with_retry(url).await?;
            let response = match vast::parse_vast(&xml) {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "failed to parse VAST XML");
                    return None;
                }
            };

            let mut resolved = Vec::new();
            for ad in response.ads {
                match &ad.ad_type {
                    VastAdType::InLine(_) => resolved.push(ad),
                    VastAdType::Wrapper(wrapper) => {
                        let tag_uri = wrapper.ad_tag_uri.clone();
                        if let Some(mut nested) = self.fetch_chain(&tag_uri, depth + 1).await {
                            resolved.append(&mut nested);
                        }
                    }
                }
            }
            Some(resolved)
        })
    }

    async fn fetch_with_retry(&self, url: &str) -> Option<String> {
        const MAX_ATTEMPTS: u32 = 2;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.http_client.get(url).timeout(REQUEST_TIMEOUT).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp.text().await.ok();
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), attempt, "VAST endpoint returned non-success status");
                }
                Err(e) => {
                    warn!(error = %e, attempt, "VAST request failed");
                }
            }
            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
        None
    }
}

impl std::fmt::Debug for VastResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VastResolver").field("cached_entries", &self.cache.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_hash_is_stable() {
        assert_eq!(VastResolver::url_hash("http://a"), VastResolver::url_hash("http://a"));
        assert_ne!(VastResolver::url_hash("http://a"), VastResolver::url_hash("http://b"));
    }
}
