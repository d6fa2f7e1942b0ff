//! Object-store pod lookup: the third waterfall step, and the path the
//! slate pod (step 4) is required to resolve through too (§4.3).
//!
//! Pods are stored as a JSON variant descriptor at
//! `{base_url}/{prefix}/{pod_id}.json`, listing one entry per rendition.
//! This mirrors the static-provider URL-construction style of
//! `StaticAdProvider`, generalized from a single segment-duration ladder to
//! an explicit rendition list.

use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::decision::types::{AdPod, AdPodItem, PodSource, PodTracking};

#[derive(Debug, Deserialize)]
struct PodDescriptor {
    variants: Vec<PodVariantDescriptor>,
}

#[derive(Debug, Deserialize)]
struct PodVariantDescriptor {
    uri: String,
    bitrate_bps: u32,
    #[serde(default)]
    is_audio_only: bool,
    duration_seconds: f64,
}

#[derive(Clone)]
pub struct PodStore {
    http_client: Client,
    base_url: String,
    prefix: String,
}

impl PodStore {
    pub fn new(http_client: Client, base_url: String, prefix: String) -> Self {
        Self { http_client, base_url, prefix }
    }

    fn descriptor_url(&self, pod_id: &str) -> String {
        format!("{}/{}/{}.json", self.base_url.trim_end_matches('/'), self.prefix.trim_matches('/'), pod_id)
    }

    pub async fn lookup(&self, pod_id: &str, source: PodSource) -> Option<AdPod> {
        let url = self.descriptor_url(pod_id);
        let resp = match self.http_client.get(&url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(pod_id, status = %r.status(), "pod descriptor fetch returned non-success status");
                return None;
            }
            Err(e) => {
                warn!(pod_id, error = %e, "pod descriptor fetch failed");
                return None;
            }
        };

        let descriptor: PodDescriptor = match resp.json().await {
            Ok(d) => d,
            Err(e) => {
                warn!(pod_id, error = %e, "pod descriptor was not valid JSON");
                return None;
            }
        };

        if descriptor.variants.is_empty() {
            warn!(pod_id, "pod descriptor has no variants");
            return None;
        }

        let items = descriptor
            .variants
            .into_iter()
            .map(|v| AdPodItem {
                uri: v.uri,
                bitrate_bps: v.bitrate_bps,
                is_audio_only: v.is_audio_only,
                duration_seconds: v.duration_seconds,
            })
            .collect();

        Some(AdPod { pod_id: pod_id.to_string(), items, tracking: PodTracking::default(), source })
    }
}

impl std::fmt::Debug for PodStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PodStore").field("base_url", &self.base_url).field("prefix", &self.prefix).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_url_joins_cleanly() {
        let store = PodStore::new(Client::new(), "https://pods.example.com/".to_string(), "/v1/pods/".to_string());
        assert_eq!(store.descriptor_url("pod-123"), "https://pods.example.com/v1/pods/pod-123.json");
    }
}
