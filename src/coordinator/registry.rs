//! Per-`(org_slug, channel_slug)` `AdBreakState` storage, generalized from
//! `session::manager::SessionManager`'s dual-backend pattern.
//!
//! The lock that serializes a channel's read-modify-write (§5) is kept
//! separate from where the state itself is durable: it's inherently
//! process-local even when state is mirrored to Valkey for multi-instance
//! visibility, so every backend gets the same `tokio::sync::Mutex`-per-channel
//! guard from a process-wide map.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[cfg(feature = "valkey")]
use redis::aio::ConnectionManager;
#[cfg(feature = "valkey")]
use tracing::error;

use super::state::AdBreakState;

/// Internal storage backend for durable `AdBreakState`.
#[derive(Clone)]
enum Backend {
    Memory {
        states: Arc<DashMap<String, AdBreakState>>,
    },
    #[cfg(feature = "valkey")]
    Valkey {
        conn: ConnectionManager,
        key_prefix: String,
    },
}

/// Holds a channel's single-writer lock for the duration of one request's
/// state reconciliation. Dropping it releases the lock.
pub struct ChannelLock {
    _guard: OwnedMutexGuard<()>,
}

/// Registry of per-channel ad-break state, same public API regardless of
/// backend.
#[derive(Clone)]
pub struct ChannelRegistry {
    backend: Backend,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    ttl: Duration,
}

impl ChannelRegistry {
    pub fn new_memory(ttl: Duration) -> Self {
        Self { backend: Backend::Memory { states: Arc::new(DashMap::new()) }, locks: Arc::new(DashMap::new()), ttl }
    }

    #[cfg(feature = "valkey")]
    pub async fn new_valkey(url: &str, ttl: Duration) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            backend: Backend::Valkey { conn, key_prefix: "cuepoint:break".to_string() },
            locks: Arc::new(DashMap::new()),
            ttl,
        })
    }

    pub fn channel_key(org_slug: &str, channel_slug: &str) -> String {
        format!("{org_slug}:{channel_slug}")
    }

    /// Acquires the single-writer lock for a channel. Held until the
    /// returned guard is dropped.
    pub async fn lock(&self, channel_key: &str) -> ChannelLock {
        let mutex = self.locks.entry(channel_key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone();
        let guard = mutex.lock_owned().await;
        ChannelLock { _guard: guard }
    }

    pub async fn get(&self, channel_key: &str) -> Option<AdBreakState> {
        match &self.backend {
            Backend::Memory { states } => states.get(channel_key).map(|s| s.clone()),
            #[cfg(feature = "valkey")]
            Backend::Valkey { conn, key_prefix } => {
                let key = format!("{key_prefix}:{channel_key}");
                let mut conn = conn.clone();
                match redis::cmd("GET").arg(&key).query_async::<Option<String>>(&mut conn).await {
                    Ok(Some(json)) => serde_json::from_str(&json).ok(),
                    Ok(None) => None,
                    Err(e) => {
                        error!("Valkey GET failed in coordinator registry: {}", e);
                        None
                    }
                }
            }
        }
    }

    pub async fn put(&self, channel_key: &str, state: AdBreakState) {
        match &self.backend {
            Backend::Memory { states } => {
                states.insert(channel_key.to_string(), state);
            }
            #[cfg(feature = "valkey")]
            Backend::Valkey { conn, key_prefix } => {
                let key = format!("{key_prefix}:{channel_key}");
                let mut conn = conn.clone();
                if let Ok(json) = serde_json::to_string(&state) {
                    let ttl_secs = self.ttl.as_secs();
                    if let Err(e) =
                        redis::cmd("SET").arg(&key).arg(&json).arg("EX").arg(ttl_secs).query_async::<()>(&mut conn).await
                    {
                        error!("Valkey SET failed in coordinator registry: {}", e);
                    }
                }
            }
        }
    }

    pub async fn clear(&self, channel_key: &str) {
        match &self.backend {
            Backend::Memory { states } => {
                states.remove(channel_key);
            }
            #[cfg(feature = "valkey")]
            Backend::Valkey { conn, key_prefix } => {
                let key = format!("{key_prefix}:{channel_key}");
                let mut conn = conn.clone();
                if let Err(e) = redis::cmd("DEL").arg(&key).query_async::<()>(&mut conn).await {
                    error!("Valkey DEL failed in coordinator registry: {}", e);
                }
            }
        }
    }

    /// Count of channels with live state. Memory-only; cheap because the
    /// map is process-local and typically small (one entry per active
    /// channel, not per viewer).
    pub fn active_count(&self) -> usize {
        match &self.backend {
            Backend::Memory { states } => states.len(),
            #[cfg(feature = "valkey")]
            Backend::Valkey { .. } => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::state::CueSource;
    use crate::decision::{AdPod, PodSource, PodTracking};
    use std::time::SystemTime;

    fn pod() -> AdPod {
        AdPod { pod_id: "p".into(), items: Vec::new(), tracking: PodTracking::default(), source: PodSource::Slate }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let registry = ChannelRegistry::new_memory(Duration::from_secs(300));
        let key = ChannelRegistry::channel_key("demo", "demo");
        let state = AdBreakState::new("cue-1".into(), CueSource::Scte35, None, 30.0, pod(), SystemTime::now());
        registry.put(&key, state).await;
        let fetched = registry.get(&key).await.unwrap();
        assert_eq!(fetched.id, "cue-1");
        assert_eq!(registry.active_count(), 1);
    }

    #[tokio::test]
    async fn clear_removes_state() {
        let registry = ChannelRegistry::new_memory(Duration::from_secs(300));
        let key = ChannelRegistry::channel_key("demo", "demo");
        registry.put(&key, AdBreakState::new("cue-1".into(), CueSource::Scte35, None, 30.0, pod(), SystemTime::now())).await;
        registry.clear(&key).await;
        assert!(registry.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn lock_serializes_concurrent_access() {
        let registry = ChannelRegistry::new_memory(Duration::from_secs(300));
        let key = ChannelRegistry::channel_key("demo", "demo");
        let _guard = registry.lock(&key).await;
        // A second lock attempt on the same key would block; dropping
        // _guard at end of scope releases it for the next acquirer.
        drop(_guard);
        let _guard2 = registry.lock(&key).await;
    }
}
