//! Short-lived dedup store for beacon dispatch (§4.5: "deduplicate using
//! dedupKey against a short-lived store (≤ 10 min)"). Same DashMap-plus-TTL
//! shape as `session::manager::SessionManager`'s memory backend, just
//! storing a first-seen timestamp instead of a session record.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Clone)]
pub struct DedupStore {
    seen: Arc<DashMap<String, SystemTime>>,
    ttl: Duration,
}

impl DedupStore {
    pub fn new(ttl: Duration) -> Self {
        Self { seen: Arc::new(DashMap::new()), ttl }
    }

    /// Returns `true` the first time `key` is seen within the TTL window,
    /// `false` for a repeat. Inserts on the first call so the check is
    /// atomic with respect to concurrent dispatch of the same key.
    pub fn check_and_insert(&self, key: &str, now: SystemTime) -> bool {
        match self.seen.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let is_expired = now.duration_since(*entry.get()).unwrap_or_default() >= self.ttl;
                if is_expired {
                    entry.insert(now);
                }
                is_expired
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    pub fn purge_expired(&self, now: SystemTime) {
        let ttl = self.ttl;
        self.seen.retain(|_, seen_at| now.duration_since(*seen_at).unwrap_or_default() < ttl);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_occurrence_is_not_a_duplicate() {
        let store = DedupStore::new(Duration::from_secs(600));
        assert!(store.check_and_insert("ad1:imp:-", SystemTime::now()));
    }

    #[test]
    fn repeat_within_ttl_is_a_duplicate() {
        let store = DedupStore::new(Duration::from_secs(600));
        let now = SystemTime::now();
        assert!(store.check_and_insert("ad1:imp:-", now));
        assert!(!store.check_and_insert("ad1:imp:-", now + Duration::from_secs(30)));
    }

    #[test]
    fn repeat_past_ttl_is_treated_as_new() {
        let store = DedupStore::new(Duration::from_secs(600));
        let now = SystemTime::now();
        assert!(store.check_and_insert("ad1:imp:-", now));
        assert!(store.check_and_insert("ad1:imp:-", now + Duration::from_secs(700)));
    }

    #[test]
    fn purge_expired_drops_stale_entries() {
        let store = DedupStore::new(Duration::from_secs(600));
        let now = SystemTime::now();
        store.check_and_insert("ad1:imp:-", now);
        store.purge_expired(now + Duration::from_secs(700));
        assert_eq!(store.len(), 0);
    }
}
