use moka::sync::Cache;

use crate::models::peer::{Peer, PeerKey};

/// Total in-memory budget for peer entries, in weighed bytes.
const PEER_CACHE_BUDGET: u64 = 1 << 20;

/// Bounded map of `(hash, ip, port)` to the proxy's per-peer counters.
///
/// The cache is never authoritative: a miss means "this peer is new this
/// tick", and entries for vanished peers simply age out of the budget.
/// Eviction is admission-controlled (TinyLFU), so a burst of one-shot peers
/// cannot wash out the counters of long-lived ones.
pub struct PeerCache {
    cache: Cache<String, Peer>,
}

impl PeerCache {
    pub fn new() -> Self {
        Self::with_budget(PEER_CACHE_BUDGET)
    }

    pub fn with_budget(budget: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(budget)
            .weigher(|key: &String, peer: &Peer| key.len() as u32 + peer.weight())
            .build();
        Self { cache }
    }

    /// `None` means the peer was not observed before (or was evicted).
    pub fn get(&self, key: &PeerKey) -> Option<Peer> {
        self.cache.get(&key.cache_key())
    }

    pub fn insert(&self, key: &PeerKey, peer: Peer) {
        self.cache.insert(key.cache_key(), peer);
    }

    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PeerCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ip: &str, port: u16) -> PeerKey {
        PeerKey::new("ab".repeat(20), ip, port)
    }

    #[test]
    fn test_miss_is_none() {
        let cache = PeerCache::new();
        assert!(cache.get(&key("10.0.0.1", 6881)).is_none());
    }

    #[test]
    fn test_insert_then_get() {
        let cache = PeerCache::new();
        let k = key("10.0.0.1", 6881);
        let mut peer = Peer::new("10.0.0.1", 6881, false, "client");
        peer.downloaded = 42;
        cache.insert(&k, peer.clone());
        assert_eq!(cache.get(&k), Some(peer));
    }

    #[test]
    fn test_same_ip_different_port_are_distinct() {
        let cache = PeerCache::new();
        let a = key("10.0.0.1", 6881);
        let b = key("10.0.0.1", 6882);
        cache.insert(&a, Peer::new("10.0.0.1", 6881, false, "a"));
        assert!(cache.get(&a).is_some());
        assert!(cache.get(&b).is_none());
    }

    #[test]
    fn test_overwrite_replaces_entry() {
        let cache = PeerCache::new();
        let k = key("10.0.0.1", 6881);
        let mut peer = Peer::new("10.0.0.1", 6881, false, "client");
        cache.insert(&k, peer.clone());
        peer.downloaded = 1000;
        cache.insert(&k, peer.clone());
        assert_eq!(cache.get(&k).unwrap().downloaded, 1000);
    }
}
