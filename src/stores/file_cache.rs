use std::time::Duration;

use bytes::Bytes;
use moka::sync::Cache;

/// Budget for pending .torrent uploads, in bytes.
const FILE_CACHE_BUDGET: u64 = 1 << 30;
/// Uploads not fetched by Transmission within this window are dropped.
const FILE_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Short-lived handoff surface for uploaded .torrent files.
///
/// A client uploads a file, the proxy mints a URL pointing back at itself
/// and hands that URL to Transmission's add-by-URL path; Transmission then
/// fetches the bytes from here.
pub struct TorrentFileCache {
    cache: Cache<String, Bytes>,
}

impl TorrentFileCache {
    pub fn new() -> Self {
        Self::with_limits(FILE_CACHE_BUDGET, FILE_CACHE_TTL)
    }

    pub fn with_limits(budget: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(budget)
            .time_to_live(ttl)
            .weigher(|key: &String, data: &Bytes| (key.len() + data.len()) as u32)
            .build();
        Self { cache }
    }

    pub fn insert(&self, filename: String, data: Bytes) {
        self.cache.insert(filename, data);
    }

    pub fn get(&self, filename: &str) -> Option<Bytes> {
        self.cache.get(filename)
    }
}

impl Default for TorrentFileCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_then_get() {
        let cache = TorrentFileCache::new();
        cache.insert("a.torrent".into(), Bytes::from_static(b"d8:announce0:e"));
        assert_eq!(
            cache.get("a.torrent"),
            Some(Bytes::from_static(b"d8:announce0:e"))
        );
    }

    #[test]
    fn test_miss_is_none() {
        let cache = TorrentFileCache::new();
        assert!(cache.get("missing.torrent").is_none());
    }

    #[test]
    fn test_entries_expire() {
        let cache = TorrentFileCache::with_limits(1 << 20, Duration::from_millis(20));
        cache.insert("a.torrent".into(), Bytes::from_static(b"data"));
        assert!(cache.get("a.torrent").is_some());
        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get("a.torrent").is_none());
    }
}
