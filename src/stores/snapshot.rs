use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::models::torrent::{HistoricalStatistics, Statistics, Torrent};

/// Holder of the torrent table and the session statistics.
///
/// The refresh tick is the single writer: it builds a complete new table and
/// swaps the pointer in one motion. Readers clone the `Arc` and keep a
/// consistent snapshot for the duration of their request; a half-populated
/// table is never observable.
pub struct SnapshotStore {
    torrents: RwLock<Arc<HashMap<String, Torrent>>>,
    statistics: RwLock<Statistics>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            torrents: RwLock::new(Arc::new(HashMap::new())),
            statistics: RwLock::new(Statistics::default()),
        }
    }

    /// Replace the whole torrent table. Never merges.
    pub fn replace_torrents(&self, table: HashMap<String, Torrent>) {
        *self.torrents.write().unwrap() = Arc::new(table);
    }

    /// The current table, shared. Cheap to call from every handler.
    pub fn torrents(&self) -> Arc<HashMap<String, Torrent>> {
        self.torrents.read().unwrap().clone()
    }

    pub fn torrent(&self, hash: &str) -> Option<Torrent> {
        self.torrents.read().unwrap().get(hash).cloned()
    }

    /// Install the persisted totals at startup. Session counters stay zero.
    pub fn install_historical(&self, historical: HistoricalStatistics) {
        let mut stats = self.statistics.write().unwrap();
        stats.total_downloaded = historical.total_downloaded;
        stats.total_uploaded = historical.total_uploaded;
    }

    /// Fold one refresh tick into the session counters and publish the
    /// instantaneous speeds.
    pub fn apply_tick(&self, downloaded: i64, uploaded: i64, download_speed: i64, upload_speed: i64) {
        let mut stats = self.statistics.write().unwrap();
        stats.total_downloaded_session += downloaded;
        stats.total_uploaded_session += uploaded;
        stats.download_speed = download_speed;
        stats.upload_speed = upload_speed;
    }

    pub fn statistics(&self) -> Statistics {
        *self.statistics.read().unwrap()
    }

    /// What the history store should hold right now: persisted totals plus
    /// everything accumulated this session.
    pub fn persistable(&self) -> HistoricalStatistics {
        let stats = self.statistics.read().unwrap();
        HistoricalStatistics {
            total_downloaded: stats.total_downloaded + stats.total_downloaded_session,
            total_uploaded: stats.total_uploaded + stats.total_uploaded_session,
        }
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
