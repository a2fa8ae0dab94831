use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::api::client::TransmissionClient;
use crate::core::config::Config;
use crate::security::firewall::Firewall;
use crate::service::bans::BanOrchestrator;
use crate::service::trackers::TrackerKeeper;
use crate::stores::file_cache::TorrentFileCache;
use crate::stores::history::HistoryStore;
use crate::stores::peer_cache::PeerCache;
use crate::stores::snapshot::SnapshotStore;

/// Shared application state handed to every handler and scheduler loop.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    /// Transmission RPC client
    pub tr: Arc<TransmissionClient>,

    /// Kernel packet-filter driver
    pub firewall: Arc<Firewall>,

    /// Ban orchestration on top of the firewall
    pub bans: Arc<BanOrchestrator>,

    /// Torrent table + session statistics, swapped wholesale per tick
    pub snapshot: Arc<SnapshotStore>,

    /// Per-peer rolling counters
    pub peer_cache: Arc<PeerCache>,

    /// Ephemeral .torrent handoff surface
    pub file_cache: Arc<TorrentFileCache>,

    /// Effective tracker list
    pub trackers: Arc<TrackerKeeper>,

    /// Persisted all-time totals
    pub history: Arc<HistoryStore>,

    /// SID value handed out by auth/login, minted once per process
    pub session_cookie: String,
}

impl AppState {
    pub fn new(
        config: Config,
        tr: TransmissionClient,
        firewall: Firewall,
    ) -> Result<Self, anyhow::Error> {
        let firewall = Arc::new(firewall);
        let snapshot = Arc::new(SnapshotStore::new());
        let peer_cache = Arc::new(PeerCache::new());
        let bans = Arc::new(BanOrchestrator::new(
            firewall.clone(),
            snapshot.clone(),
            peer_cache.clone(),
        ));
        let trackers = Arc::new(TrackerKeeper::new(&config.infra.tr)?);
        let history = Arc::new(HistoryStore::new(&config.conf_dir));

        let session_cookie: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        Ok(Self {
            config: Arc::new(config),
            tr: Arc::new(tr),
            firewall,
            bans,
            snapshot,
            peer_cache,
            file_cache: Arc::new(TorrentFileCache::new()),
            trackers,
            history,
            session_cookie,
        })
    }
}
