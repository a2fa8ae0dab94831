use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::types::RpcTorrent;
use crate::models::peer::PeerKey;

/// Transmission torrent status enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TorrentStatus {
    Stopped,
    CheckWait,
    Check,
    DownloadWait,
    Download,
    SeedWait,
    Seed,
}

impl TorrentStatus {
    pub fn from_rpc(value: i64) -> Self {
        match value {
            1 => TorrentStatus::CheckWait,
            2 => TorrentStatus::Check,
            3 => TorrentStatus::DownloadWait,
            4 => TorrentStatus::Download,
            5 => TorrentStatus::SeedWait,
            6 => TorrentStatus::Seed,
            _ => TorrentStatus::Stopped,
        }
    }
}

/// The merged view of one torrent: what Transmission reports plus the
/// proxy-derived pieces. Rebuilt wholesale on every refresh tick; there is
/// no cross-tick identity.
#[derive(Clone, Debug)]
pub struct Torrent {
    pub hash: String,
    pub name: String,
    pub magnet_uri: String,
    /// Root directory of the torrent content (download dir)
    pub content_path: String,
    /// Path of the .torrent file on the Transmission host
    pub storage_path: String,
    pub labels: Option<Vec<String>>,
    pub creation_date: i64,
    pub added_date: i64,
    pub done_date: Option<i64>,
    pub creator: String,
    pub comment: String,
    pub is_private: bool,
    /// Total size of the files selected for download (bytes)
    pub size_when_done: i64,
    /// Total size including unselected files (bytes)
    pub total_size: i64,
    pub have_valid_size: i64,
    pub piece_size: Option<i64>,
    pub total_wasted: i64,
    pub total_downloaded: i64,
    pub total_uploaded: i64,
    pub file_count: i64,
    pub ratio_limit: Option<f64>,
    /// Seeding idle limit in seconds
    pub seed_time_limit: Option<i64>,
    /// Peer identities seen in the last snapshot, resolved through the
    /// peer cache on read
    pub peers: HashSet<PeerKey>,
    pub peer_count: i64,
    pub max_peer_count: i64,
    pub peer_send_count: i64,
    /// Download progress 0..1
    pub progress: f64,
    pub last_activity: i64,
    pub ratio: f64,
    pub left_until_done: i64,
    pub download_limit: Option<i64>,
    pub download_speed: i64,
    pub downloaded: i64,
    pub upload_limit: Option<i64>,
    pub upload_speed: i64,
    pub uploaded: i64,
    pub time_downloading: Duration,
    pub time_uploading: Duration,
    pub priority: i64,
    pub seeding_time: Duration,
    pub status: TorrentStatus,
}

impl Torrent {
    /// Build the merged view from one Transmission record.
    ///
    /// Sizes wrapped in bit units are converted to bytes here; nothing past
    /// this function sees a bit-unit value. Peers are keyed separately by
    /// the refresh tick.
    pub fn from_rpc(trt: &RpcTorrent) -> Self {
        let have_valid = trt.have_valid.unwrap_or(0);
        let left = trt.left_until_done.unwrap_or(0);
        let progress = if have_valid > 0 {
            (((have_valid - left) as f64) / have_valid as f64).clamp(0.0, 1.0)
        } else if left == 0 && trt.size_when_done.map(|b| b.to_bytes()).unwrap_or(0) > 0 {
            1.0
        } else {
            0.0
        };

        let download_limit = match (trt.download_limited, trt.download_limit) {
            (Some(true), Some(limit)) => Some(limit),
            _ => None,
        };
        let upload_limit = match (trt.upload_limited, trt.upload_limit) {
            (Some(true), Some(limit)) => Some(limit),
            _ => None,
        };

        Self {
            hash: trt.hash_string.clone().unwrap_or_default(),
            name: trt.name.clone().unwrap_or_default(),
            magnet_uri: trt.magnet_link.clone().unwrap_or_default(),
            content_path: trt.download_dir.clone().unwrap_or_default(),
            storage_path: trt.torrent_file.clone().unwrap_or_default(),
            labels: match &trt.labels {
                Some(labels) if !labels.is_empty() => Some(labels.clone()),
                _ => None,
            },
            creation_date: trt.date_created.unwrap_or(0),
            added_date: trt.added_date.unwrap_or(0),
            done_date: trt.done_date.filter(|ts| *ts > 0),
            creator: String::new(),
            comment: trt.comment.clone().unwrap_or_default(),
            is_private: trt.is_private.unwrap_or(false),
            size_when_done: trt.size_when_done.map(|b| b.to_bytes()).unwrap_or(0),
            total_size: trt.total_size.map(|b| b.to_bytes()).unwrap_or(0),
            have_valid_size: have_valid,
            piece_size: trt.piece_size.map(|b| b.to_bytes()),
            total_wasted: trt.corrupt_ever.unwrap_or(0),
            total_downloaded: trt.downloaded_ever.unwrap_or(0),
            total_uploaded: trt.uploaded_ever.unwrap_or(0),
            file_count: trt.file_count.unwrap_or(0),
            ratio_limit: trt.seed_ratio_limit,
            seed_time_limit: trt.seed_idle_limit.map(|minutes| minutes * 60),
            peers: HashSet::new(),
            peer_count: trt.peers_connected.unwrap_or(0),
            max_peer_count: trt.max_connected_peers.unwrap_or(0),
            peer_send_count: trt.peers_sending_to_us.unwrap_or(0),
            progress,
            last_activity: trt.start_date.unwrap_or(0),
            ratio: trt.upload_ratio.unwrap_or(0.0),
            left_until_done: left,
            download_limit,
            download_speed: trt.rate_download.unwrap_or(0),
            downloaded: trt.downloaded_ever.unwrap_or(0),
            upload_limit,
            upload_speed: trt.rate_upload.unwrap_or(0),
            uploaded: trt.uploaded_ever.unwrap_or(0),
            time_downloading: Duration::from_secs(trt.seconds_downloading.unwrap_or(0).max(0) as u64),
            time_uploading: Duration::from_secs(trt.seconds_seeding.unwrap_or(0).max(0) as u64),
            priority: trt.bandwidth_priority.unwrap_or(0),
            seeding_time: Duration::from_secs(trt.seconds_seeding.unwrap_or(0).max(0) as u64),
            status: TorrentStatus::from_rpc(trt.status.unwrap_or(0)),
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels
            .as_deref()
            .map(|labels| labels.iter().any(|l| l == label))
            .unwrap_or(false)
    }
}

/// Session-wide transfer statistics. The two totals come from the history
/// store; the rest reset at process start.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    pub total_downloaded: i64,
    pub total_uploaded: i64,
    pub total_downloaded_session: i64,
    pub total_uploaded_session: i64,
    pub download_speed: i64,
    pub upload_speed: i64,
}

/// The two numbers that survive restarts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalStatistics {
    pub total_downloaded: i64,
    pub total_uploaded: i64,
}

/// One torrent to submit to Transmission.
#[derive(Clone, Debug, Default)]
pub struct AddRequest {
    /// magnet link, remote URL, or an ephemeral-relay URL for an upload
    pub url: String,
    pub path: Option<String>,
    pub labels: Option<Vec<String>>,
    /// qBittorrent category; Transmission has no equivalent, carried but
    /// never forwarded
    pub category: Option<String>,
    pub cookie: Option<String>,
    pub paused: bool,
}

/// Filters accepted by the torrent-list endpoints.
#[derive(Clone, Debug, Default)]
pub struct TorrentFilter {
    /// qBittorrent status filter; accepted, currently matches everything
    pub status: Option<String>,
    pub category: Option<String>,
    pub label: Option<String>,
    pub hashes: Option<Vec<String>>,
}

impl TorrentFilter {
    pub fn matches(&self, torrent: &Torrent) -> bool {
        if let Some(hashes) = &self.hashes {
            if !hashes.iter().any(|h| h == &torrent.hash) {
                return false;
            }
        }
        if let Some(label) = &self.label {
            if !torrent.has_label(label) {
                return false;
            }
        }
        // Torrents never carry a category on the Transmission side, so a
        // non-empty category filter matches nothing.
        if let Some(category) = &self.category {
            if !category.is_empty() {
                return false;
            }
        }
        true
    }
}
