use serde::{Deserialize, Serialize};

/// Session fields requested from Transmission. The translator only handles
/// this closed set; open-ended field discovery is deliberately not supported.
pub const PREFERENCES_FIELDS: &[&str] = &[
    "start-added-torrents",
    "rename-partial-files",
    "download-dir",
    "incomplete-dir-enabled",
    "incomplete-dir",
    "script-torrent-done-enabled",
    "script-torrent-done-filename",
    "download-queue-enabled",
    "download-queue-size",
    "seed-queue-enabled",
    "seed-queue-size",
    "seedRatioLimited",
    "seedRatioLimit",
    "peer-port",
    "peer-port-random-on-start",
    "alt-speed-down",
    "alt-speed-enabled",
    "alt-speed-up",
    "peer-limit-global",
    "peer-limit-per-torrent",
    "version",
];

/// A size reported by Transmission in bit units.
///
/// Converted to bytes at the model boundary; code outside `api` never sees
/// bit units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bits(pub i64);

impl Bits {
    pub fn to_bytes(self) -> i64 {
        self.0 / 8
    }
}

/// JSON-RPC request envelope.
#[derive(Debug, Serialize)]
pub struct RpcRequest<T: Serialize> {
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<T>,
    pub tag: i64,
}

/// JSON-RPC response envelope. `result` is `"success"` or an error string.
#[derive(Debug, Deserialize)]
pub struct RpcResponse<T> {
    pub result: String,
    pub arguments: Option<T>,
    #[allow(dead_code)]
    pub tag: Option<i64>,
}

/// The session arguments this proxy reads and writes. Everything is
/// optional: a get only fills the requested fields and a set only sends the
/// populated ones.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionArguments {
    #[serde(rename = "start-added-torrents", skip_serializing_if = "Option::is_none")]
    pub start_added_torrents: Option<bool>,
    #[serde(rename = "rename-partial-files", skip_serializing_if = "Option::is_none")]
    pub rename_partial_files: Option<bool>,
    #[serde(rename = "download-dir", skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<String>,
    #[serde(rename = "incomplete-dir-enabled", skip_serializing_if = "Option::is_none")]
    pub incomplete_dir_enabled: Option<bool>,
    #[serde(rename = "incomplete-dir", skip_serializing_if = "Option::is_none")]
    pub incomplete_dir: Option<String>,
    #[serde(rename = "script-torrent-done-enabled", skip_serializing_if = "Option::is_none")]
    pub script_torrent_done_enabled: Option<bool>,
    #[serde(rename = "script-torrent-done-filename", skip_serializing_if = "Option::is_none")]
    pub script_torrent_done_filename: Option<String>,
    #[serde(rename = "download-queue-enabled", skip_serializing_if = "Option::is_none")]
    pub download_queue_enabled: Option<bool>,
    #[serde(rename = "download-queue-size", skip_serializing_if = "Option::is_none")]
    pub download_queue_size: Option<i64>,
    #[serde(rename = "seed-queue-enabled", skip_serializing_if = "Option::is_none")]
    pub seed_queue_enabled: Option<bool>,
    #[serde(rename = "seed-queue-size", skip_serializing_if = "Option::is_none")]
    pub seed_queue_size: Option<i64>,
    #[serde(rename = "seedRatioLimited", skip_serializing_if = "Option::is_none")]
    pub seed_ratio_limited: Option<bool>,
    #[serde(rename = "seedRatioLimit", skip_serializing_if = "Option::is_none")]
    pub seed_ratio_limit: Option<f64>,
    #[serde(rename = "peer-port", skip_serializing_if = "Option::is_none")]
    pub peer_port: Option<i64>,
    #[serde(rename = "peer-port-random-on-start", skip_serializing_if = "Option::is_none")]
    pub peer_port_random_on_start: Option<bool>,
    #[serde(rename = "alt-speed-down", skip_serializing_if = "Option::is_none")]
    pub alt_speed_down: Option<i64>,
    #[serde(rename = "alt-speed-enabled", skip_serializing_if = "Option::is_none")]
    pub alt_speed_enabled: Option<bool>,
    #[serde(rename = "alt-speed-up", skip_serializing_if = "Option::is_none")]
    pub alt_speed_up: Option<i64>,
    #[serde(rename = "peer-limit-global", skip_serializing_if = "Option::is_none")]
    pub peer_limit_global: Option<i64>,
    #[serde(rename = "peer-limit-per-torrent", skip_serializing_if = "Option::is_none")]
    pub peer_limit_per_torrent: Option<i64>,
    #[serde(rename = "rpc-version", skip_serializing_if = "Option::is_none")]
    pub rpc_version: Option<i64>,
    #[serde(rename = "rpc-version-minimum", skip_serializing_if = "Option::is_none")]
    pub rpc_version_minimum: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionGetRequest {
    pub fields: &'static [&'static str],
}

/// torrent-add arguments. The proxy always adds by URL: uploaded files are
/// routed through the ephemeral relay first.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TorrentAddPayload {
    pub filename: String,
    #[serde(rename = "download-dir", skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies: Option<String>,
    pub paused: bool,
}

#[derive(Debug, Deserialize)]
pub struct TorrentAddResponse {
    #[serde(rename = "torrent-added")]
    pub torrent_added: Option<TorrentAdded>,
    #[serde(rename = "torrent-duplicate")]
    pub torrent_duplicate: Option<TorrentAdded>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TorrentAdded {
    pub id: i64,
    #[serde(rename = "hashString")]
    pub hash_string: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct TorrentSetPayload {
    pub ids: Vec<i64>,
    /// Announce URLs, one per line. Transmission silently ignores the
    /// update unless the list ends with a blank entry.
    #[serde(rename = "trackerList")]
    pub tracker_list: String,
}

#[derive(Debug, Serialize)]
pub struct TorrentGetRequest {
    pub fields: &'static [&'static str],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
}

/// Torrent fields requested on every snapshot poll.
pub const TORRENT_FIELDS: &[&str] = &[
    "id",
    "hashString",
    "name",
    "magnetLink",
    "downloadDir",
    "torrentFile",
    "labels",
    "dateCreated",
    "addedDate",
    "doneDate",
    "comment",
    "isPrivate",
    "sizeWhenDone",
    "totalSize",
    "haveValid",
    "pieceSize",
    "corruptEver",
    "downloadedEver",
    "uploadedEver",
    "file-count",
    "seedRatioLimit",
    "seedIdleLimit",
    "peers",
    "peersConnected",
    "maxConnectedPeers",
    "peersSendingToUs",
    "startDate",
    "uploadRatio",
    "leftUntilDone",
    "downloadLimited",
    "downloadLimit",
    "rateDownload",
    "secondsDownloading",
    "uploadLimited",
    "uploadLimit",
    "rateUpload",
    "secondsSeeding",
    "bandwidthPriority",
    "status",
];

#[derive(Debug, Deserialize)]
pub struct TorrentGetResponse {
    #[serde(default)]
    pub torrents: Vec<RpcTorrent>,
}

/// One torrent as returned by torrent-get.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RpcTorrent {
    pub id: Option<i64>,
    #[serde(rename = "hashString")]
    pub hash_string: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "magnetLink")]
    pub magnet_link: Option<String>,
    #[serde(rename = "downloadDir")]
    pub download_dir: Option<String>,
    #[serde(rename = "torrentFile")]
    pub torrent_file: Option<String>,
    pub labels: Option<Vec<String>>,
    #[serde(rename = "dateCreated")]
    pub date_created: Option<i64>,
    #[serde(rename = "addedDate")]
    pub added_date: Option<i64>,
    #[serde(rename = "doneDate")]
    pub done_date: Option<i64>,
    pub comment: Option<String>,
    #[serde(rename = "isPrivate")]
    pub is_private: Option<bool>,
    #[serde(rename = "sizeWhenDone")]
    pub size_when_done: Option<Bits>,
    #[serde(rename = "totalSize")]
    pub total_size: Option<Bits>,
    #[serde(rename = "haveValid")]
    pub have_valid: Option<i64>,
    #[serde(rename = "pieceSize")]
    pub piece_size: Option<Bits>,
    #[serde(rename = "corruptEver")]
    pub corrupt_ever: Option<i64>,
    #[serde(rename = "downloadedEver")]
    pub downloaded_ever: Option<i64>,
    #[serde(rename = "uploadedEver")]
    pub uploaded_ever: Option<i64>,
    #[serde(rename = "file-count")]
    pub file_count: Option<i64>,
    #[serde(rename = "seedRatioLimit")]
    pub seed_ratio_limit: Option<f64>,
    /// Idle seeding limit, minutes
    #[serde(rename = "seedIdleLimit")]
    pub seed_idle_limit: Option<i64>,
    #[serde(default)]
    pub peers: Vec<RpcPeer>,
    #[serde(rename = "peersConnected")]
    pub peers_connected: Option<i64>,
    #[serde(rename = "maxConnectedPeers")]
    pub max_connected_peers: Option<i64>,
    #[serde(rename = "peersSendingToUs")]
    pub peers_sending_to_us: Option<i64>,
    #[serde(rename = "startDate")]
    pub start_date: Option<i64>,
    #[serde(rename = "uploadRatio")]
    pub upload_ratio: Option<f64>,
    #[serde(rename = "leftUntilDone")]
    pub left_until_done: Option<i64>,
    #[serde(rename = "downloadLimited")]
    pub download_limited: Option<bool>,
    #[serde(rename = "downloadLimit")]
    pub download_limit: Option<i64>,
    #[serde(rename = "rateDownload")]
    pub rate_download: Option<i64>,
    #[serde(rename = "secondsDownloading")]
    pub seconds_downloading: Option<i64>,
    #[serde(rename = "uploadLimited")]
    pub upload_limited: Option<bool>,
    #[serde(rename = "uploadLimit")]
    pub upload_limit: Option<i64>,
    #[serde(rename = "rateUpload")]
    pub rate_upload: Option<i64>,
    #[serde(rename = "secondsSeeding")]
    pub seconds_seeding: Option<i64>,
    #[serde(rename = "bandwidthPriority")]
    pub bandwidth_priority: Option<i64>,
    pub status: Option<i64>,
}

/// One peer embedded in a torrent-get record.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RpcPeer {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub port: u16,
    #[serde(rename = "clientName", default)]
    pub client_name: String,
    #[serde(rename = "flagStr", default)]
    pub flag_str: String,
    #[serde(rename = "isUTP", default)]
    pub is_utp: bool,
    #[serde(default)]
    pub progress: f64,
    /// Bytes/s flowing from the peer to us
    #[serde(rename = "rateToClient", default)]
    pub rate_to_client: i64,
    /// Bytes/s flowing from us to the peer
    #[serde(rename = "rateToPeer", default)]
    pub rate_to_peer: i64,
}
