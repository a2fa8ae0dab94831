use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::api::types::SessionArguments;
use crate::models::peer::Peer;
use crate::models::torrent::{Statistics, Torrent, TorrentStatus};

/// Version strings reported to qBittorrent clients.
pub const APP_VERSION: &str = "v4.6.6.10";
pub const WEB_API_VERSION: &str = "2.8.3";

/// Seconds until the (fictitious) next tracker announce.
const REANNOUNCE_SECS: i64 = 300;

/// Insert a space between every rune of a Transmission flag string,
/// producing qBittorrent's flag format ("DE" becomes "D E").
pub fn spaced_flags(flags: &str) -> String {
    let mut out = String::with_capacity(flags.len() * 2);
    for (i, c) in flags.chars().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push(c);
    }
    out
}

/// Derive the qBittorrent state string for a torrent.
pub fn qb_state(torrent: &Torrent) -> &'static str {
    let done = torrent.left_until_done == 0;
    match torrent.status {
        TorrentStatus::Stopped => {
            if done {
                "pausedUP"
            } else {
                "pausedDL"
            }
        }
        TorrentStatus::CheckWait | TorrentStatus::Check => {
            if done {
                "checkingUP"
            } else {
                "checkingDL"
            }
        }
        TorrentStatus::DownloadWait => "queuedDL",
        TorrentStatus::Download => {
            if torrent.download_speed > 0 {
                "downloading"
            } else {
                "stalledDL"
            }
        }
        TorrentStatus::SeedWait => "queuedUP",
        TorrentStatus::Seed => {
            if torrent.upload_speed > 0 {
                "uploading"
            } else {
                "stalledUP"
            }
        }
    }
}

/// One record of the torrents/info array.
///
/// Every field is concrete: qBittorrent clients check for keys whose values
/// are zero, so nothing here may be skipped during serialization.
#[derive(Clone, Debug, Serialize)]
pub struct TorrentInfo {
    pub added_on: i64,
    pub amount_left: i64,
    pub auto_tmm: bool,
    pub availability: f64,
    pub category: String,
    pub completed: i64,
    pub completion_on: i64,
    pub content_path: String,
    pub dl_limit: i64,
    pub dlspeed: i64,
    pub downloaded: i64,
    pub downloaded_session: i64,
    pub eta: i64,
    pub f_l_piece_prio: bool,
    pub force_start: bool,
    pub hash: String,
    pub is_private: bool,
    pub last_activity: i64,
    pub magnet_uri: String,
    pub max_ratio: f64,
    pub max_seeding_time: i64,
    pub name: String,
    pub num_complete: i64,
    pub num_incomplete: i64,
    pub num_leechs: i64,
    pub num_seeds: i64,
    pub priority: i64,
    pub progress: f64,
    pub ratio: f64,
    pub ratio_limit: f64,
    pub save_path: String,
    pub seeding_time: i64,
    pub seeding_time_limit: i64,
    pub seen_complete: i64,
    pub seq_dl: bool,
    pub size: i64,
    pub state: String,
    pub super_seeding: bool,
    pub tags: String,
    pub time_active: i64,
    pub total_size: i64,
    pub tracker: String,
    pub up_limit: i64,
    pub uploaded: i64,
    pub uploaded_session: i64,
    pub upspeed: i64,
}

impl TorrentInfo {
    pub fn from_torrent(torrent: &Torrent) -> Self {
        let time_active =
            torrent.time_downloading.as_secs() as i64 + torrent.time_uploading.as_secs() as i64;
        Self {
            added_on: torrent.added_date,
            amount_left: torrent.left_until_done,
            auto_tmm: false,
            availability: 0.0,
            category: String::new(),
            completed: torrent.have_valid_size,
            completion_on: torrent.done_date.unwrap_or(-1),
            content_path: torrent.content_path.clone(),
            dl_limit: torrent.download_limit.unwrap_or(0),
            dlspeed: torrent.download_speed,
            downloaded: torrent.downloaded,
            downloaded_session: 0,
            eta: 0,
            f_l_piece_prio: false,
            force_start: false,
            hash: torrent.hash.clone(),
            is_private: torrent.is_private,
            last_activity: torrent.last_activity,
            magnet_uri: torrent.magnet_uri.clone(),
            max_ratio: torrent.ratio_limit.unwrap_or(0.0),
            max_seeding_time: torrent.seed_time_limit.unwrap_or(0),
            name: torrent.name.clone(),
            num_complete: 0,
            num_incomplete: 0,
            num_leechs: 0,
            num_seeds: 0,
            priority: torrent.priority,
            progress: torrent.progress,
            ratio: torrent.ratio,
            ratio_limit: torrent.ratio_limit.unwrap_or(0.0),
            save_path: torrent.storage_path.clone(),
            seeding_time: torrent.seeding_time.as_secs() as i64,
            seeding_time_limit: torrent.seed_time_limit.unwrap_or(-1),
            seen_complete: torrent.done_date.unwrap_or(-1),
            seq_dl: false,
            size: torrent.size_when_done,
            state: qb_state(torrent).to_string(),
            super_seeding: false,
            tags: torrent.labels.as_deref().map(|l| l.join(",")).unwrap_or_default(),
            time_active,
            total_size: torrent.total_size,
            tracker: String::new(),
            up_limit: torrent.upload_limit.unwrap_or(0),
            uploaded: torrent.uploaded,
            uploaded_session: 0,
            upspeed: torrent.upload_speed,
        }
    }
}

/// torrents/properties response.
#[derive(Clone, Debug, Serialize)]
pub struct TorrentProperties {
    pub save_path: String,
    pub creation_date: i64,
    pub addition_date: i64,
    pub comment: String,
    pub created_by: String,
    pub total_size: i64,
    pub piece_size: i64,
    pub total_wasted: i64,
    pub total_uploaded: i64,
    pub total_uploaded_session: i64,
    pub total_downloaded: i64,
    pub total_downloaded_session: i64,
    pub share_ratio: f64,
    pub dl_speed_avg: i64,
    pub dl_speed: i64,
    pub dl_limit: i64,
    pub up_speed_avg: i64,
    pub up_speed: i64,
    pub up_limit: i64,
    pub nb_connections: i64,
    pub nb_connections_limit: i64,
    pub peers: i64,
    pub peers_total: i64,
    pub pieces_have: i64,
    pub pieces_num: i64,
    pub reannounce: i64,
    pub seeds: i64,
    pub seeds_total: i64,
    pub time_elapsed: i64,
    pub eta: i64,
    pub seeding_time: i64,
    pub completion_date: i64,
    pub last_seen: i64,
    pub is_private: bool,
}

impl TorrentProperties {
    pub fn from_torrent(torrent: &Torrent) -> Self {
        let time_elapsed =
            torrent.time_downloading.as_secs() as i64 + torrent.time_uploading.as_secs() as i64;
        Self {
            save_path: torrent.storage_path.clone(),
            creation_date: torrent.creation_date,
            addition_date: torrent.added_date,
            comment: torrent.comment.clone(),
            created_by: torrent.creator.clone(),
            total_size: torrent.total_size,
            piece_size: torrent.piece_size.unwrap_or(0),
            total_wasted: torrent.total_wasted,
            total_uploaded: torrent.total_uploaded,
            total_uploaded_session: 0,
            total_downloaded: torrent.total_downloaded,
            total_downloaded_session: 0,
            share_ratio: torrent.ratio,
            dl_speed_avg: torrent.download_speed,
            dl_speed: torrent.download_speed,
            dl_limit: torrent.download_limit.unwrap_or(-1),
            up_speed_avg: torrent.upload_speed,
            up_speed: torrent.upload_speed,
            up_limit: torrent.upload_limit.unwrap_or(-1),
            nb_connections: torrent.peer_count,
            nb_connections_limit: torrent.max_peer_count,
            peers: torrent.peer_count,
            peers_total: torrent.peer_count,
            pieces_have: torrent.file_count,
            pieces_num: torrent.file_count,
            reannounce: REANNOUNCE_SECS,
            seeds: torrent.peer_send_count,
            seeds_total: torrent.peer_count,
            time_elapsed,
            eta: 0,
            seeding_time: 0,
            completion_date: torrent.done_date.unwrap_or(-1),
            last_seen: torrent.done_date.unwrap_or(-1),
            is_private: torrent.is_private,
        }
    }
}

/// One entry of the sync/torrentPeers map.
#[derive(Clone, Debug, Serialize)]
pub struct PeerEntry {
    pub client: String,
    pub connection: String,
    pub country: String,
    pub country_code: String,
    pub dl_speed: i64,
    pub downloaded: i64,
    pub files: String,
    pub flags: String,
    pub flags_desc: String,
    pub ip: String,
    pub peer_id_client: String,
    pub port: u16,
    pub progress: f64,
    pub relevance: i64,
    pub up_speed: i64,
    pub uploaded: i64,
}

impl PeerEntry {
    pub fn from_peer(peer: &Peer) -> Self {
        Self {
            client: peer.client_name.clone(),
            connection: peer.connection.as_str().to_string(),
            country: String::new(),
            country_code: String::new(),
            dl_speed: peer.download_speed,
            downloaded: peer.downloaded,
            files: String::new(),
            flags: spaced_flags(&peer.flags),
            flags_desc: String::new(),
            ip: peer.ip.clone(),
            peer_id_client: peer.peer_id_client.clone(),
            port: peer.port,
            progress: peer.progress,
            relevance: 0,
            up_speed: peer.upload_speed,
            uploaded: peer.uploaded,
        }
    }
}

/// sync/torrentPeers response.
#[derive(Clone, Debug, Serialize)]
pub struct TorrentPeersResponse {
    pub full_update: bool,
    pub show_flags: bool,
    pub rid: i64,
    pub peers: BTreeMap<String, PeerEntry>,
}

/// Global transfer state embedded in maindata.
#[derive(Clone, Debug, Serialize)]
pub struct ServerState {
    pub alltime_dl: i64,
    pub alltime_ul: i64,
    pub average_time_queue: i64,
    pub connection_status: String,
    pub dht_nodes: i64,
    pub dl_info_data: i64,
    pub dl_info_speed: i64,
    pub dl_rate_limit: i64,
    pub free_space_on_disk: i64,
    pub global_ratio: String,
    pub queued_io_jobs: i64,
    pub queueing: bool,
    pub read_cache_hits: String,
    pub read_cache_overload: String,
    pub refresh_interval: i64,
    pub total_buffers_size: i64,
    pub total_peer_connections: i64,
    pub total_queued_size: i64,
    pub total_wasted_session: i64,
    pub up_info_data: i64,
    pub up_info_speed: i64,
    pub up_rate_limit: i64,
    pub use_alt_speed_limits: bool,
    pub use_subcategories: bool,
    pub write_cache_overload: String,
}

impl ServerState {
    pub fn from_statistics(stats: &Statistics) -> Self {
        Self {
            alltime_dl: stats.total_downloaded + stats.total_downloaded_session,
            alltime_ul: stats.total_uploaded + stats.total_uploaded_session,
            average_time_queue: 0,
            connection_status: String::new(),
            dht_nodes: 0,
            dl_info_data: stats.total_downloaded_session,
            dl_info_speed: stats.download_speed,
            dl_rate_limit: 0,
            free_space_on_disk: 0,
            global_ratio: String::new(),
            queued_io_jobs: 0,
            queueing: false,
            read_cache_hits: String::new(),
            read_cache_overload: String::new(),
            refresh_interval: 0,
            total_buffers_size: 0,
            total_peer_connections: 0,
            total_queued_size: 0,
            total_wasted_session: 0,
            up_info_data: stats.total_uploaded_session,
            up_info_speed: stats.upload_speed,
            up_rate_limit: 0,
            use_alt_speed_limits: false,
            use_subcategories: false,
            write_cache_overload: String::new(),
        }
    }
}

/// sync/maindata response. Always a full update; the proxy does not track
/// response ids.
#[derive(Clone, Debug, Serialize)]
pub struct MainData {
    pub rid: i64,
    pub full_update: bool,
    pub torrents: BTreeMap<String, TorrentInfo>,
    pub torrents_removed: Option<Vec<String>>,
    pub categories: HashMap<String, serde_json::Value>,
    pub categories_removed: Vec<String>,
    pub tags: Vec<String>,
    pub tags_removed: Vec<String>,
    pub server_state: ServerState,
}

/// app/preferences response, translated from the Transmission session.
#[derive(Clone, Debug, Serialize)]
pub struct Preferences {
    pub locale: String,
    pub create_subfolder_enabled: bool,
    pub start_paused_enabled: bool,
    pub auto_delete_mode: i64,
    pub preallocate_all: bool,
    pub incomplete_files_ext: bool,
    pub auto_tmm_enabled: bool,
    pub torrent_changed_tmm_enabled: bool,
    pub save_path_changed_tmm_enabled: bool,
    pub category_changed_tmm_enabled: bool,
    pub save_path: String,
    pub temp_path_enabled: bool,
    pub temp_path: String,
    pub scan_dirs: HashMap<String, String>,
    pub export_dir: String,
    pub export_dir_fin: String,
    pub mail_notification_enabled: bool,
    pub mail_notification_sender: String,
    pub mail_notification_email: String,
    pub mail_notification_smtp: String,
    pub mail_notification_ssl_enabled: bool,
    pub mail_notification_auth_enabled: bool,
    pub mail_notification_username: String,
    pub mail_notification_password: String,
    pub autorun_enabled: bool,
    pub autorun_program: String,
    pub queueing_enabled: bool,
    pub max_active_downloads: i64,
    pub max_active_torrents: i64,
    pub max_active_uploads: i64,
    pub dont_count_slow_torrents: bool,
    pub slow_torrent_dl_rate_threshold: i64,
    pub slow_torrent_ul_rate_threshold: i64,
    pub slow_torrent_inactive_timer: i64,
    pub max_ratio_enabled: bool,
    pub max_ratio: f64,
    pub max_ratio_act: i64,
    pub listen_port: i64,
    pub upnp: bool,
    pub random_port: bool,
    pub dl_limit: i64,
    pub up_limit: i64,
    pub max_connec: i64,
    pub max_connec_per_torrent: i64,
    pub max_uploads: i64,
    pub max_uploads_per_torrent: i64,
}

impl Preferences {
    pub fn from_session(args: &SessionArguments) -> Self {
        let download_queue_enabled = args.download_queue_enabled.unwrap_or(false);
        let seed_queue_enabled = args.seed_queue_enabled.unwrap_or(false);

        let max_active_downloads = if download_queue_enabled {
            args.download_queue_size.unwrap_or(-1)
        } else {
            -1
        };
        let max_active_uploads = if seed_queue_enabled {
            args.seed_queue_size.unwrap_or(-1)
        } else {
            -1
        };
        let mut max_active_torrents = -1;
        if download_queue_enabled || seed_queue_enabled {
            max_active_torrents = 0;
            if max_active_downloads > 0 {
                max_active_torrents += max_active_downloads;
            }
            if max_active_uploads > 0 {
                max_active_torrents += max_active_uploads;
            }
        }

        let alt_speed_enabled = args.alt_speed_enabled.unwrap_or(false);
        let dl_limit = if alt_speed_enabled {
            args.alt_speed_down.unwrap_or(-1)
        } else {
            -1
        };
        let up_limit = if alt_speed_enabled {
            args.alt_speed_up.unwrap_or(-1)
        } else {
            -1
        };

        Self {
            locale: "en_GB".to_string(),
            create_subfolder_enabled: false,
            start_paused_enabled: !args.start_added_torrents.unwrap_or(true),
            auto_delete_mode: 0,
            preallocate_all: false,
            incomplete_files_ext: args.rename_partial_files.unwrap_or(false),
            auto_tmm_enabled: false,
            torrent_changed_tmm_enabled: false,
            save_path_changed_tmm_enabled: false,
            category_changed_tmm_enabled: false,
            save_path: args.download_dir.clone().unwrap_or_default(),
            temp_path_enabled: args.incomplete_dir_enabled.unwrap_or(false),
            temp_path: args.incomplete_dir.clone().unwrap_or_default(),
            scan_dirs: HashMap::new(),
            export_dir: String::new(),
            export_dir_fin: String::new(),
            mail_notification_enabled: false,
            mail_notification_sender: String::new(),
            mail_notification_email: String::new(),
            mail_notification_smtp: String::new(),
            mail_notification_ssl_enabled: false,
            mail_notification_auth_enabled: false,
            mail_notification_username: String::new(),
            mail_notification_password: String::new(),
            autorun_enabled: args.script_torrent_done_enabled.unwrap_or(false),
            autorun_program: args.script_torrent_done_filename.clone().unwrap_or_default(),
            queueing_enabled: false,
            max_active_downloads,
            max_active_torrents,
            max_active_uploads,
            dont_count_slow_torrents: false,
            slow_torrent_dl_rate_threshold: 0,
            slow_torrent_ul_rate_threshold: 0,
            slow_torrent_inactive_timer: 0,
            max_ratio_enabled: args.seed_ratio_limited.unwrap_or(false),
            max_ratio: args.seed_ratio_limit.unwrap_or(0.0),
            max_ratio_act: 0,
            listen_port: args.peer_port.unwrap_or(0),
            upnp: false,
            random_port: args.peer_port_random_on_start.unwrap_or(false),
            dl_limit,
            up_limit,
            max_connec: args.peer_limit_global.unwrap_or(0),
            max_connec_per_torrent: args.peer_limit_per_torrent.unwrap_or(0),
            max_uploads: -1,
            max_uploads_per_torrent: -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{Bits, RpcTorrent};

    fn sample_torrent() -> Torrent {
        let rpc = RpcTorrent {
            hash_string: Some("cd".repeat(20)),
            name: Some("torrent".into()),
            have_valid: Some(100),
            left_until_done: Some(0),
            size_when_done: Some(Bits(800)),
            total_size: Some(Bits(800)),
            status: Some(6),
            rate_upload: Some(42),
            ..RpcTorrent::default()
        };
        Torrent::from_rpc(&rpc)
    }

    #[test]
    fn test_spaced_flags() {
        assert_eq!(spaced_flags("DE"), "D E");
        assert_eq!(spaced_flags("D"), "D");
        assert_eq!(spaced_flags(""), "");
        assert_eq!(spaced_flags("DUI"), "D U I");
    }

    #[test]
    fn test_state_derivation() {
        let mut torrent = sample_torrent();
        assert_eq!(qb_state(&torrent), "uploading");

        torrent.upload_speed = 0;
        assert_eq!(qb_state(&torrent), "stalledUP");

        torrent.status = TorrentStatus::Stopped;
        assert_eq!(qb_state(&torrent), "pausedUP");

        torrent.left_until_done = 10;
        assert_eq!(qb_state(&torrent), "pausedDL");

        torrent.status = TorrentStatus::Download;
        assert_eq!(qb_state(&torrent), "stalledDL");
        torrent.download_speed = 5;
        assert_eq!(qb_state(&torrent), "downloading");
    }

    #[test]
    fn test_torrent_info_emits_zero_fields() {
        let info = TorrentInfo::from_torrent(&sample_torrent());
        let value = serde_json::to_value(&info).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.get("category"), Some(&serde_json::json!("")));
        assert_eq!(obj.get("num_seeds"), Some(&serde_json::json!(0)));
        assert_eq!(obj.get("force_start"), Some(&serde_json::json!(false)));
        assert_eq!(obj.get("eta"), Some(&serde_json::json!(0)));
        // unset done date surfaces as -1, never as a missing key
        assert_eq!(obj.get("completion_on"), Some(&serde_json::json!(-1)));
        assert_eq!(obj.get("seeding_time_limit"), Some(&serde_json::json!(-1)));
    }

    #[test]
    fn test_properties_unlimited_is_minus_one() {
        let props = TorrentProperties::from_torrent(&sample_torrent());
        assert_eq!(props.dl_limit, -1);
        assert_eq!(props.up_limit, -1);
        assert_eq!(props.reannounce, 300);
        assert_eq!(props.completion_date, -1);
    }

    #[test]
    fn test_server_state_totals() {
        let stats = Statistics {
            total_downloaded: 1000,
            total_uploaded: 2000,
            total_downloaded_session: 10,
            total_uploaded_session: 20,
            download_speed: 1,
            upload_speed: 2,
        };
        let state = ServerState::from_statistics(&stats);
        assert_eq!(state.alltime_dl, 1010);
        assert_eq!(state.alltime_ul, 2020);
        assert_eq!(state.dl_info_data, 10);
        assert_eq!(state.up_info_speed, 2);
    }

    #[test]
    fn test_maindata_serializes_removed_as_null() {
        let data = MainData {
            rid: 7,
            full_update: true,
            torrents: BTreeMap::new(),
            torrents_removed: None,
            categories: HashMap::new(),
            categories_removed: Vec::new(),
            tags: Vec::new(),
            tags_removed: Vec::new(),
            server_state: ServerState::from_statistics(&Statistics::default()),
        };
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["torrents_removed"], serde_json::Value::Null);
        assert_eq!(value["full_update"], serde_json::json!(true));
        assert_eq!(value["rid"], serde_json::json!(7));
    }

    #[test]
    fn test_preferences_queue_math() {
        // neither queue configured
        let prefs = Preferences::from_session(&SessionArguments::default());
        assert_eq!(prefs.max_active_downloads, -1);
        assert_eq!(prefs.max_active_uploads, -1);
        assert_eq!(prefs.max_active_torrents, -1);

        // both enabled: torrents cap is the sum
        let both = SessionArguments {
            download_queue_enabled: Some(true),
            download_queue_size: Some(4),
            seed_queue_enabled: Some(true),
            seed_queue_size: Some(6),
            ..SessionArguments::default()
        };
        let prefs = Preferences::from_session(&both);
        assert_eq!(prefs.max_active_downloads, 4);
        assert_eq!(prefs.max_active_uploads, 6);
        assert_eq!(prefs.max_active_torrents, 10);

        // single side enabled still yields that side's cap
        let one = SessionArguments {
            download_queue_enabled: Some(true),
            download_queue_size: Some(4),
            seed_queue_enabled: Some(false),
            ..SessionArguments::default()
        };
        let prefs = Preferences::from_session(&one);
        assert_eq!(prefs.max_active_downloads, 4);
        assert_eq!(prefs.max_active_uploads, -1);
        assert_eq!(prefs.max_active_torrents, 4);
    }

    #[test]
    fn test_preferences_alt_speed_gating() {
        let disabled = SessionArguments {
            alt_speed_enabled: Some(false),
            alt_speed_down: Some(100),
            alt_speed_up: Some(200),
            ..SessionArguments::default()
        };
        let prefs = Preferences::from_session(&disabled);
        assert_eq!(prefs.dl_limit, -1);
        assert_eq!(prefs.up_limit, -1);

        let enabled = SessionArguments {
            alt_speed_enabled: Some(true),
            alt_speed_down: Some(100),
            alt_speed_up: Some(200),
            peer_port: Some(51413),
            ..SessionArguments::default()
        };
        let prefs = Preferences::from_session(&enabled);
        assert_eq!(prefs.dl_limit, 100);
        assert_eq!(prefs.up_limit, 200);
        assert_eq!(prefs.listen_port, 51413);
    }

    #[test]
    fn test_preferences_start_paused_inversion() {
        let args = SessionArguments {
            start_added_torrents: Some(false),
            ..SessionArguments::default()
        };
        assert!(Preferences::from_session(&args).start_paused_enabled);

        let args = SessionArguments {
            start_added_torrents: Some(true),
            ..SessionArguments::default()
        };
        assert!(!Preferences::from_session(&args).start_paused_enabled);
    }
}
