use bytes::Bytes;
use tracing::{error, info};
use uuid::Uuid;

use crate::api::client::TransmissionClient;
use crate::api::types::TorrentAddPayload;
use crate::core::error::ProxyError;
use crate::models::torrent::AddRequest;
use crate::service::trackers::{wire_list, TrackerKeeper};
use crate::stores::file_cache::TorrentFileCache;

const TORRENT_FILE_SUFFIX: &str = ".torrent";

/// Submit torrents to Transmission and push the current tracker list to the
/// ones that were actually added.
///
/// A failed add is logged and skipped; its (nonexistent) id never reaches
/// the tracker update. The whole call only fails when the tracker push
/// itself fails.
pub async fn add_torrents(
    tr: &TransmissionClient,
    trackers: &TrackerKeeper,
    add_label: &str,
    requests: Vec<AddRequest>,
) -> Result<(), ProxyError> {
    let mut added_ids = Vec::with_capacity(requests.len());
    for request in requests {
        let mut labels = request.labels.unwrap_or_default();
        if !add_label.is_empty() {
            labels.push(add_label.to_string());
        }

        let payload = TorrentAddPayload {
            filename: request.url.clone(),
            download_dir: request.path,
            labels: if labels.is_empty() { None } else { Some(labels) },
            cookies: request.cookie,
            paused: request.paused,
        };
        match tr.torrent_add(payload).await {
            Ok(added) => {
                info!(hash = %added.hash_string, id = added.id, "torrent added");
                added_ids.push(added.id);
            }
            Err(err) => {
                error!(url = %request.url, error = %err, "failed to add torrent");
            }
        }
    }

    if !added_ids.is_empty() {
        let list = trackers.current();
        tr.torrent_set_trackers(added_ids, &wire_list(&list)).await?;
    }
    Ok(())
}

/// Park uploaded .torrent bytes and mint the URL Transmission will fetch
/// them from. Empty payloads are rejected.
pub fn cache_torrent_file(
    files: &TorrentFileCache,
    root_url: &str,
    data: Bytes,
) -> Result<String, ProxyError> {
    if data.is_empty() {
        return Err(ProxyError::not_found("empty torrent file upload"));
    }
    let filename = format!("{}{}", Uuid::new_v4(), TORRENT_FILE_SUFFIX);
    files.insert(filename.clone(), data);
    Ok(format!("{}/download/{}", root_url.trim_end_matches('/'), filename))
}

/// Serve parked bytes back out, once within the TTL window.
pub fn fetch_torrent_file(files: &TorrentFileCache, filename: &str) -> Result<Bytes, ProxyError> {
    files
        .get(filename)
        .ok_or_else(|| ProxyError::not_found("torrent file does not exist"))
}
