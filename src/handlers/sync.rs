use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use crate::core::error::ProxyError;
use crate::core::state::AppState;
use crate::models::qbit::{MainData, PeerEntry, ServerState, TorrentInfo, TorrentPeersResponse};
use crate::service::refresh::visible_peers;

#[derive(Debug, Deserialize)]
pub struct MainDataQuery {
    #[serde(default)]
    pub rid: i64,
}

/// GET /api/v2/sync/maindata
///
/// Always a full update built from the current snapshot; partial sync is
/// not supported.
pub async fn maindata(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MainDataQuery>,
) -> Result<Response, ProxyError> {
    let torrents = state.snapshot.torrents();
    let mut infos = BTreeMap::new();
    for (hash, torrent) in torrents.iter() {
        infos.insert(hash.clone(), TorrentInfo::from_torrent(torrent));
    }

    let statistics = state.snapshot.statistics();
    let data = MainData {
        rid: query.rid,
        full_update: true,
        torrents: infos,
        torrents_removed: None,
        categories: Default::default(),
        categories_removed: Vec::new(),
        tags: Vec::new(),
        tags_removed: Vec::new(),
        server_state: ServerState::from_statistics(&statistics),
    };
    Ok(Json(data).into_response())
}

#[derive(Debug, Deserialize)]
pub struct TorrentPeersQuery {
    pub hash: String,
    #[serde(default)]
    pub rid: i64,
}

/// GET /api/v2/sync/torrentPeers
///
/// Peer map keys concatenate address and port without a separator, matching
/// what qBittorrent ban tooling expects.
pub async fn torrent_peers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TorrentPeersQuery>,
) -> Result<Response, ProxyError> {
    if hex::decode(&query.hash).map(|raw| raw.len()) != Ok(20) {
        return Err(ProxyError::not_found("invalid torrent hash"));
    }

    let mut peers = BTreeMap::new();
    if let Some(visible) = visible_peers(&state.snapshot, &state.peer_cache, &query.hash) {
        for (key, peer) in visible {
            peers.insert(format!("{}{}", key.ip, key.port), PeerEntry::from_peer(&peer));
        }
    }

    let response = TorrentPeersResponse {
        full_update: true,
        show_flags: true,
        rid: query.rid,
        peers,
    };
    Ok(Json(response).into_response())
}
