use std::collections::HashMap;

use tracing::debug;

use crate::api::client::TransmissionClient;
use crate::api::types::RpcPeer;
use crate::core::error::ProxyError;
use crate::models::peer::{Peer, PeerKey};
use crate::models::torrent::Torrent;
use crate::stores::peer_cache::PeerCache;
use crate::stores::snapshot::SnapshotStore;

/// One refresh tick: pull the full torrent+peer snapshot from Transmission,
/// fold per-peer byte counters, and publish a brand-new torrent table.
///
/// Transmission reports rates, not totals, so each tick contributes
/// `interval_secs * rate` to the counters of every visible peer. The torrent
/// table is replaced wholesale at the end; entries of vanished torrents are
/// simply gone, while their peers age out of the cache.
pub async fn refresh_client_state(
    tr: &TransmissionClient,
    snapshot: &SnapshotStore,
    peers: &PeerCache,
    interval_secs: i64,
) -> Result<(), ProxyError> {
    let rpc_torrents = tr.torrent_get_all().await?;

    let mut downloaded_increment = 0i64;
    let mut uploaded_increment = 0i64;
    let mut download_speed = 0i64;
    let mut upload_speed = 0i64;

    let mut table: HashMap<String, Torrent> = HashMap::with_capacity(rpc_torrents.len());
    for rpc_torrent in &rpc_torrents {
        let mut torrent = Torrent::from_rpc(rpc_torrent);
        if torrent.hash.is_empty() {
            continue;
        }

        for rpc_peer in &rpc_torrent.peers {
            let key = PeerKey::new(torrent.hash.clone(), rpc_peer.address.clone(), rpc_peer.port);

            let interval_downloaded = interval_secs * rpc_peer.rate_to_client;
            let interval_uploaded = interval_secs * rpc_peer.rate_to_peer;
            downloaded_increment += interval_downloaded;
            uploaded_increment += interval_uploaded;
            download_speed += rpc_peer.rate_to_client;
            upload_speed += rpc_peer.rate_to_peer;

            let peer = accumulate(peers.get(&key), rpc_peer, interval_downloaded, interval_uploaded);
            peers.insert(&key, peer);
            torrent.peers.insert(key);
        }

        table.insert(torrent.hash.clone(), torrent);
    }

    snapshot.apply_tick(
        downloaded_increment,
        uploaded_increment,
        download_speed,
        upload_speed,
    );
    snapshot.replace_torrents(table);

    debug!(
        downloaded_increment,
        uploaded_increment, download_speed, upload_speed, "client state refreshed"
    );
    Ok(())
}

/// Fold one observation into a cached peer, or construct a fresh entry for
/// a peer seen for the first time. Cumulative counters only grow.
fn accumulate(
    cached: Option<Peer>,
    rpc_peer: &RpcPeer,
    interval_downloaded: i64,
    interval_uploaded: i64,
) -> Peer {
    let mut peer = cached.unwrap_or_else(|| {
        Peer::new(
            rpc_peer.address.clone(),
            rpc_peer.port,
            rpc_peer.is_utp,
            rpc_peer.client_name.clone(),
        )
    });
    peer.progress = rpc_peer.progress;
    peer.download_speed = rpc_peer.rate_to_client;
    peer.upload_speed = rpc_peer.rate_to_peer;
    peer.downloaded += interval_downloaded;
    peer.uploaded += interval_uploaded;
    peer.flags = rpc_peer.flag_str.clone();
    peer
}

/// The peer view served to HTTP clients for one torrent.
///
/// Freshly banned peers carry a countdown: they stay hidden until it runs
/// out, so ban tooling does not re-submit the whole list while Transmission
/// catches up with the kernel rule. Returns `None` for an unknown hash.
pub fn visible_peers(
    snapshot: &SnapshotStore,
    peers: &PeerCache,
    hash: &str,
) -> Option<Vec<(PeerKey, Peer)>> {
    let torrent = snapshot.torrent(hash)?;

    let mut visible = Vec::with_capacity(torrent.peers.len());
    for key in &torrent.peers {
        let Some(mut peer) = peers.get(key) else {
            continue;
        };

        if let Some(counter) = peer.pause_track_counter {
            let counter = counter - 1;
            if counter > 0 {
                peer.pause_track_counter = Some(counter);
                peers.insert(key, peer);
                continue;
            }
            peer.pause_track_counter = None;
            peers.insert(key, peer.clone());
        }

        if !peer.is_active {
            continue;
        }
        visible.push((key.clone(), peer));
    }
    Some(visible)
}
