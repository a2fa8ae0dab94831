use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::models::peer::PAUSE_TRACK_TICKS;
use crate::security::firewall::{Firewall, FirewallError};
use crate::stores::peer_cache::PeerCache;
use crate::stores::snapshot::SnapshotStore;

/// Ban orchestration on top of the packet-filter driver.
///
/// Callers hand in raw address strings; malformed entries are dropped
/// silently and the rest are canonicalised before they reach the kernel.
/// The firewall serialises concurrent calls internally.
pub struct BanOrchestrator {
    firewall: Arc<Firewall>,
    snapshot: Arc<SnapshotStore>,
    peers: Arc<PeerCache>,
}

impl BanOrchestrator {
    pub fn new(firewall: Arc<Firewall>, snapshot: Arc<SnapshotStore>, peers: Arc<PeerCache>) -> Self {
        Self {
            firewall,
            snapshot,
            peers,
        }
    }

    /// Add the given addresses to the deny sets. Peers of freshly banned
    /// addresses are hidden from peer views for a few reads while the
    /// kernel rule takes effect.
    pub fn ban_ips(&self, raw: &[String]) -> Result<usize, FirewallError> {
        let ips = parse_ips(raw);
        if ips.is_empty() {
            return Ok(0);
        }
        let banned = self.firewall.ban(&ips)?;
        if banned > 0 {
            self.pause_track(&ips);
        }
        debug!(requested = raw.len(), banned, "ban applied");
        Ok(banned)
    }

    pub fn unban_ips(&self, raw: &[String]) -> Result<usize, FirewallError> {
        let ips = parse_ips(raw);
        if ips.is_empty() {
            return Ok(0);
        }
        self.firewall.unban(&ips)
    }

    /// Reconcile the kernel sets to exactly the given list.
    pub fn replace_ban_list(&self, raw: &[String]) -> Result<(), FirewallError> {
        let ips = parse_ips(raw);
        self.firewall.replace(&ips)?;
        self.pause_track(&ips);
        Ok(())
    }

    pub fn clear_all(&self) -> Result<(), FirewallError> {
        self.firewall.clear_all()
    }

    /// Seed the pause-track countdown on every cached peer whose address
    /// was just banned.
    fn pause_track(&self, ips: &[IpAddr]) {
        let banned: HashSet<String> = ips.iter().map(|ip| ip.to_string()).collect();
        let torrents = self.snapshot.torrents();
        for torrent in torrents.values() {
            for key in &torrent.peers {
                if !banned.contains(&key.ip) {
                    continue;
                }
                if let Some(mut peer) = self.peers.get(key) {
                    peer.pause_track_counter = Some(PAUSE_TRACK_TICKS);
                    self.peers.insert(key, peer);
                }
            }
        }
    }
}

/// Parse and canonicalise address strings, silently dropping anything that
/// does not parse.
pub fn parse_ips(raw: &[String]) -> Vec<IpAddr> {
    let mut ips = Vec::with_capacity(raw.len());
    for candidate in raw {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            continue;
        }
        match trimmed.parse::<IpAddr>() {
            Ok(ip) => ips.push(ip),
            Err(_) => warn!(address = trimmed, "dropping unparseable ban address"),
        }
    }
    ips
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::RpcTorrent;
    use crate::models::peer::{Peer, PeerKey};
    use crate::models::torrent::Torrent;
    use crate::security::firewall::NftApply;
    use nftables::schema::Nftables;
    use std::collections::HashMap;

    struct Discard;

    impl NftApply for Discard {
        fn apply(&self, _ruleset: Nftables) -> Result<(), FirewallError> {
            Ok(())
        }
    }

    fn orchestrator() -> (BanOrchestrator, Arc<SnapshotStore>, Arc<PeerCache>, Arc<Firewall>) {
        let firewall = Arc::new(Firewall::new(Box::new(Discard)));
        let snapshot = Arc::new(SnapshotStore::new());
        let peers = Arc::new(PeerCache::new());
        let bans = BanOrchestrator::new(firewall.clone(), snapshot.clone(), peers.clone());
        (bans, snapshot, peers, firewall)
    }

    #[test]
    fn test_parse_drops_malformed() {
        let ips = parse_ips(&[
            "1.2.3.4".into(),
            "not-an-ip".into(),
            "".into(),
            " 2001:db8::1 ".into(),
        ]);
        assert_eq!(ips.len(), 2);
        assert_eq!(ips[0], "1.2.3.4".parse::<IpAddr>().unwrap());
        assert_eq!(ips[1], "2001:db8::1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_ban_partitions_and_counts() {
        let (bans, _, _, firewall) = orchestrator();
        let banned = bans
            .ban_ips(&["1.1.1.1".into(), "2.2.2.2".into(), "2001:db8::1".into(), "junk".into()])
            .unwrap();
        assert_eq!(banned, 3);
        assert_eq!(firewall.banned_v4().len(), 2);
        assert_eq!(firewall.banned_v6().len(), 1);
    }

    #[test]
    fn test_ban_twice_is_idempotent() {
        let (bans, _, _, firewall) = orchestrator();
        assert_eq!(bans.ban_ips(&["1.1.1.1".into()]).unwrap(), 1);
        assert_eq!(bans.ban_ips(&["1.1.1.1".into()]).unwrap(), 0);
        assert_eq!(firewall.banned_count(), 1);
    }

    #[test]
    fn test_replace_then_unban() {
        let (bans, _, _, firewall) = orchestrator();
        bans.ban_ips(&["1.1.1.1".into()]).unwrap();
        bans.replace_ban_list(&["2.2.2.2".into(), "2001:db8::2".into()]).unwrap();
        assert!(!firewall.is_banned(&"1.1.1.1".parse().unwrap()));
        assert!(firewall.is_banned(&"2.2.2.2".parse().unwrap()));
        assert!(firewall.is_banned(&"2001:db8::2".parse().unwrap()));

        bans.unban_ips(&["2.2.2.2".into()]).unwrap();
        assert!(!firewall.is_banned(&"2.2.2.2".parse().unwrap()));
    }

    #[test]
    fn test_clear_all() {
        let (bans, _, _, firewall) = orchestrator();
        bans.ban_ips(&["1.1.1.1".into(), "2001:db8::1".into()]).unwrap();
        bans.clear_all().unwrap();
        assert_eq!(firewall.banned_count(), 0);
    }

    #[test]
    fn test_ban_seeds_pause_track_counter() {
        let (bans, snapshot, peers, _) = orchestrator();

        let hash = "ab".repeat(20);
        let banned_key = PeerKey::new(hash.clone(), "1.1.1.1", 6881);
        let other_key = PeerKey::new(hash.clone(), "9.9.9.9", 6881);
        let mut torrent = Torrent::from_rpc(&RpcTorrent {
            hash_string: Some(hash.clone()),
            ..RpcTorrent::default()
        });
        torrent.peers.insert(banned_key.clone());
        torrent.peers.insert(other_key.clone());
        let mut table = HashMap::new();
        table.insert(hash, torrent);
        snapshot.replace_torrents(table);

        peers.insert(&banned_key, Peer::new("1.1.1.1", 6881, false, "a"));
        peers.insert(&other_key, Peer::new("9.9.9.9", 6881, false, "b"));

        bans.ban_ips(&["1.1.1.1".into()]).unwrap();

        assert_eq!(
            peers.get(&banned_key).unwrap().pause_track_counter,
            Some(PAUSE_TRACK_TICKS)
        );
        assert_eq!(peers.get(&other_key).unwrap().pause_track_counter, None);
    }
}
