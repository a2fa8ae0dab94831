use std::fmt;

/// How many peer-list reads a freshly banned peer stays hidden for.
///
/// Banning an IP does not make Transmission drop the connection instantly;
/// hiding the peer for a few reads keeps ban tooling from re-submitting the
/// whole list while the kernel rule takes effect.
pub const PAUSE_TRACK_TICKS: i8 = 3;

/// Identity of a remote peer: the torrent it belongs to plus its address.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PeerKey {
    /// 40-hex-char info-hash of the torrent
    pub hash: String,
    /// Canonical string form of the peer address
    pub ip: String,
    /// Peer port
    pub port: u16,
}

impl PeerKey {
    pub fn new(hash: impl Into<String>, ip: impl Into<String>, port: u16) -> Self {
        Self {
            hash: hash.into(),
            ip: ip.into(),
            port,
        }
    }

    /// Key form used by the peer cache.
    pub fn cache_key(&self) -> String {
        format!("{}:{}:{}", self.hash, self.ip, self.port)
    }
}

impl fmt::Display for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.hash, self.ip, self.port)
    }
}

/// Transport the peer connection runs over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionKind {
    Bt,
    Utp,
}

impl ConnectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionKind::Bt => "BT",
            ConnectionKind::Utp => "μTP",
        }
    }
}

/// Per-peer state tracked by the proxy.
///
/// Transmission only reports instantaneous rates; `downloaded` and `uploaded`
/// are accumulated here, one refresh tick at a time, and are monotonic
/// non-decreasing for the lifetime of a cache entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Peer {
    pub ip: String,
    pub port: u16,
    pub connection: ConnectionKind,
    /// Peer ID as reported by the client. Transmission only exposes the
    /// client name, so both fields carry the same value.
    pub peer_id_client: String,
    pub client_name: String,
    /// Download progress of the remote peer, 0..1
    pub progress: f64,
    /// Bytes/s we are receiving from this peer
    pub download_speed: i64,
    /// Cumulative bytes received, proxy-accumulated
    pub downloaded: i64,
    /// Bytes/s we are sending to this peer
    pub upload_speed: i64,
    /// Cumulative bytes sent, proxy-accumulated
    pub uploaded: i64,
    /// Transmission flag string, e.g. "DE"
    pub flags: String,
    /// Countdown hiding the peer right after a ban; see [`PAUSE_TRACK_TICKS`]
    pub pause_track_counter: Option<i8>,
    pub is_active: bool,
}

impl Peer {
    /// A peer as first observed in a Transmission snapshot.
    pub fn new(ip: impl Into<String>, port: u16, is_utp: bool, client_name: impl Into<String>) -> Self {
        let client_name = client_name.into();
        Self {
            ip: ip.into(),
            port,
            connection: if is_utp {
                ConnectionKind::Utp
            } else {
                ConnectionKind::Bt
            },
            peer_id_client: client_name.clone(),
            client_name,
            progress: 0.0,
            download_speed: 0,
            downloaded: 0,
            upload_speed: 0,
            uploaded: 0,
            flags: String::new(),
            pause_track_counter: None,
            is_active: true,
        }
    }

    /// Approximate in-memory cost of this entry, used by the cache weigher.
    pub fn weight(&self) -> u32 {
        let strings = self.ip.len() + self.peer_id_client.len() + self.client_name.len() + self.flags.len();
        (std::mem::size_of::<Peer>() + strings) as u32
    }
}
