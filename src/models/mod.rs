pub mod peer;
pub mod qbit;
pub mod torrent;
