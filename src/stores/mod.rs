pub mod file_cache;
pub mod history;
pub mod peer_cache;
pub mod snapshot;
