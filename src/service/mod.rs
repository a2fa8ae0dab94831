pub mod bans;
pub mod refresh;
pub mod torrents;
pub mod trackers;
