pub mod app;
pub mod auth;
pub mod download;
pub mod fallback;
pub mod sync;
pub mod torrents;
pub mod transfer;
