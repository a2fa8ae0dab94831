use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::core::state::AppState;
use crate::handlers;

/// Uploaded .torrent files can outgrow axum's 2 MiB default body cap.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // login page doubles as the health-check surface
        .route("/", get(handlers::app::login_page))
        .route("/api/v2/app/version", get(handlers::app::version))
        .route("/api/v2/app/webapiVersion", get(handlers::app::webapi_version))
        .route("/api/v2/app/preferences", get(handlers::app::preferences))
        .route("/api/v2/app/setPreferences", post(handlers::app::set_preferences))
        .route("/api/v2/auth/login", post(handlers::auth::login))
        .route("/api/v2/auth/logout", post(handlers::auth::logout))
        .route("/api/v2/sync/maindata", get(handlers::sync::maindata))
        .route("/api/v2/sync/torrentPeers", get(handlers::sync::torrent_peers))
        .route("/api/v2/torrents/info", get(handlers::torrents::info))
        .route("/api/v2/torrents/properties", get(handlers::torrents::properties))
        .route("/api/v2/torrents/add", post(handlers::torrents::add))
        .route("/api/v2/transfer/banPeers", post(handlers::transfer::ban_peers))
        // ephemeral .torrent handoff for Transmission
        .route("/download/{filename}", get(handlers::download::download))
        .fallback(handlers::fallback::fallback_handler)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
