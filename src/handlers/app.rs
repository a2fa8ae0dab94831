use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::Form;
use serde::Deserialize;
use tracing::info;

use crate::api::types::SessionArguments;
use crate::core::error::ProxyError;
use crate::core::state::AppState;
use crate::models::qbit::{Preferences, APP_VERSION, WEB_API_VERSION};

/// Static login page so reverse-proxy health checks and browser previews do
/// not 404.
const LOGIN_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">

<head>
    <meta charset="UTF-8" />
    <meta name="color-scheme" content="light dark" />
    <meta name="description" content="qBittorrent WebUI">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">

    <title>qBittorrent WebUI</title>

    <link rel="icon" type="image/png" href="images/qbittorrent32.png" />
    <link rel="icon" type="image/svg+xml" href="images/qbittorrent-tray.svg" />
    <link rel="stylesheet" type="text/css" href="css/login.css?v=83s5ed" />

    <script defer src="scripts/login.js?locale=en&v=83s5ed"></script>
</head>

<body>
    <noscript id="noscript">
        <h1>JavaScript is required! You must enable JavaScript for the WebUI to work properly</h1>
    </noscript>
    <div id="main">
        <h1>qBittorrent WebUI</h1>
        <div id="logo" class="col">
            <img src="images/qbittorrent-tray.svg" alt="qBittorrent logo" />
        </div>
        <div id="formplace" class="col">
            <form id="loginform">
                <div class="row">
                    <label for="username">Username</label><br />
                    <input type="text" id="username" name="username" autocomplete="username" autofocus required />
                </div>
                <div class="row">
                    <label for="password">Password</label><br />
                    <input type="password" id="password" name="password" autocomplete="current-password" required />
                </div>
                <div class="row">
                    <input type="submit" id="loginButton" value="Log in" />
                </div>
            </form>
        </div>
        <div id="error_msg"></div>
    </div>
</body>

</html>
"#;

/// GET /
pub async fn login_page() -> Html<&'static str> {
    Html(LOGIN_HTML)
}

/// GET /api/v2/app/version
pub async fn version() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], APP_VERSION)
}

/// GET /api/v2/app/webapiVersion
pub async fn webapi_version() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], WEB_API_VERSION)
}

/// GET /api/v2/app/preferences
pub async fn preferences(State(state): State<Arc<AppState>>) -> Result<Response, ProxyError> {
    let session = state.tr.session_get().await?;
    Ok(Json(Preferences::from_session(&session)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct SetPreferencesForm {
    pub json: String,
}

/// The inner JSON accepted under the `json` form key. Zero means
/// "no change" for the port; the banned list is additive, never a replace.
#[derive(Debug, Default, Deserialize)]
pub struct PreferencesPatch {
    #[serde(default)]
    pub listen_port: i64,
    #[serde(rename = "banned_IPs", default)]
    pub banned_ips: String,
}

/// POST /api/v2/app/setPreferences
pub async fn set_preferences(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SetPreferencesForm>,
) -> Result<Response, ProxyError> {
    let patch: PreferencesPatch =
        serde_json::from_str(&form.json).map_err(|err| anyhow::Error::from(err))?;

    if patch.listen_port != 0 {
        let arguments = SessionArguments {
            peer_port: Some(patch.listen_port),
            ..SessionArguments::default()
        };
        state.tr.session_set(arguments).await?;
        info!(listen_port = patch.listen_port, "peer port forwarded to Transmission");
    }

    if !patch.banned_ips.is_empty() {
        let ips: Vec<String> = patch.banned_ips.lines().map(str::to_string).collect();
        let bans = state.bans.clone();
        tokio::task::spawn_blocking(move || bans.ban_ips(&ips))
            .await
            .map_err(|err| anyhow::Error::from(err))??;
    }

    Ok(().into_response())
}
