use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::core::state::AppState;

/// POST /api/v2/auth/login
///
/// Authentication is stubbed: every login succeeds and receives the
/// process-wide SID cookie. Credentials in the body are ignored, so the
/// body is never read.
pub async fn login(State(state): State<Arc<AppState>>) -> Response {
    let cookie = format!("SID={}; HttpOnly; path=/", state.session_cookie);
    (StatusCode::OK, [(header::SET_COOKIE, cookie)]).into_response()
}

/// POST /api/v2/auth/logout
///
/// Some clients send this request without a Content-Type header, so the
/// handler deliberately binds nothing from the body.
pub async fn logout() -> StatusCode {
    StatusCode::OK
}
