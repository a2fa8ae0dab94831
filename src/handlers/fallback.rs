use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// 404 fallback for all unmatched routes.
pub async fn fallback_handler() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}
