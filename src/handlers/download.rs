use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::core::error::ProxyError;
use crate::core::state::AppState;
use crate::service::torrents::fetch_torrent_file;

/// GET /download/{filename}
///
/// Serves ephemeral .torrent bytes back to Transmission exactly while they
/// live in the handoff cache.
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Response, ProxyError> {
    let data = fetch_torrent_file(&state.file_cache, &filename)?;
    let headers = [
        (header::CONTENT_TYPE, "application/x-bittorrent".to_string()),
        (header::ACCEPT_RANGES, "bytes".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={filename}"),
        ),
    ];
    Ok((headers, data).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing;
    use axum::body::Body;
    use axum::http::StatusCode;
    use bytes::Bytes;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_download_serves_cached_bytes_with_headers() {
        let state = testing::state();
        state
            .file_cache
            .insert("abc.torrent".into(), Bytes::from_static(b"d8:announce0:e"));

        let response = download(State(state), Path("abc.torrent".into()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE.as_str()],
            "application/x-bittorrent"
        );
        assert_eq!(response.headers()[header::ACCEPT_RANGES.as_str()], "bytes");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION.as_str()],
            "attachment; filename=abc.torrent"
        );
        let bytes = Body::new(response.into_body()).collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"d8:announce0:e");
    }

    #[tokio::test]
    async fn test_download_missing_file_is_not_found() {
        let state = testing::state();
        let result = download(State(state), Path("missing.torrent".into())).await;
        assert!(matches!(result, Err(ProxyError::ResourceNotExist(_))));
    }
}
