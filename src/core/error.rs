use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::api::client::RpcError;
use crate::security::firewall::FirewallError;

pub const REASON_RESOURCE_NOT_EXIST: &str = "RESOURCE_NOT_EXIST";
pub const REASON_INTERNAL: &str = "ERR_INTERNAL";

/// Error taxonomy exposed by the HTTP surface.
///
/// Missing torrents, missing cached torrent files, and empty uploads map to
/// `RESOURCE_NOT_EXIST` (404). Transport and kernel errors surface as
/// opaque internal errors (500).
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0}")]
    ResourceNotExist(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Firewall(#[from] FirewallError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ProxyError {
    pub fn not_found(message: impl Into<String>) -> Self {
        ProxyError::ResourceNotExist(message.into())
    }

    fn reason(&self) -> &'static str {
        match self {
            ProxyError::ResourceNotExist(_) => REASON_RESOURCE_NOT_EXIST,
            _ => REASON_INTERNAL,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ProxyError::ResourceNotExist(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub reason: &'static str,
    pub message: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                code: status.as_u16(),
                reason: self.reason(),
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let response = ProxyError::not_found("torrent hash was not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_internal_maps_to_500() {
        let response = ProxyError::Internal(anyhow::anyhow!("boom")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_reason_tags() {
        assert_eq!(
            ProxyError::not_found("x").reason(),
            REASON_RESOURCE_NOT_EXIST
        );
        assert_eq!(
            ProxyError::Internal(anyhow::anyhow!("x")).reason(),
            REASON_INTERNAL
        );
    }
}
