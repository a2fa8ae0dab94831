use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use reqwest::header::HeaderValue;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::api::types::{
    RpcRequest, RpcResponse, RpcTorrent, SessionArguments, SessionGetRequest, TorrentAddPayload,
    TorrentAddResponse, TorrentAdded, TorrentGetRequest, TorrentGetResponse, TorrentSetPayload,
    PREFERENCES_FIELDS, TORRENT_FIELDS,
};

const SESSION_ID_HEADER: &str = "X-Transmission-Session-Id";

/// Highest RPC revision this client speaks.
pub const RPC_VERSION: i64 = 17;
/// Oldest remote revision this client still understands.
pub const RPC_VERSION_MIN: i64 = 14;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport error talking to Transmission: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Transmission RPC returned failure: {0}")]
    Failure(String),

    #[error("Transmission RPC returned an empty arguments object for {0}")]
    EmptyResponse(&'static str),

    #[error(
        "remote Transmission RPC v{remote} (minimum v{remote_minimum}) is incompatible \
         with this client (v{RPC_VERSION}, minimum v{RPC_VERSION_MIN})"
    )]
    IncompatibleVersion { remote: i64, remote_minimum: i64 },
}

/// Thin typed wrapper over the Transmission JSON-RPC endpoint.
///
/// Handles the CSRF session-id handshake transparently: a 409 response
/// carries the id to repeat the call with. Transport errors surface
/// unmodified; cancellation is the caller dropping the future.
pub struct TransmissionClient {
    http: reqwest::Client,
    endpoint: Url,
    session_id: RwLock<Option<HeaderValue>>,
    tag: AtomicI64,
}

impl TransmissionClient {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self, anyhow::Error> {
        let endpoint = Url::parse(rpc_url)?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint,
            session_id: RwLock::new(None),
            tag: AtomicI64::new(1),
        })
    }

    async fn call<A, R>(&self, method: &'static str, arguments: Option<A>) -> Result<R, RpcError>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let tag = self.tag.fetch_add(1, Ordering::Relaxed);
        let body = RpcRequest {
            method,
            arguments,
            tag,
        };

        let mut request = self.http.post(self.endpoint.clone()).json(&body);
        if let Some(session_id) = self.session_id.read().await.clone() {
            request = request.header(SESSION_ID_HEADER, session_id);
        }
        let mut response = request.send().await?;

        if response.status() == StatusCode::CONFLICT {
            let session_id = response
                .headers()
                .get(SESSION_ID_HEADER)
                .cloned()
                .ok_or_else(|| RpcError::Failure("409 without a session id header".into()))?;
            debug!(method, "refreshed Transmission session id");
            *self.session_id.write().await = Some(session_id.clone());
            response = self
                .http
                .post(self.endpoint.clone())
                .json(&body)
                .header(SESSION_ID_HEADER, session_id)
                .send()
                .await?;
        }

        let envelope: RpcResponse<R> = response.error_for_status()?.json().await?;
        if envelope.result != "success" {
            return Err(RpcError::Failure(envelope.result));
        }
        envelope
            .arguments
            .ok_or(RpcError::EmptyResponse(method))
    }

    /// Negotiate the RPC revision with the remote. Called once at startup;
    /// an incompatible remote is fatal to the process.
    pub async fn ensure_compatible(&self) -> Result<i64, RpcError> {
        let args: SessionArguments = self
            .call(
                "session-get",
                Some(SessionGetRequest {
                    fields: &["rpc-version", "rpc-version-minimum"],
                }),
            )
            .await?;
        let remote = args.rpc_version.unwrap_or(0);
        let remote_minimum = args.rpc_version_minimum.unwrap_or(0);
        if remote < RPC_VERSION_MIN || remote_minimum > RPC_VERSION {
            return Err(RpcError::IncompatibleVersion {
                remote,
                remote_minimum,
            });
        }
        info!(remote_rpc_version = remote, "Transmission RPC version negotiated");
        Ok(remote)
    }

    /// Fetch the fixed preference field set.
    pub async fn session_get(&self) -> Result<SessionArguments, RpcError> {
        self.call(
            "session-get",
            Some(SessionGetRequest {
                fields: PREFERENCES_FIELDS,
            }),
        )
        .await
    }

    pub async fn session_set(&self, arguments: SessionArguments) -> Result<(), RpcError> {
        let _: serde_json::Value = self.call("session-set", Some(arguments)).await?;
        Ok(())
    }

    /// Add one torrent by URL. A duplicate counts as added.
    pub async fn torrent_add(&self, payload: TorrentAddPayload) -> Result<TorrentAdded, RpcError> {
        let response: TorrentAddResponse = self.call("torrent-add", Some(payload)).await?;
        response
            .torrent_added
            .or(response.torrent_duplicate)
            .ok_or(RpcError::EmptyResponse("torrent-add"))
    }

    /// Replace the tracker list of the given torrents. `trackers` entries
    /// are joined with newlines; the caller is responsible for the trailing
    /// blank entry Transmission requires before it applies the update.
    pub async fn torrent_set_trackers(&self, ids: Vec<i64>, trackers: &[String]) -> Result<(), RpcError> {
        let payload = TorrentSetPayload {
            ids,
            tracker_list: trackers.join("\n"),
        };
        let _: serde_json::Value = self.call("torrent-set", Some(payload)).await?;
        Ok(())
    }

    /// Full torrent snapshot including embedded peer lists.
    pub async fn torrent_get_all(&self) -> Result<Vec<RpcTorrent>, RpcError> {
        let response: TorrentGetResponse = self
            .call(
                "torrent-get",
                Some(TorrentGetRequest {
                    fields: TORRENT_FIELDS,
                    ids: None,
                }),
            )
            .await?;
        Ok(response.torrents)
    }

    /// Snapshot restricted to the given info-hashes.
    pub async fn torrent_get_by_hashes(&self, hashes: Vec<String>) -> Result<Vec<RpcTorrent>, RpcError> {
        let response: TorrentGetResponse = self
            .call(
                "torrent-get",
                Some(TorrentGetRequest {
                    fields: TORRENT_FIELDS,
                    ids: Some(hashes),
                }),
            )
            .await?;
        Ok(response.torrents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = TransmissionClient::new(
            "http://127.0.0.1:9091/transmission/rpc",
            Duration::from_secs(30),
        );
        assert!(client.is_ok());
    }

    #[test]
    fn test_client_rejects_bad_url() {
        let client = TransmissionClient::new("not a url", Duration::from_secs(30));
        assert!(client.is_err());
    }

    #[test]
    fn test_version_window() {
        // The compatibility rule used by ensure_compatible.
        let compatible = |remote: i64, remote_minimum: i64| {
            !(remote < RPC_VERSION_MIN || remote_minimum > RPC_VERSION)
        };
        assert!(compatible(17, 14));
        assert!(compatible(20, 17));
        assert!(!compatible(13, 1));
        assert!(!compatible(25, 18));
    }

    #[test]
    fn test_request_envelope_shape() {
        let body = RpcRequest {
            method: "session-get",
            arguments: Some(SessionGetRequest {
                fields: &["rpc-version"],
            }),
            tag: 3,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "method": "session-get",
                "arguments": {"fields": ["rpc-version"]},
                "tag": 3
            })
        );
    }
}
