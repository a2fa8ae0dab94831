use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::Deserialize;
use tracing::info;

use crate::core::error::ProxyError;
use crate::core::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BanPeersForm {
    pub peers: String,
}

/// POST /api/v2/transfer/banPeers
///
/// `peers` is a `|`-separated list of `host:port` or bare `host` entries.
/// Ports are stripped; the hosts feed the additive ban path.
pub async fn ban_peers(
    State(state): State<Arc<AppState>>,
    Form(form): Form<BanPeersForm>,
) -> Result<Response, ProxyError> {
    let ips: Vec<String> = form
        .peers
        .split('|')
        .map(|addr| strip_port(addr).to_string())
        .filter(|host| !host.is_empty())
        .collect();

    info!(peers = ips.len(), "ban request received");
    let bans = state.bans.clone();
    tokio::task::spawn_blocking(move || bans.ban_ips(&ips))
        .await
        .map_err(anyhow::Error::from)??;
    Ok(().into_response())
}

/// Drop a trailing `:port` from an address. Bracketed IPv6 loses the
/// brackets; a bare IPv6 address (more than one colon, no brackets) is
/// passed through untouched.
fn strip_port(addr: &str) -> &str {
    let addr = addr.trim();
    if let Some(rest) = addr.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            return &rest[..end];
        }
    }
    match (addr.find(':'), addr.rfind(':')) {
        (Some(first), Some(last)) if first == last => &addr[..first],
        _ => addr,
    }
}
