use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Multipart, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::core::error::ProxyError;
use crate::core::state::AppState;
use crate::models::qbit::{TorrentInfo, TorrentProperties};
use crate::models::torrent::{AddRequest, TorrentFilter};
use crate::service::torrents::{add_torrents, cache_torrent_file};

const TORRENT_FILE_FIELD_PREFIX: &str = "torrent__";

#[derive(Debug, Default, Deserialize)]
pub struct InfoQuery {
    pub filter: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub hashes: Option<String>,
}

/// GET /api/v2/torrents/info
///
/// The response is assembled by concatenating individually marshalled
/// records into a JSON array literal, so every record keeps its
/// default-valued fields regardless of the encoder in use.
pub async fn info(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InfoQuery>,
) -> Result<Response, ProxyError> {
    let filter = TorrentFilter {
        status: query.filter.filter(|s| !s.is_empty()),
        category: query.category,
        label: query.tag.filter(|s| !s.is_empty()),
        hashes: query
            .hashes
            .filter(|s| !s.is_empty())
            .map(|s| s.split('|').map(str::to_string).collect()),
    };

    let torrents = state.snapshot.torrents();
    let mut selected: Vec<&crate::models::torrent::Torrent> =
        torrents.values().filter(|t| filter.matches(t)).collect();
    selected.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.hash.cmp(&b.hash)));

    let mut body = Vec::with_capacity(selected.len() * 2048 + 2);
    body.push(b'[');
    for (i, torrent) in selected.iter().enumerate() {
        if i > 0 {
            body.push(b',');
        }
        let record = serde_json::to_vec(&TorrentInfo::from_torrent(torrent))
            .map_err(anyhow::Error::from)?;
        body.extend_from_slice(&record);
    }
    body.push(b']');

    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

#[derive(Debug, Deserialize)]
pub struct PropertiesQuery {
    pub hash: String,
}

/// GET /api/v2/torrents/properties
pub async fn properties(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PropertiesQuery>,
) -> Result<Response, ProxyError> {
    let torrent = state
        .snapshot
        .torrent(&query.hash)
        .ok_or_else(|| ProxyError::not_found("torrent hash was not found"))?;
    Ok(Json(TorrentProperties::from_torrent(&torrent)).into_response())
}

/// Everything a multipart add request can carry.
#[derive(Debug, Default)]
struct AddForm {
    urls: String,
    savepath: String,
    cookie: String,
    tags: String,
    category: String,
    paused: String,
    files: BTreeMap<usize, Bytes>,
}

/// POST /api/v2/torrents/add
///
/// multipart/form-data with string fields plus files named `torrent__0`,
/// `torrent__1`, ... in contiguous order. URLs go straight to Transmission;
/// uploaded files are parked in the ephemeral relay and submitted as URLs
/// pointing back at this proxy.
pub async fn add(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, ProxyError> {
    let mut form = AddForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(anyhow::Error::from)?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match name.as_str() {
            "urls" => form.urls = field.text().await.map_err(anyhow::Error::from)?,
            "savepath" => form.savepath = field.text().await.map_err(anyhow::Error::from)?,
            "cookie" => form.cookie = field.text().await.map_err(anyhow::Error::from)?,
            "tags" => form.tags = field.text().await.map_err(anyhow::Error::from)?,
            "category" => form.category = field.text().await.map_err(anyhow::Error::from)?,
            "paused" => form.paused = field.text().await.map_err(anyhow::Error::from)?,
            other => {
                if let Some(index) = parse_file_field(other) {
                    let data = field.bytes().await.map_err(anyhow::Error::from)?;
                    form.files.insert(index, data);
                }
            }
        }
    }

    let requests = build_requests(&state, form)?;
    if requests.is_empty() {
        debug!("add request carried neither URLs nor torrent files");
        return Ok(().into_response());
    }

    add_torrents(
        &state.tr,
        &state.trackers,
        &state.config.infra.tr.add_torrent_label,
        requests,
    )
    .await?;
    Ok(().into_response())
}

fn parse_file_field(name: &str) -> Option<usize> {
    name.strip_prefix(TORRENT_FILE_FIELD_PREFIX)?.parse().ok()
}

fn build_requests(state: &AppState, form: AddForm) -> Result<Vec<AddRequest>, ProxyError> {
    let mut urls: Vec<String> = Vec::new();
    for line in form.urls.lines() {
        let candidate = line.trim();
        if candidate.is_empty() {
            continue;
        }
        if let Ok(url) = Url::parse(candidate) {
            urls.push(url.to_string());
        }
    }

    // No URLs given: relay the uploaded files, in contiguous field order.
    if urls.is_empty() {
        for index in 0..form.files.len() {
            let Some(data) = form.files.get(&index) else {
                break;
            };
            let url = cache_torrent_file(
                &state.file_cache,
                &state.config.trigger.http.root_url,
                data.clone(),
            )?;
            urls.push(url);
        }
    }

    let labels: Option<Vec<String>> = if form.tags.is_empty() {
        None
    } else {
        Some(form.tags.split(',').map(str::to_string).collect())
    };
    let paused = form.paused.trim() == "true";

    Ok(urls
        .into_iter()
        .map(|url| AddRequest {
            url,
            path: (!form.savepath.is_empty()).then(|| form.savepath.clone()),
            labels: labels.clone(),
            category: (!form.category.is_empty()).then(|| form.category.clone()),
            cookie: (!form.cookie.is_empty()).then(|| form.cookie.clone()),
            paused,
        })
        .collect())
}
