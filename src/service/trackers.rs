use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Context;
use reqwest::Url;
use tracing::{debug, info};

use crate::api::client::TransmissionClient;
use crate::core::config::TrConfig;
use crate::core::error::ProxyError;

/// Tracker lists longer than this tend to make Transmission reject the
/// update outright.
pub const TRACKER_MAX: usize = 64;

/// Keeper of the effective tracker list.
///
/// The list starts from the configured defaults and is periodically rebuilt
/// from the subscription URL. Publication is a pointer swap: readers hold
/// their snapshot for the duration of one add call. Refresh ticks may
/// overlap; each one publishes a complete list, so the last writer wins.
pub struct TrackerKeeper {
    defaults: Vec<String>,
    sub_url: Option<String>,
    list: RwLock<Arc<Vec<String>>>,
    http: reqwest::Client,
}

impl TrackerKeeper {
    pub fn new(config: &TrConfig) -> Result<Self, anyhow::Error> {
        let defaults = parse_tracker_lines(config.transfer.lines());
        let sub_url = if config.sub_transfer.is_empty() {
            None
        } else {
            Some(config.sub_transfer.clone())
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to create tracker subscription client")?;
        info!(defaults = defaults.len(), subscribed = sub_url.is_some(), "tracker list initialised");
        Ok(Self {
            list: RwLock::new(Arc::new(defaults.clone())),
            defaults,
            sub_url,
            http,
        })
    }

    /// The currently published list.
    pub fn current(&self) -> Arc<Vec<String>> {
        self.list.read().unwrap().clone()
    }

    /// Fetch the subscription and publish defaults + subscribed entries,
    /// capped at [`TRACKER_MAX`]. A fetch failure leaves the previously
    /// published list intact.
    pub async fn refresh(&self) -> Result<usize, ProxyError> {
        let Some(sub_url) = &self.sub_url else {
            return Ok(self.current().len());
        };

        let body = self
            .http
            .get(sub_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .context("tracker subscription fetch failed")?
            .text()
            .await
            .context("tracker subscription body read failed")?;

        let merged = merge_trackers(&self.defaults, body.lines());
        let count = merged.len();
        *self.list.write().unwrap() = Arc::new(merged);
        debug!(count, "tracker list refreshed");
        Ok(count)
    }

    /// Push the current list to every torrent Transmission knows about.
    pub async fn push_all(&self, tr: &TransmissionClient) -> Result<(), ProxyError> {
        let torrents = tr.torrent_get_all().await?;
        let ids: Vec<i64> = torrents.iter().filter_map(|t| t.id).collect();
        if ids.is_empty() {
            return Ok(());
        }
        let list = self.current();
        tr.torrent_set_trackers(ids, &wire_list(&list)).await?;
        Ok(())
    }
}

/// Validate and dedupe tracker lines, preserving first-seen order.
fn parse_tracker_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut trackers = Vec::new();
    for line in lines {
        let candidate = line.trim();
        if candidate.is_empty() {
            continue;
        }
        let Ok(url) = Url::parse(candidate) else {
            continue;
        };
        let canonical = url.to_string();
        if seen.insert(canonical.clone()) {
            trackers.push(canonical);
        }
    }
    trackers
}

/// Defaults first, then subscribed entries, truncated to [`TRACKER_MAX`].
fn merge_trackers<'a>(defaults: &[String], lines: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut merged: Vec<String> = defaults.iter().take(TRACKER_MAX).cloned().collect();
    let mut seen: HashSet<String> = merged.iter().cloned().collect();
    for candidate in parse_tracker_lines(lines) {
        if merged.len() >= TRACKER_MAX {
            break;
        }
        if seen.insert(candidate.clone()) {
            merged.push(candidate);
        }
    }
    merged
}

/// The list as submitted to Transmission: each tracker in its own tier,
/// with a blank entry after every URL. Transmission silently ignores a
/// tracker-list update whose last entry is not an empty string.
pub fn wire_list(trackers: &[String]) -> Vec<String> {
    let mut wire = Vec::with_capacity(trackers.len() * 2);
    for tracker in trackers {
        wire.push(tracker.clone());
        wire.push(String::new());
    }
    wire
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(transfer: &str, sub: &str) -> TrConfig {
        TrConfig {
            rpc_url: "http://127.0.0.1:9091/transmission/rpc".into(),
            request_interval: 5,
            transfer_request_interval: 300,
            sub_transfer: sub.into(),
            transfer: transfer.into(),
            add_torrent_label: String::new(),
        }
    }

    #[test]
    fn test_defaults_parsed_and_deduped() {
        let keeper = TrackerKeeper::new(&config(
            "udp://tracker.example.com:6969/announce\n\
             not a url\n\
             \n\
             udp://tracker.example.com:6969/announce\n\
             https://other.example.org/announce",
            "",
        ))
        .unwrap();
        let list = keeper.current();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0], "udp://tracker.example.com:6969/announce");
        assert_eq!(list[1], "https://other.example.org/announce");
    }

    #[test]
    fn test_merge_caps_at_64_with_defaults_first() {
        let defaults: Vec<String> = (0..10)
            .map(|i| format!("udp://default{i}.example.com/announce"))
            .collect();
        let lines: Vec<String> = (0..100)
            .map(|i| format!("udp://sub{i}.example.com/announce"))
            .collect();
        let merged = merge_trackers(&defaults, lines.iter().map(|s| s.as_str()));
        assert_eq!(merged.len(), TRACKER_MAX);
        // every default entry survives the cap
        for default in &defaults {
            assert!(merged.contains(default));
        }
        assert_eq!(&merged[..10], &defaults[..]);
    }

    #[test]
    fn test_merge_with_oversized_defaults_keeps_first_64() {
        let defaults: Vec<String> = (0..80)
            .map(|i| format!("udp://default{i}.example.com/announce"))
            .collect();
        let merged = merge_trackers(&defaults, std::iter::empty());
        assert_eq!(merged.len(), TRACKER_MAX);
        assert_eq!(&merged[..], &defaults[..TRACKER_MAX]);
    }

    #[test]
    fn test_merge_skips_duplicates_from_subscription() {
        let defaults = vec!["udp://a.example.com/announce".to_string()];
        let merged = merge_trackers(
            &defaults,
            ["udp://a.example.com/announce", "udp://b.example.com/announce"].into_iter(),
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_wire_list_terminates_every_entry_with_blank() {
        let wire = wire_list(&["udp://a.example.com/announce".to_string()]);
        assert_eq!(wire, vec!["udp://a.example.com/announce".to_string(), String::new()]);
        // joined form ends with a blank line, which Transmission requires
        assert!(wire.join("\n").ends_with('\n') || wire.last().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_without_subscription_is_noop() {
        let keeper = TrackerKeeper::new(&config("udp://a.example.com/announce", "")).unwrap();
        let count = keeper.refresh().await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(keeper.current().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_previous_list() {
        // port 9 is discard; the connection will fail fast
        let keeper = TrackerKeeper::new(&config(
            "udp://a.example.com/announce",
            "http://127.0.0.1:9/trackers.txt",
        ))
        .unwrap();
        assert!(keeper.refresh().await.is_err());
        assert_eq!(keeper.current().len(), 1);
    }
}
