use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::torrent::HistoricalStatistics;

const FILE_NAME: &str = "properties.json";

/// On-disk form of the historical totals.
#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    total_downloaded: i64,
    total_uploaded: i64,
}

/// Write-through store for the two all-time totals, kept as a JSON file in
/// the configuration directory.
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(conf_dir: &Path) -> Self {
        Self {
            path: conf_dir.join(FILE_NAME),
        }
    }

    /// Load the persisted totals, creating the file on first start.
    pub fn load_or_init(&self) -> Result<HistoricalStatistics> {
        if !self.path.exists() {
            let initial = HistoricalStatistics::default();
            self.save(&initial)?;
            return Ok(initial);
        }
        let data = fs::read(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let file: HistoryFile = serde_json::from_slice(&data)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        Ok(HistoricalStatistics {
            total_downloaded: file.total_downloaded,
            total_uploaded: file.total_uploaded,
        })
    }

    /// Durable write-through: write a sibling temp file, then rename over
    /// the target so readers never see a torn file.
    pub fn save(&self, statistics: &HistoricalStatistics) -> Result<()> {
        let file = HistoryFile {
            total_downloaded: statistics.total_downloaded,
            total_uploaded: statistics.total_uploaded,
        };
        let data = serde_json::to_vec_pretty(&file)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        debug!(path = %self.path.display(), "historical statistics saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (HistoryStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!("trp-history-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        (HistoryStore::new(&dir), dir)
    }

    #[test]
    fn test_first_start_creates_zeroed_file() {
        let (store, dir) = temp_store();
        let loaded = store.load_or_init().unwrap();
        assert_eq!(loaded, HistoricalStatistics::default());
        assert!(dir.join(FILE_NAME).exists());
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let (store, dir) = temp_store();
        let stats = HistoricalStatistics {
            total_downloaded: 1_048_576,
            total_uploaded: 2_097_152,
        };
        store.save(&stats).unwrap();
        assert_eq!(store.load_or_init().unwrap(), stats);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_save_replaces_previous_value() {
        let (store, dir) = temp_store();
        store
            .save(&HistoricalStatistics {
                total_downloaded: 1,
                total_uploaded: 1,
            })
            .unwrap();
        let newer = HistoricalStatistics {
            total_downloaded: 10,
            total_uploaded: 20,
        };
        store.save(&newer).unwrap();
        assert_eq!(store.load_or_init().unwrap(), newer);
        // no stray temp file left behind
        assert!(!dir.join("properties.json.tmp").exists());
        fs::remove_dir_all(dir).unwrap();
    }
}
