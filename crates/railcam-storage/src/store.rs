//! JSON array record files.
//!
//! Each write reads the existing array, appends, and replaces the whole file
//! through a temporary sibling and a rename. Concurrent writers to the same
//! file must be serialized by the caller.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};

/// `inference_statistics_{YYYYmmdd_HHMMSS}.json` under `dir`.
pub fn statistics_path(dir: impl AsRef<Path>, started: DateTime<Utc>) -> PathBuf {
    timestamped_path(dir, "inference_statistics", started)
}

/// `grass_events_{YYYYmmdd_HHMMSS}.json` under `dir`.
pub fn grass_events_path(dir: impl AsRef<Path>, started: DateTime<Utc>) -> PathBuf {
    timestamped_path(dir, "grass_events", started)
}

fn timestamped_path(dir: impl AsRef<Path>, prefix: &str, time: DateTime<Utc>) -> PathBuf {
    dir.as_ref()
        .join(format!("{}_{}.json", prefix, time.format("%Y%m%d_%H%M%S")))
}

/// A file holding one JSON array of records.
#[derive(Debug, Clone)]
pub struct JsonArrayStore {
    path: PathBuf,
}

impl JsonArrayStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `entries`, creating the file if needed.
    ///
    /// Returns the number of records in the file afterwards.
    pub async fn append<T: Serialize>(&self, entries: &[T]) -> StorageResult<usize> {
        let mut records = match self.read_values().await {
            Ok(records) => records,
            Err(e @ (StorageError::NotAnArray(_) | StorageError::Serialization(_))) => {
                let aside = self.set_aside().await?;
                warn!(
                    path = %self.path.display(),
                    moved_to = %aside.display(),
                    "Record file unreadable ({}), starting a new one", e
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        for entry in entries {
            records.push(serde_json::to_value(entry)?);
        }
        let total = records.len();
        self.write_values(&records).await?;
        debug!(path = %self.path.display(), appended = entries.len(), total, "Records written");
        Ok(total)
    }

    /// Read every record.
    pub async fn read_all<T: DeserializeOwned>(&self) -> StorageResult<Vec<T>> {
        self.read_values()
            .await?
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(StorageError::from))
            .collect()
    }

    async fn read_values(&self) -> StorageResult<Vec<Value>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }
        match serde_json::from_slice(&bytes)? {
            Value::Array(records) => Ok(records),
            _ => Err(StorageError::NotAnArray(self.path.clone())),
        }
    }

    async fn write_values(&self, records: &[Value]) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let body = serde_json::to_vec_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).await?;
        if let Err(e) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn set_aside(&self) -> StorageResult<PathBuf> {
        let aside = self.path.with_extension(format!(
            "corrupt-{}.json",
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        fs::rename(&self.path, &aside).await?;
        Ok(aside)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use railcam_models::{GrassEvent, StatisticsBatch};
    use tempfile::TempDir;

    #[test]
    fn test_timestamped_names() {
        let started = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            statistics_path("/data/stats", started),
            PathBuf::from("/data/stats/inference_statistics_20240309_140507.json")
        );
        assert_eq!(
            grass_events_path("/data/stats", started),
            PathBuf::from("/data/stats/grass_events_20240309_140507.json")
        );
    }

    #[tokio::test]
    async fn test_append_creates_then_merges() {
        let dir = TempDir::new().unwrap();
        let store = JsonArrayStore::new(dir.path().join("stats").join("s.json"));

        let first = vec![StatisticsBatch::with_counts(10, 4, 3)];
        assert_eq!(store.append(&first).await.unwrap(), 1);

        let second = vec![
            StatisticsBatch::with_counts(2, 0, 1),
            StatisticsBatch::with_counts(3, 1, 1),
        ];
        assert_eq!(store.append(&second).await.unwrap(), 3);

        let all: Vec<StatisticsBatch> = store.read_all().await.unwrap();
        let totals: Vec<u32> = all.iter().map(|b| b.tracks_total).collect();
        assert_eq!(totals, vec![10, 2, 3]);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_read_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonArrayStore::new(dir.path().join("none.json"));
        let all: Vec<GrassEvent> = store.read_all().await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_file_set_aside() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("g.json");
        fs::write(&path, b"{\"not\": \"an array\"}").await.unwrap();

        let store = JsonArrayStore::new(&path);
        assert_eq!(
            store.append(&[GrassEvent::detected(Utc::now())]).await.unwrap(),
            1
        );

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names.iter().any(|n| n.starts_with("g.corrupt-")));
    }
}
