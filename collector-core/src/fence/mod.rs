//! Persists coalesced time ranges of already-processed content per
//! collector (component C1). Grounded on the atomic write-temp-then-rename
//! pattern used by `ferrex-core`'s on-disk image cache.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::types::CollectorId;

/// One millisecond of slack: a fence contains `t` iff
/// `earliest - EPSILON <= t <= latest + EPSILON`.
const EPSILON: chrono::Duration = chrono::Duration::milliseconds(1);

/// Two fences within this gap are always merged.
const CONTIGUITY_GAP: chrono::Duration = chrono::Duration::seconds(1);

const SCHEMA_VERSION: u32 = 2;

#[derive(Error, Debug)]
pub enum FenceError {
    #[error("fence store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fence store is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FenceRange {
    pub earliest: DateTime<Utc>,
    pub latest: DateTime<Utc>,
}

impl FenceRange {
    pub fn new(earliest: DateTime<Utc>, latest: DateTime<Utc>) -> Self {
        debug_assert!(earliest <= latest);
        Self { earliest, latest }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.earliest - EPSILON && t <= self.latest + EPSILON
    }

    /// Overlapping or within `CONTIGUITY_GAP` of each other.
    fn is_contiguous_with(&self, other: &FenceRange) -> bool {
        let gap = if self.latest < other.earliest {
            other.earliest - self.latest
        } else if other.latest < self.earliest {
            self.earliest - other.latest
        } else {
            chrono::Duration::zero()
        };
        gap <= CONTIGUITY_GAP
    }

    fn merge(&self, other: &FenceRange) -> FenceRange {
        FenceRange {
            earliest: self.earliest.min(other.earliest),
            latest: self.latest.max(other.latest),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FenceSet {
    fences: Vec<FenceRange>,
}

impl FenceSet {
    pub fn fences(&self) -> &[FenceRange] {
        &self.fences
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.fences.iter().any(|f| f.contains(t))
    }

    /// Insert `range`, then coalesce the whole set so it stays sorted,
    /// non-overlapping, and pairwise non-contiguous (no two fences within
    /// `CONTIGUITY_GAP`).
    pub fn add(&mut self, range: FenceRange) {
        self.fences.push(range);
        self.coalesce();
    }

    fn coalesce(&mut self) {
        if self.fences.is_empty() {
            return;
        }
        self.fences.sort_by_key(|f| f.earliest);
        let mut merged: Vec<FenceRange> = Vec::with_capacity(self.fences.len());
        for fence in self.fences.drain(..) {
            match merged.last_mut() {
                Some(last) if last.is_contiguous_with(&fence) => {
                    *last = last.merge(&fence);
                }
                _ => merged.push(fence),
            }
        }
        self.fences = merged;
    }
}

#[derive(Serialize, Deserialize)]
struct FenceFile {
    version: u32,
    fences: Vec<FenceRange>,
}

/// Persists fence state as one JSON file per collector under `root_dir`,
/// written atomically (write-temp-then-rename) and read under an exclusive
/// file lock (enforced by callers holding the run lock; see
/// `orchestrator::lock`).
#[derive(Debug, Clone)]
pub struct FenceStore {
    root_dir: PathBuf,
}

impl FenceStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    fn path_for(&self, collector: &CollectorId) -> PathBuf {
        let safe_name: String = collector
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root_dir.join(format!("{safe_name}.fences.json"))
    }

    pub async fn load(&self, collector: &CollectorId) -> Result<FenceSet, FenceError> {
        let path = self.path_for(collector);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(FenceSet::default()),
            Err(err) => return Err(err.into()),
        };

        match serde_json::from_slice::<FenceFile>(&bytes) {
            Ok(file) if file.version == SCHEMA_VERSION => {
                let mut set = FenceSet::default();
                for fence in file.fences {
                    set.add(fence);
                }
                Ok(set)
            }
            // Older ID-based format (or an unrecognized version) is treated
            // as "reset to empty" rather than a fatal corruption.
            Ok(_) => Ok(FenceSet::default()),
            Err(_) => {
                if looks_like_legacy_id_format(&bytes) {
                    Ok(FenceSet::default())
                } else {
                    Err(FenceError::Corrupt(format!(
                        "unreadable fence file at {}",
                        path.display()
                    )))
                }
            }
        }
    }

    pub async fn store(&self, collector: &CollectorId, fences: &FenceSet) -> Result<(), FenceError> {
        tokio::fs::create_dir_all(&self.root_dir).await?;
        let path = self.path_for(collector);
        let file = FenceFile {
            version: SCHEMA_VERSION,
            fences: fences.fences().to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&file)
            .map_err(|err| FenceError::Corrupt(err.to_string()))?;

        let tmp_path = tmp_path_for(&path);
        {
            let mut tmp = tokio::fs::File::create(&tmp_path).await?;
            tmp.write_all(&bytes).await?;
            tmp.flush().await?;
        }
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "fences".to_string());
    path.with_file_name(format!("{file_name}.tmp-{}", Uuid::new_v4().simple()))
}

fn looks_like_legacy_id_format(bytes: &[u8]) -> bool {
    serde_json::from_slice::<serde_json::Value>(bytes)
        .map(|value| value.get("ids").is_some() || value.get("processed_ids").is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn coalesces_overlapping_and_near_ranges() {
        let mut set = FenceSet::default();
        set.add(FenceRange::new(ts(0), ts(10)));
        set.add(FenceRange::new(ts(10), ts(20)));
        set.add(FenceRange::new(ts(21), ts(30))); // within 1s gap of 20
        assert_eq!(set.fences().len(), 1);
        assert_eq!(set.fences()[0], FenceRange::new(ts(0), ts(30)));
    }

    #[test]
    fn keeps_distant_ranges_separate() {
        let mut set = FenceSet::default();
        set.add(FenceRange::new(ts(0), ts(10)));
        set.add(FenceRange::new(ts(100), ts(110)));
        assert_eq!(set.fences().len(), 2);
    }

    #[test]
    fn containment_respects_epsilon() {
        let fence = FenceRange::new(ts(10), ts(20));
        assert!(fence.contains(ts(10)));
        assert!(fence.contains(ts(20)));
        assert!(!fence.contains(ts(9))); // 1s before earliest, outside 1ms epsilon
    }

    #[tokio::test]
    async fn round_trips_through_disk_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let store = FenceStore::new(dir.path());
        let collector = CollectorId::new("email_imap:work");

        let mut set = store.load(&collector).await.unwrap();
        assert!(set.fences().is_empty());

        set.add(FenceRange::new(ts(0), ts(100)));
        store.store(&collector, &set).await.unwrap();

        let reloaded = store.load(&collector).await.unwrap();
        assert_eq!(reloaded.fences(), set.fences());
    }

    #[tokio::test]
    async fn legacy_id_format_resets_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FenceStore::new(dir.path());
        let collector = CollectorId::new("legacy");
        let path = store.path_for(&collector);
        tokio::fs::write(&path, br#"{"ids": ["a", "b"]}"#)
            .await
            .unwrap();

        let loaded = store.load(&collector).await.unwrap();
        assert!(loaded.fences().is_empty());
    }
}
