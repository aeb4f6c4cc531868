//! Walks a local mail archive (`.eml`/`.emlx` files) in mtime order. Each
//! file's `external_id` is the hash of its path relative to the archive
//! root, so a move within the archive does not change identity.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::error::CollectorError;
use crate::orchestrator::{CandidateItem, Source};
use crate::types::RunConfig;

use super::parse::parse_message;

pub struct LocalMailSource {
    root_dir: PathBuf,
}

impl LocalMailSource {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self { root_dir: root_dir.into() }
    }

    fn external_id_for(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root_dir).unwrap_or(path);
        hex::encode(Sha256::digest(relative.to_string_lossy().as_bytes()))
    }

    async fn walk(&self) -> Result<Vec<(PathBuf, DateTime<Utc>)>, CollectorError> {
        let mut entries = Vec::new();
        let mut stack = vec![self.root_dir.clone()];
        while let Some(dir) = stack.pop() {
            let mut read_dir = match tokio::fs::read_dir(&dir).await {
                Ok(rd) => rd,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(CollectorError::Input(err.to_string())),
            };
            while let Some(entry) = read_dir.next_entry().await.map_err(|err| CollectorError::Input(err.to_string()))? {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                let is_mail_file = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("eml") || ext.eq_ignore_ascii_case("emlx"));
                if !is_mail_file {
                    continue;
                }
                let metadata = entry.metadata().await.map_err(|err| CollectorError::Input(err.to_string()))?;
                let modified: DateTime<Utc> = metadata
                    .modified()
                    .map_err(|err| CollectorError::Input(err.to_string()))?
                    .into();
                entries.push((path, modified));
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl Source for LocalMailSource {
    async fn enumerate(&self, config: &RunConfig) -> Result<Vec<CandidateItem>, CollectorError> {
        let mut entries = self.walk().await?;
        entries.sort_by_key(|(_, mtime)| *mtime);
        if config.order == crate::types::SortOrder::Desc {
            entries.reverse();
        }

        let mut items = Vec::with_capacity(entries.len());
        for (path, mtime) in entries {
            let raw = tokio::fs::read(&path).await.map_err(|err| CollectorError::Input(err.to_string()))?;
            let external_id = self.external_id_for(&path);
            let folder = path
                .parent()
                .and_then(|p| p.strip_prefix(&self.root_dir).ok())
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default();
            let parsed = parse_message(&raw, "email_local", &external_id, &folder, mtime)?;
            items.push(CandidateItem { context: parsed.context, document: parsed.document });
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RunMode, SortOrder};

    fn config(order: SortOrder) -> RunConfig {
        RunConfig {
            mode: RunMode::Real,
            limit: 100,
            order,
            concurrency: 1,
            date_range: None,
            time_window_days: None,
            collector_options: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn walks_eml_files_and_skips_others() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("a.eml"),
            "From: a@example.com\r\nSubject: A\r\nDate: Mon, 1 Jan 2024 10:00:00 +0000\r\n\r\nbody a",
        )
        .await
        .unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), "ignore me").await.unwrap();

        let source = LocalMailSource::new(dir.path());
        let items = source.enumerate(&config(SortOrder::Desc)).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].context.subject, "A");
    }

    #[tokio::test]
    async fn external_id_is_stable_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.eml"), "Subject: A\r\n\r\nbody").await.unwrap();
        let source = LocalMailSource::new(dir.path());
        let first = source.enumerate(&config(SortOrder::Asc)).await.unwrap();
        let second = source.enumerate(&config(SortOrder::Asc)).await.unwrap();
        assert_eq!(first[0].document.external_id, second[0].document.external_id);
    }
}
