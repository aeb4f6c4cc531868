//! Optional single-writer JSONL sink for rejected/errored items (§5, §6:
//! "Rejected items log: JSONL, append-only, rotated by age").

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

const DEFAULT_ROTATE_AFTER: chrono::Duration = chrono::Duration::days(30);

#[derive(Clone, Debug, Serialize)]
pub struct RejectedItemRecord {
    pub collector: String,
    pub item_id: Option<String>,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

/// Handle returned to callers; cheap to clone, backed by a bounded channel
/// feeding the single writer task.
#[derive(Clone)]
pub struct DebugSinkHandle {
    tx: mpsc::Sender<RejectedItemRecord>,
}

impl DebugSinkHandle {
    /// Non-blocking best-effort send: a full channel drops the record
    /// rather than applying backpressure to the run itself.
    pub fn record(&self, record: RejectedItemRecord) {
        let _ = self.tx.try_send(record);
    }
}

/// Spawns the writer task and returns a handle plus its join handle. Each
/// write is a single JSON line, explicitly flushed.
pub fn spawn(path: PathBuf, rotate_after: Option<chrono::Duration>) -> (DebugSinkHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(256);
    let rotate_after = rotate_after.unwrap_or(DEFAULT_ROTATE_AFTER);
    let handle = tokio::spawn(writer_loop(path, rx, rotate_after));
    (DebugSinkHandle { tx }, handle)
}

async fn writer_loop(path: PathBuf, mut rx: mpsc::Receiver<RejectedItemRecord>, rotate_after: chrono::Duration) {
    while let Some(record) = rx.recv().await {
        if let Err(err) = rotate_if_stale(&path, rotate_after).await {
            tracing::warn!(error = %err, "failed to rotate debug sink file");
        }
        if let Err(err) = append_line(&path, &record).await {
            tracing::warn!(error = %err, "failed to write debug sink record");
        }
    }
}

async fn append_line(path: &Path, record: &RejectedItemRecord) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut line = serde_json::to_string(record).unwrap_or_default();
    line.push('\n');
    let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}

async fn rotate_if_stale(path: &Path, rotate_after: chrono::Duration) -> std::io::Result<()> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    let modified: DateTime<Utc> = metadata.modified()?.into();
    if Utc::now() - modified > rotate_after {
        let rotated = path.with_extension(format!("{}.rotated", Utc::now().timestamp()));
        tokio::fs::rename(path, rotated).await?;
    }
    Ok(())
}
