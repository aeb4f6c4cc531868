//! Filesystem watch source. Wraps a debounced `notify` watcher and
//! exposes a drainable queue of change events, grounded in the teacher's
//! `FileWatcher` (debounced watcher + channel hand-off).

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, NoCache};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::CollectorError;

const DEBOUNCE_WINDOW: Duration = Duration::from_millis(200);

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FsChangeKind {
    Created,
    Modified,
    Removed,
}

#[derive(Clone, Debug)]
pub struct FsChangeEvent {
    pub path: PathBuf,
    pub kind: FsChangeKind,
}

/// Owns the debouncer and the receiving half of its event channel. Kept
/// alive for as long as the watch should run; dropping it stops watching.
pub struct FsWatchSource {
    _debouncer: Debouncer<RecommendedWatcher, NoCache>,
    rx: mpsc::UnboundedReceiver<FsChangeEvent>,
}

impl FsWatchSource {
    pub fn watch(root: &Path) -> Result<Self, CollectorError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut debouncer = new_debouncer(DEBOUNCE_WINDOW, None, move |result: DebounceEventResult| match result {
            Ok(events) => {
                for event in events {
                    if let Some(change) = convert_event(&event.event) {
                        debug!(path = %change.path.display(), kind = ?change.kind, "file watch event");
                        if tx.send(change).is_err() {
                            return;
                        }
                    }
                }
            }
            Err(errors) => {
                for err in errors {
                    error!(error = %err, "file watch error");
                }
            }
        })
        .map_err(|err| CollectorError::Input(format!("failed to create file watcher: {err}")))?;

        debouncer
            .watch(root, RecursiveMode::Recursive)
            .map_err(|err| CollectorError::Input(format!("failed to watch {}: {err}", root.display())))?;

        Ok(Self { _debouncer: debouncer, rx })
    }

    /// Drains up to `limit` pending events without blocking past the
    /// first event's arrival. `limit` is a per-drain cap, not a promise
    /// the stream is exhausted — more events may arrive later.
    pub async fn drain(&mut self, limit: usize) -> Vec<FsChangeEvent> {
        let mut events = Vec::new();
        if limit == 0 {
            return events;
        }
        match self.rx.recv().await {
            Some(first) => events.push(first),
            None => return events,
        }
        while events.len() < limit {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
        }
        if events.len() >= limit {
            warn!(limit, "fswatch drain hit its per-drain cap, events may remain queued");
        }
        events
    }
}

fn convert_event(event: &notify::Event) -> Option<FsChangeEvent> {
    use notify::EventKind;

    let path = event.paths.first()?.clone();
    let kind = match event.kind {
        EventKind::Create(_) => FsChangeKind::Created,
        EventKind::Modify(_) => FsChangeKind::Modified,
        EventKind::Remove(_) => FsChangeKind::Removed,
        _ => return None,
    };
    Some(FsChangeEvent { path, kind })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn detects_file_creation_under_watched_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = FsWatchSource::watch(dir.path()).unwrap();

        let file_path = dir.path().join("new_message.eml");
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        tokio::fs::write(&file_path, b"Subject: test\r\n\r\nbody").await.unwrap();

        let events = tokio::time::timeout(StdDuration::from_secs(5), source.drain(10)).await;
        let events = events.expect("expected at least one event within timeout");
        assert!(events.iter().any(|e| e.path == file_path && e.kind == FsChangeKind::Created));
    }

    #[tokio::test]
    async fn drain_with_zero_limit_returns_immediately_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = FsWatchSource::watch(dir.path()).unwrap();
        let events = source.drain(0).await;
        assert!(events.is_empty());
    }
}
