//! Enumerates a remote mailbox over an `ImapSession` (component C9),
//! converging on the same `parse_message` pipeline the local sources use.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::CollectorError;
use crate::imap::{with_transient_retry, ImapSession};
use crate::orchestrator::{CandidateItem, Source};
use crate::types::{RunConfig, SortOrder};

use super::parse::parse_message;

/// Wraps an `ImapSession` behind a mutex so `Source::enumerate`'s `&self`
/// can drive a protocol that's inherently `&mut self` (one session, one
/// mailbox conversation at a time).
pub struct ImapSource<S: ImapSession> {
    session: Mutex<S>,
    folder: String,
}

impl<S: ImapSession> ImapSource<S> {
    pub fn new(session: S, folder: impl Into<String>) -> Self {
        Self { session: Mutex::new(session), folder: folder.into() }
    }
}

#[async_trait]
impl<S: ImapSession> Source for ImapSource<S> {
    async fn enumerate(&self, config: &RunConfig) -> Result<Vec<CandidateItem>, CollectorError> {
        let (since, before) = match &config.date_range {
            Some(range) => (range.since, range.until),
            None => (None, None),
        };

        let mut session = self.session.lock().await;
        let mut uids = with_transient_retry(|| session.search(&self.folder, since, before)).await?;
        if config.order == SortOrder::Asc {
            uids.reverse();
        }

        let mut items = Vec::with_capacity(uids.len());
        for uid in uids {
            let raw = with_transient_retry(|| session.fetch_rfc822(&self.folder, uid)).await?;
            let external_id = uid.to_string();
            let parsed = parse_message(&raw, "email_imap", &external_id, &self.folder, chrono::Utc::now())?;
            items.push(CandidateItem { context: parsed.context, document: parsed.document });
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imap::ImapError;
    use crate::types::{DateRange, RunMode};
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;

    struct FakeSession {
        uids: Vec<u32>,
        messages: HashMap<u32, Vec<u8>>,
        search_calls: usize,
    }

    #[async_trait]
    impl ImapSession for FakeSession {
        async fn search(
            &mut self,
            _folder: &str,
            _since: Option<DateTime<Utc>>,
            _before: Option<DateTime<Utc>>,
        ) -> Result<Vec<u32>, ImapError> {
            self.search_calls += 1;
            Ok(self.uids.clone())
        }

        async fn fetch_rfc822(&mut self, _folder: &str, uid: u32) -> Result<Vec<u8>, ImapError> {
            self.messages.get(&uid).cloned().ok_or_else(|| ImapError::NotFound(uid.to_string()))
        }
    }

    fn config(order: SortOrder) -> RunConfig {
        RunConfig {
            mode: RunMode::Real,
            limit: 10,
            order,
            concurrency: 1,
            date_range: Some(DateRange { since: None, until: None }),
            time_window_days: None,
            collector_options: serde_json::Value::Null,
        }
    }

    fn message(subject: &str) -> Vec<u8> {
        format!("Subject: {subject}\r\nDate: Mon, 1 Jan 2024 10:00:00 +0000\r\n\r\nbody\r\n").into_bytes()
    }

    #[tokio::test]
    async fn enumerates_in_descending_search_order_by_default() {
        let session = FakeSession {
            uids: vec![3, 2, 1],
            messages: HashMap::from([(1, message("one")), (2, message("two")), (3, message("three"))]),
            search_calls: 0,
        };
        let source = ImapSource::new(session, "INBOX");
        let items = source.enumerate(&config(SortOrder::Desc)).await.unwrap();
        let subjects: Vec<_> = items.iter().map(|i| i.context.subject.clone()).collect();
        assert_eq!(subjects, vec!["three", "two", "one"]);
    }

    #[tokio::test]
    async fn ascending_order_reverses_the_descending_search_result() {
        let session = FakeSession {
            uids: vec![3, 2, 1],
            messages: HashMap::from([(1, message("one")), (2, message("two")), (3, message("three"))]),
            search_calls: 0,
        };
        let source = ImapSource::new(session, "INBOX");
        let items = source.enumerate(&config(SortOrder::Asc)).await.unwrap();
        let subjects: Vec<_> = items.iter().map(|i| i.context.subject.clone()).collect();
        assert_eq!(subjects, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn missing_message_surfaces_as_remote_error() {
        let session = FakeSession { uids: vec![1], messages: HashMap::new(), search_calls: 0 };
        let source = ImapSource::new(session, "INBOX");
        let err = source.enumerate(&config(SortOrder::Desc)).await.unwrap_err();
        assert!(matches!(err, CollectorError::Remote(_)));
    }
}
