//! On-device message store source (e.g. iMessage). The concrete on-device
//! schema is kept behind `MessageStorePort` so this module only knows
//! about rows, not SQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::Digest;

use crate::error::CollectorError;
use crate::filter::MessageContext;
use crate::orchestrator::{CandidateItem, Source};
use crate::types::{CanonicalDocument, ContentTimestampType, RunConfig, SortOrder};

/// One row as read from the on-device store, before conversion to a
/// `CanonicalDocument`. `rowid` is the store's stable identifier and
/// becomes `external_id` verbatim.
#[derive(Clone, Debug)]
pub struct MessageStoreRow {
    pub rowid: String,
    pub sender: String,
    pub recipients: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub chat_name: String,
    pub has_attachment: bool,
}

/// Abstraction over the on-device message database. A concrete adapter
/// (e.g. backed by a read-only SQLite connection) implements this without
/// this crate needing to know the store's actual schema.
#[async_trait]
pub trait MessageStorePort: Send + Sync {
    /// Returns rows ordered by `ROWID`/timestamp ascending, regardless of
    /// the requested `order` — the walker itself handles reversal, since
    /// concrete stores usually only index one direction cheaply.
    async fn rows_since(&self, after_rowid: Option<&str>) -> Result<Vec<MessageStoreRow>, CollectorError>;
}

pub struct MessageStoreSource<P> {
    port: P,
}

impl<P: MessageStorePort> MessageStoreSource<P> {
    pub fn new(port: P) -> Self {
        Self { port }
    }

    fn to_candidate(row: MessageStoreRow) -> CandidateItem {
        let context = MessageContext {
            subject: String::new(),
            body: row.body.clone(),
            body_html: String::new(),
            from: row.sender,
            to: row.recipients,
            cc: String::new(),
            bcc: String::new(),
            folder: row.chat_name,
            headers: std::collections::HashMap::new(),
            has_attachment: row.has_attachment,
            attachment_mimes: Vec::new(),
            vip: false,
            list_unsubscribe: false,
            date: Some(row.sent_at),
            now: Utc::now(),
        };

        let mut metadata = std::collections::BTreeMap::new();
        let content_hash = hex::encode(sha2::Sha256::digest(row.body.as_bytes()));
        metadata.insert("content_hash".to_string(), serde_json::Value::String(content_hash));

        let document = CanonicalDocument {
            source_type: "imessage".to_string(),
            external_id: row.rowid,
            title: None,
            canonical_uri: None,
            content: row.body,
            content_mime: "text/plain".to_string(),
            content_timestamp: row.sent_at,
            content_timestamp_type: ContentTimestampType::SourceDate,
            metadata,
            images: Vec::new(),
        };

        CandidateItem { context, document }
    }
}

#[async_trait]
impl<P: MessageStorePort> Source for MessageStoreSource<P> {
    async fn enumerate(&self, config: &RunConfig) -> Result<Vec<CandidateItem>, CollectorError> {
        let mut rows = self.port.rows_since(None).await?;
        rows.sort_by(|a, b| a.sent_at.cmp(&b.sent_at).then_with(|| a.rowid.cmp(&b.rowid)));
        if config.order == SortOrder::Desc {
            rows.reverse();
        }
        Ok(rows.into_iter().map(Self::to_candidate).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunMode;

    struct FixedPort {
        rows: Vec<MessageStoreRow>,
    }

    #[async_trait]
    impl MessageStorePort for FixedPort {
        async fn rows_since(&self, _after_rowid: Option<&str>) -> Result<Vec<MessageStoreRow>, CollectorError> {
            Ok(self.rows.clone())
        }
    }

    fn row(rowid: &str, sent_at: DateTime<Utc>) -> MessageStoreRow {
        MessageStoreRow {
            rowid: rowid.to_string(),
            sender: "+15551234567".to_string(),
            recipients: "+15557654321".to_string(),
            body: "hi".to_string(),
            sent_at,
            chat_name: "chat-1".to_string(),
            has_attachment: false,
        }
    }

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
    async fn orders_rows_by_requested_direction() {
        let t0 = Utc::now();
        let port = FixedPort {
            rows: vec![row("1", t0), row("2", t0 + chrono::Duration::seconds(10))],
        };
        let source = MessageStoreSource::new(port);

        let desc = source.enumerate(&config(SortOrder::Desc)).await.unwrap();
        assert_eq!(desc[0].document.external_id, "2");

        let asc = source.enumerate(&config(SortOrder::Asc)).await.unwrap();
        assert_eq!(asc[0].document.external_id, "1");
    }
}
